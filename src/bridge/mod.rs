pub mod asusctl;
pub mod nvidia_smi;
pub mod ryzenadj;
pub mod supergfxctl;

use crate::error::{Error, Result};
use crate::runner::{CommandOutput, RunOptions, ToolRunner};
use crate::settings::{SettingKey, SettingsRequest};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// One scalar read from a tool's output.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Outcome of reading one state field. A field missing from the map was
/// never requested (or the tool is absent); `Unparsed` means the tool
/// produced output but the field could not be extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRead {
    Value(FieldValue),
    Unparsed,
}

/// Immutable best-effort snapshot of one tool's state. No field is ever
/// required; parse failures surface as [`FieldRead::Unparsed`], never as
/// errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolState {
    fields: BTreeMap<&'static str, FieldRead>,
}

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, name: &'static str, value: i64) {
        self.fields.insert(name, FieldRead::Value(FieldValue::Int(value)));
    }

    pub fn set_float(&mut self, name: &'static str, value: f64) {
        self.fields
            .insert(name, FieldRead::Value(FieldValue::Float(value)));
    }

    pub fn set_text(&mut self, name: &'static str, value: impl Into<String>) {
        self.fields
            .insert(name, FieldRead::Value(FieldValue::Text(value.into())));
    }

    /// Record that the tool answered but this field did not parse.
    pub fn mark_unparsed(&mut self, name: &'static str) {
        self.fields.insert(name, FieldRead::Unparsed);
    }

    pub fn get(&self, name: &str) -> Option<&FieldRead> {
        self.fields.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name)? {
            FieldRead::Value(FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            FieldRead::Value(FieldValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            FieldRead::Value(FieldValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True if no field carries an actual value.
    pub fn has_no_values(&self) -> bool {
        !self
            .fields
            .values()
            .any(|f| matches!(f, FieldRead::Value(_)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldRead)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

impl Serialize for ToolState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, field) in &self.fields {
            match field {
                FieldRead::Value(FieldValue::Int(v)) => map.serialize_entry(name, v)?,
                FieldRead::Value(FieldValue::Float(v)) => map.serialize_entry(name, v)?,
                FieldRead::Value(FieldValue::Text(v)) => map.serialize_entry(name, v)?,
                // Unparsed renders as null; truly absent fields are simply
                // not present in the map.
                FieldRead::Unparsed => map.serialize_entry(name, &Option::<i64>::None)?,
            }
        }
        map.end()
    }
}

/// Result of applying one recognized setting. Writes are independent;
/// a failed one never rolls back the others.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub key: SettingKey,
    pub result: Result<()>,
}

impl ApplyOutcome {
    pub fn ok(key: SettingKey) -> Self {
        Self {
            key,
            result: Ok(()),
        }
    }

    pub fn failed(key: SettingKey, error: Error) -> Self {
        Self {
            key,
            result: Err(error),
        }
    }

    pub fn from_output(key: SettingKey, tool: &str, output: CommandOutput) -> Self {
        if output.success() {
            Self::ok(key)
        } else {
            Self::failed(
                key,
                Error::CommandFailed {
                    tool: tool.to_string(),
                    code: output.code,
                    stderr: output.stderr.trim().to_string(),
                },
            )
        }
    }
}

/// Common contract over the external tools. Reads are best-effort and
/// never fail; writes report per-setting outcomes and ignore keys the
/// bridge does not recognize.
pub trait Bridge {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn current_state(&self) -> ToolState;

    fn apply_settings(&self, request: &SettingsRequest) -> Vec<ApplyOutcome>;
}

/// Shared invocation helper composed into each bridge: owns the command
/// name, the root requirement and the memoized availability check.
pub struct Invoker {
    command: &'static str,
    requires_root: bool,
    runner: Arc<dyn ToolRunner>,
    available: OnceLock<bool>,
}

impl Invoker {
    pub fn new(command: &'static str, requires_root: bool, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            command,
            requires_root,
            runner,
            available: OnceLock::new(),
        }
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    /// Whether the executable resolves on the search path. Probed once
    /// and cached for the bridge's lifetime.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = self.runner.locate(self.command);
            log::debug!(
                target: "bridge",
                "{}: {}",
                self.command,
                if found { "found" } else { "not found" }
            );
            found
        })
    }

    /// Run the tool, returning the output whatever its exit code.
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_with(args, false)
    }

    /// Run the tool, failing on a non-zero exit.
    pub fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_with(args, true)
    }

    fn run_with(&self, args: &[&str], require_success: bool) -> Result<CommandOutput> {
        if !self.is_available() {
            return Err(Error::ToolUnavailable {
                tool: self.command.to_string(),
            });
        }
        self.runner.run(
            self.command,
            args,
            RunOptions {
                elevate: self.requires_root,
                require_success,
            },
        )
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn test_availability_is_cached() {
        let runner = Arc::new(ScriptedRunner::new());
        let invoker = Invoker::new("some-tool", false, runner.clone());

        assert!(invoker.is_available());
        assert!(invoker.is_available());
        // locate() is not recorded; only run() calls are. Run once to
        // prove the invoker still works after the cached checks.
        invoker.run(&["-x"]).unwrap();
        assert_eq!(runner.recorded().len(), 1);
    }

    #[test]
    fn test_run_on_missing_tool_is_tool_unavailable() {
        let runner = Arc::new(ScriptedRunner::absent());
        let invoker = Invoker::new("ghost-tool", false, runner);

        assert!(!invoker.is_available());
        let err = invoker.run(&["-i"]).unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable { .. }));
    }

    #[test]
    fn test_tool_state_distinguishes_unparsed_from_absent() {
        let mut state = ToolState::new();
        state.set_int("battery_limit_percent", 80);
        state.mark_unparsed("power_profile");

        assert_eq!(state.int("battery_limit_percent"), Some(80));
        assert_eq!(state.get("power_profile"), Some(&FieldRead::Unparsed));
        assert_eq!(state.get("gpu_mode"), None);
    }

    #[test]
    fn test_tool_state_json_rendering() {
        let mut state = ToolState::new();
        state.set_int("stapm_limit", 45);
        state.set_text("gpu_name", "RTX 4060");
        state.mark_unparsed("tctl_temp");

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["stapm_limit"], 45);
        assert_eq!(json["gpu_name"], "RTX 4060");
        assert!(json["tctl_temp"].is_null());
    }
}
