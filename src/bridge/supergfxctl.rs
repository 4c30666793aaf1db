use crate::bridge::{ApplyOutcome, Bridge, Invoker, ToolState};
use crate::runner::ToolRunner;
use crate::settings::{GpuMode, Setting, SettingKey, SettingsRequest};
use std::sync::Arc;

/// Bridge for supergfxctl, the GPU MUX mode switcher. Switching to or
/// from Dedicated usually needs a logout or reboot to finish; that is
/// the tool's business, not ours.
pub struct SupergfxctlBridge {
    invoker: Invoker,
}

impl SupergfxctlBridge {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            invoker: Invoker::new("supergfxctl", false, runner),
        }
    }
}

impl Bridge for SupergfxctlBridge {
    fn name(&self) -> &'static str {
        "supergfxctl"
    }

    fn is_available(&self) -> bool {
        self.invoker.is_available()
    }

    fn current_state(&self) -> ToolState {
        let mut state = ToolState::new();
        if !self.is_available() {
            return state;
        }

        let Ok(output) = self.invoker.run(&["-g"]) else {
            return state;
        };
        if !output.success() {
            return state;
        }

        match output.stdout.trim().parse::<GpuMode>() {
            Ok(mode) => state.set_text("gpu_mode", mode.as_str()),
            Err(_) => state.mark_unparsed("gpu_mode"),
        }
        state
    }

    fn apply_settings(&self, request: &SettingsRequest) -> Vec<ApplyOutcome> {
        let mut outcomes = Vec::new();
        if !self.is_available() {
            return outcomes;
        }

        if let Some(Setting::GpuMode(mode)) = request.get(SettingKey::GpuMode) {
            let outcome = match self.invoker.run(&["-m", mode.as_arg()]) {
                Ok(output) => ApplyOutcome::from_output(SettingKey::GpuMode, "supergfxctl", output),
                Err(e) => ApplyOutcome::failed(SettingKey::GpuMode, e),
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::ScriptedRunner;
    use crate::bridge::FieldRead;

    #[test]
    fn test_reads_current_mode() {
        let runner = Arc::new(ScriptedRunner::new().on(&["-g"], "Integrated\n"));
        let bridge = SupergfxctlBridge::new(runner);

        let state = bridge.current_state();
        assert_eq!(state.text("gpu_mode"), Some("integrated"));
    }

    #[test]
    fn test_unknown_mode_is_unparsed() {
        let runner = Arc::new(ScriptedRunner::new().on(&["-g"], "AsusMuxDiscreet\n"));
        let bridge = SupergfxctlBridge::new(runner);

        let state = bridge.current_state();
        assert_eq!(state.get("gpu_mode"), Some(&FieldRead::Unparsed));
    }

    #[test]
    fn test_apply_capitalizes_mode_argument() {
        let runner = Arc::new(ScriptedRunner::new());
        let bridge = SupergfxctlBridge::new(runner.clone());

        let request: SettingsRequest = [Setting::GpuMode(GpuMode::Hybrid)].into_iter().collect();
        let outcomes = bridge.apply_settings(&request);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(runner.recorded(), vec![vec!["supergfxctl", "-m", "Hybrid"]]);
    }

    #[test]
    fn test_absent_tool_is_a_no_op() {
        let bridge = SupergfxctlBridge::new(Arc::new(ScriptedRunner::absent()));
        assert!(bridge.current_state().is_empty());

        let request: SettingsRequest = [Setting::GpuMode(GpuMode::Vfio)].into_iter().collect();
        assert!(bridge.apply_settings(&request).is_empty());
    }
}
