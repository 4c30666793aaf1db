use crate::bridge::{ApplyOutcome, Bridge, Invoker, ToolState};
use crate::runner::ToolRunner;
use crate::settings::{Setting, SettingKey, SettingsRequest};
use regex::Regex;
use std::sync::{Arc, LazyLock, OnceLock};

// ryzenadj -i prints labelled values like "STAPM LIMIT: 45.000 W".
// Whitespace and case vary between releases.
static STAPM_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)STAPM LIMIT\s*:\s*([\d.]+)").unwrap());
static FAST_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PPT LIMIT FAST\s*:\s*([\d.]+)").unwrap());
static SLOW_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PPT LIMIT SLOW\s*:\s*([\d.]+)").unwrap());
static TCTL_TEMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)THM LIMIT CORE\s*:\s*([\d.]+)").unwrap());

/// Fast boost headroom applied when no explicit fast limit is given:
/// 130% of the sustained limit.
pub const FAST_LIMIT_RATIO: f64 = 1.3;

/// ryzenadj takes power limits in milliwatts; state is exposed in watts.
const MILLIWATTS_PER_WATT: u32 = 1000;

/// Bridge for ryzenadj, the AMD Ryzen mobile power limit tool. Reads and
/// writes both require root, so every invocation goes through the
/// elevation policy.
pub struct RyzenadjBridge {
    invoker: Invoker,
    /// Older APUs reject --tctl-temp; probed once with a real write.
    supports_tctl_temp: OnceLock<bool>,
}

impl RyzenadjBridge {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            invoker: Invoker::new("ryzenadj", true, runner),
            supports_tctl_temp: OnceLock::new(),
        }
    }

    fn parse_watts(re: &Regex, text: &str) -> Option<i64> {
        re.captures(text)?[1].parse::<f64>().ok().map(|v| v as i64)
    }

    fn derived_fast_limit(sustained: u32) -> u32 {
        (f64::from(sustained) * FAST_LIMIT_RATIO) as u32
    }

    fn milliwatt_arg(flag: &str, watts: u32) -> String {
        format!("--{}={}", flag, watts * MILLIWATTS_PER_WATT)
    }

    /// One combined invocation for all power limit flags present in the
    /// request. Explicit fast/slow settings override the derived
    /// defaults (fast = 130% of sustained, slow = sustained).
    fn power_limit_args(request: &SettingsRequest) -> (Vec<String>, Vec<SettingKey>) {
        let tdp = match request.get(SettingKey::CpuTdp) {
            Some(Setting::CpuTdp(w)) => Some(*w),
            _ => None,
        };
        let fast = match request.get(SettingKey::CpuFastLimit) {
            Some(Setting::CpuFastLimit(w)) => Some(*w),
            _ => None,
        };
        let slow = match request.get(SettingKey::CpuSlowLimit) {
            Some(Setting::CpuSlowLimit(w)) => Some(*w),
            _ => None,
        };

        let mut args = Vec::new();
        let mut keys = Vec::new();

        if let Some(w) = tdp {
            args.push(Self::milliwatt_arg("stapm-limit", w));
            args.push(Self::milliwatt_arg(
                "fast-limit",
                fast.unwrap_or_else(|| Self::derived_fast_limit(w)),
            ));
            args.push(Self::milliwatt_arg("slow-limit", slow.unwrap_or(w)));
            keys.push(SettingKey::CpuTdp);
            if fast.is_some() {
                keys.push(SettingKey::CpuFastLimit);
            }
            if slow.is_some() {
                keys.push(SettingKey::CpuSlowLimit);
            }
        } else {
            if let Some(w) = fast {
                args.push(Self::milliwatt_arg("fast-limit", w));
                keys.push(SettingKey::CpuFastLimit);
            }
            if let Some(w) = slow {
                args.push(Self::milliwatt_arg("slow-limit", w));
                keys.push(SettingKey::CpuSlowLimit);
            }
        }

        (args, keys)
    }

    fn apply_temp_limit(&self, celsius: u8, outcomes: &mut Vec<ApplyOutcome>) {
        if self.supports_tctl_temp.get() == Some(&false) {
            log::debug!(target: "bridge", "ryzenadj: tctl-temp unsupported on this hardware, skipping");
            return;
        }

        let arg = format!("--tctl-temp={}", celsius);
        match self.invoker.run(&[&arg]) {
            Ok(output) => {
                // The write doubles as the capability probe: hardware
                // without the tunable answers with a "not supported"
                // marker rather than a distinct exit code.
                let combined = format!("{}\n{}", output.stdout, output.stderr);
                if combined.to_ascii_lowercase().contains("not supported") {
                    let _ = self.supports_tctl_temp.set(false);
                    log::info!(target: "bridge", "ryzenadj: tctl-temp not supported, further writes suppressed");
                    return;
                }
                if output.success() {
                    let _ = self.supports_tctl_temp.set(true);
                }
                outcomes.push(ApplyOutcome::from_output(
                    SettingKey::CpuTempLimit,
                    "ryzenadj",
                    output,
                ));
            }
            Err(e) => outcomes.push(ApplyOutcome::failed(SettingKey::CpuTempLimit, e)),
        }
    }
}

impl Bridge for RyzenadjBridge {
    fn name(&self) -> &'static str {
        "ryzenadj"
    }

    fn is_available(&self) -> bool {
        self.invoker.is_available()
    }

    fn current_state(&self) -> ToolState {
        let mut state = ToolState::new();
        if !self.is_available() {
            return state;
        }

        let Ok(output) = self.invoker.run(&["-i"]) else {
            return state;
        };
        if !output.success() {
            return state;
        }

        // A line missing from the table means the platform does not
        // report that limit; the field stays absent rather than unparsed.
        if let Some(w) = Self::parse_watts(&STAPM_LIMIT, &output.stdout) {
            state.set_int("stapm_limit", w);
        }
        if let Some(w) = Self::parse_watts(&FAST_LIMIT, &output.stdout) {
            state.set_int("fast_limit", w);
        }
        if let Some(w) = Self::parse_watts(&SLOW_LIMIT, &output.stdout) {
            state.set_int("slow_limit", w);
        }
        if let Some(c) = Self::parse_watts(&TCTL_TEMP, &output.stdout) {
            state.set_int("tctl_temp", c);
        }
        state
    }

    fn apply_settings(&self, request: &SettingsRequest) -> Vec<ApplyOutcome> {
        let mut outcomes = Vec::new();
        if !self.is_available() {
            return outcomes;
        }

        let (args, keys) = Self::power_limit_args(request);
        if !args.is_empty() {
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            match self.invoker.run(&arg_refs) {
                Ok(output) => {
                    for key in keys {
                        outcomes.push(ApplyOutcome::from_output(key, "ryzenadj", output.clone()));
                    }
                }
                Err(e) => {
                    // One invocation covered every key; one failed
                    // outcome keyed on the primary setting covers it.
                    outcomes.push(ApplyOutcome::failed(keys[0], e));
                }
            }
        }

        if let Some(Setting::CpuTempLimit(celsius)) = request.get(SettingKey::CpuTempLimit) {
            self.apply_temp_limit(*celsius, &mut outcomes);
        }

        outcomes
    }
}
