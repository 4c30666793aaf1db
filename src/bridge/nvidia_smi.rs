use crate::bridge::{ApplyOutcome, Bridge, Invoker, ToolState};
use crate::runner::ToolRunner;
use crate::settings::{Setting, SettingKey, SettingsRequest};
use std::sync::{Arc, OnceLock};

/// Machine-readable query, comma-separated with fixed positions.
const GPU_QUERY: &str = "--query-gpu=name,clocks.gr,clocks.max.gr,temperature.gpu,power.draw";
const GPU_QUERY_FORMAT: &str = "--format=csv,noheader,nounits";

/// Bridge for nvidia-smi: GPU telemetry plus clock, thermal and power
/// limit control for the discrete GPU.
pub struct NvidiaSmiBridge {
    invoker: Invoker,
    /// `-gtt` (thermal target) only exists on newer driver/GPU combos.
    supports_temp_target: OnceLock<bool>,
}

impl NvidiaSmiBridge {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            invoker: Invoker::new("nvidia-smi", false, runner),
            supports_temp_target: OnceLock::new(),
        }
    }

    /// A token is numeric only when entirely digits; nvidia-smi fills
    /// unavailable columns with markers like "[N/A]".
    fn int_token(token: &str) -> Option<i64> {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            token.parse().ok()
        } else {
            None
        }
    }

    fn outcome(&self, key: SettingKey, args: &[&str]) -> ApplyOutcome {
        match self.invoker.run(args) {
            Ok(output) => ApplyOutcome::from_output(key, "nvidia-smi", output),
            Err(e) => ApplyOutcome::failed(key, e),
        }
    }

    fn apply_temp_target(&self, celsius: u8, outcomes: &mut Vec<ApplyOutcome>) {
        if self.supports_temp_target.get() == Some(&false) {
            log::debug!(target: "bridge", "nvidia-smi: -gtt unsupported, skipping");
            return;
        }

        match self.invoker.run(&["-gtt", &celsius.to_string()]) {
            Ok(output) => {
                let combined = format!("{}\n{}", output.stdout, output.stderr);
                if combined.to_ascii_lowercase().contains("not supported") {
                    let _ = self.supports_temp_target.set(false);
                    log::info!(target: "bridge", "nvidia-smi: thermal target not supported on this GPU");
                    return;
                }
                if output.success() {
                    let _ = self.supports_temp_target.set(true);
                }
                outcomes.push(ApplyOutcome::from_output(
                    SettingKey::GpuTempLimit,
                    "nvidia-smi",
                    output,
                ));
            }
            Err(e) => outcomes.push(ApplyOutcome::failed(SettingKey::GpuTempLimit, e)),
        }
    }
}

impl Bridge for NvidiaSmiBridge {
    fn name(&self) -> &'static str {
        "nvidia-smi"
    }

    fn is_available(&self) -> bool {
        self.invoker.is_available()
    }

    fn current_state(&self) -> ToolState {
        let mut state = ToolState::new();
        if !self.is_available() {
            return state;
        }

        let Ok(output) = self.invoker.run(&[GPU_QUERY, GPU_QUERY_FORMAT]) else {
            return state;
        };
        if !output.success() {
            return state;
        }

        let line = output.stdout.trim();
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 5 {
            return state;
        }

        if !parts[0].is_empty() {
            state.set_text("gpu_name", parts[0]);
        }
        match Self::int_token(parts[1]) {
            Some(v) => state.set_int("gpu_clock_current", v),
            None => state.mark_unparsed("gpu_clock_current"),
        }
        match Self::int_token(parts[2]) {
            Some(v) => state.set_int("gpu_clock_max", v),
            None => state.mark_unparsed("gpu_clock_max"),
        }
        match Self::int_token(parts[3]) {
            Some(v) => state.set_int("gpu_temp", v),
            None => state.mark_unparsed("gpu_temp"),
        }
        match parts[4].parse::<f64>() {
            Ok(v) => state.set_float("gpu_power", v),
            Err(_) => state.mark_unparsed("gpu_power"),
        }

        state
    }

    fn apply_settings(&self, request: &SettingsRequest) -> Vec<ApplyOutcome> {
        let mut outcomes = Vec::new();
        if !self.is_available() {
            return outcomes;
        }

        let clock_min = match request.get(SettingKey::GpuClockMin) {
            Some(Setting::GpuClockMin(v)) => Some(*v),
            _ => None,
        };
        let clock_max = match request.get(SettingKey::GpuClockMax) {
            Some(Setting::GpuClockMax(v)) => Some(*v),
            _ => None,
        };
        let temp = match request.get(SettingKey::GpuTempLimit) {
            Some(Setting::GpuTempLimit(v)) => Some(*v),
            _ => None,
        };
        let power = match request.get(SettingKey::GpuPowerLimit) {
            Some(Setting::GpuPowerLimit(v)) => Some(*v),
            _ => None,
        };

        if clock_min.is_none() && clock_max.is_none() && temp.is_none() && power.is_none() {
            return outcomes;
        }

        // Clock locks and thermal targets need persistence mode; failure
        // here is non-fatal, the individual writes will report their own.
        if let Ok(output) = self.invoker.run(&["-pm", "1"]) {
            if !output.success() {
                log::debug!(target: "bridge", "nvidia-smi: persistence mode refused (exit {})", output.code);
            }
        }

        // A clock lock needs both ends of the range.
        if let (Some(min), Some(max)) = (clock_min, clock_max) {
            let range = format!("{},{}", min, max);
            match self.invoker.run(&["-lgc", &range]) {
                Ok(output) => {
                    outcomes.push(ApplyOutcome::from_output(
                        SettingKey::GpuClockMin,
                        "nvidia-smi",
                        output.clone(),
                    ));
                    outcomes.push(ApplyOutcome::from_output(
                        SettingKey::GpuClockMax,
                        "nvidia-smi",
                        output,
                    ));
                }
                Err(e) => outcomes.push(ApplyOutcome::failed(SettingKey::GpuClockMin, e)),
            }
        }

        if let Some(celsius) = temp {
            self.apply_temp_target(celsius, &mut outcomes);
        }

        if let Some(watts) = power {
            outcomes.push(self.outcome(SettingKey::GpuPowerLimit, &["-pl", &watts.to_string()]));
        }

        outcomes
    }
}
