use crate::bridge::{ApplyOutcome, Bridge, Invoker, ToolState};
use crate::runner::ToolRunner;
use crate::settings::{Setting, SettingKey, SettingsRequest};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, OnceLock};

static ACTIVE_PROFILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Active profile:\s*(\w+)").unwrap());
static LED_BRIGHTNESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)brightness:\s*(\w+)").unwrap());
static CHARGE_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"charge limit:\s*(\d+)").unwrap());
// Ranged attribute: 15..[25]..35 (min, current, max in one line).
static RANGE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.\.\[(\d+)\]\.\.(\d+)").unwrap());
// Discrete attribute: [(0),1,2] - the parenthesized entry is selected.
static SELECTED_OPTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)").unwrap());
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// The armoury attribute asusctl uses for the sustained CPU package
/// power limit. When the firmware exposes it, this bridge also recognizes
/// `cpu_tdp` (ryzenadj, applied later, overrides it).
const CPU_TDP_ATTRIBUTE: &str = "ppt_pl1_spl";

pub const POWER_PROFILES: [&str; 3] = ["LowPower", "Balanced", "Performance"];

/// A firmware tunable from `asusctl armoury list`. Ranged attributes
/// carry min/max, discrete ones carry the allowed option set in
/// declaration order (the selected option included).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArmouryAttribute {
    pub current: Option<i64>,
    pub default: Option<ArmouryDefault>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub options: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArmouryDefault {
    Int(i64),
    Text(String),
}

/// Parse `asusctl armoury list` output. Attribute blocks start with a
/// non-indented `name:` header followed by indented `current:` and
/// `default:` lines; names are case-sensitive and unique per listing.
pub fn parse_armoury_list(text: &str) -> BTreeMap<String, ArmouryAttribute> {
    let mut attributes = BTreeMap::new();
    let mut current_name: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end();

        if !line.is_empty() && !line.starts_with(' ') && line.ends_with(':') {
            let name = line[..line.len() - 1].to_string();
            attributes.insert(name.clone(), ArmouryAttribute::default());
            current_name = Some(name);
            continue;
        }

        let Some(name) = &current_name else { continue };
        let Some(attr) = attributes.get_mut(name) else { continue };

        if let Some(value) = line.trim_start().strip_prefix("current:") {
            let value = value.trim();
            if value.starts_with('[') {
                if let Some(selected) = SELECTED_OPTION.captures(value) {
                    attr.current = selected[1].parse().ok();
                }
                let options: Vec<i64> = INTEGER
                    .find_iter(value)
                    .filter_map(|m| m.as_str().parse().ok())
                    .collect();
                if !options.is_empty() {
                    attr.options = Some(options);
                }
            } else if let Some(range) = RANGE_VALUE.captures(value) {
                attr.min = range[1].parse().ok();
                attr.current = range[2].parse().ok();
                attr.max = range[3].parse().ok();
            }
        } else if let Some(value) = line.trim_start().strip_prefix("default:") {
            let value = value.trim();
            attr.default = Some(match value.parse::<i64>() {
                Ok(i) => ArmouryDefault::Int(i),
                Err(_) => ArmouryDefault::Text(value.to_string()),
            });
        }
    }

    attributes
}

/// Bridge for asusctl, the ASUS laptop control daemon CLI: power
/// profiles, keyboard backlight, battery charge limit and armoury
/// firmware attributes.
pub struct AsusctlBridge {
    invoker: Invoker,
    has_cpu_tdp_attribute: OnceLock<bool>,
}

impl AsusctlBridge {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            invoker: Invoker::new("asusctl", false, runner),
            has_cpu_tdp_attribute: OnceLock::new(),
        }
    }

    /// All armoury attributes the firmware exposes right now. Transient;
    /// callers should not hold onto the result across writes.
    pub fn armoury_attributes(&self) -> BTreeMap<String, ArmouryAttribute> {
        match self.invoker.run(&["armoury", "list"]) {
            Ok(output) if output.success() => parse_armoury_list(&output.stdout),
            _ => BTreeMap::new(),
        }
    }

    pub fn set_armoury_attribute(&self, name: &str, value: i64) -> ApplyOutcome {
        match self.invoker.run(&["armoury", "set", name, &value.to_string()]) {
            Ok(output) => ApplyOutcome::from_output(SettingKey::CpuTdp, "asusctl", output),
            Err(e) => ApplyOutcome::failed(SettingKey::CpuTdp, e),
        }
    }

    /// Whether the firmware exposes the sustained power limit attribute.
    /// Probed once via `armoury list` and cached; hardware attributes do
    /// not appear mid-session.
    fn supports_cpu_tdp(&self) -> bool {
        *self
            .has_cpu_tdp_attribute
            .get_or_init(|| self.armoury_attributes().contains_key(CPU_TDP_ATTRIBUTE))
    }

    fn canonical_profile(name: &str) -> &str {
        POWER_PROFILES
            .iter()
            .find(|p| p.eq_ignore_ascii_case(name))
            .copied()
            .unwrap_or(name)
    }

    fn read_power_profile(&self, state: &mut ToolState) {
        let Ok(output) = self.invoker.run(&["profile", "get"]) else {
            return;
        };
        if !output.success() {
            return;
        }
        // "Active profile: LowPower"
        match ACTIVE_PROFILE.captures(&output.stdout) {
            Some(caps) => state.set_text("power_profile", &caps[1]),
            None => state.mark_unparsed("power_profile"),
        }
    }

    fn read_keyboard_brightness(&self, state: &mut ToolState) {
        let Ok(output) = self.invoker.run(&["leds", "get"]) else {
            return;
        };
        if !output.success() {
            return;
        }
        // "Current keyboard led brightness: Off"
        let level = LED_BRIGHTNESS
            .captures(&output.stdout)
            .map(|caps| caps[1].to_ascii_lowercase())
            .filter(|level| level.parse::<crate::settings::LedLevel>().is_ok());
        match level {
            Some(level) => state.set_text("keyboard_brightness", level),
            None => state.mark_unparsed("keyboard_brightness"),
        }
    }

    fn read_battery_limit(&self, state: &mut ToolState) {
        let Ok(output) = self.invoker.run(&["battery", "info"]) else {
            return;
        };
        if !output.success() {
            return;
        }
        // "Current battery charge limit: 60%"
        let limit = CHARGE_LIMIT
            .captures(&output.stdout)
            .and_then(|caps| caps[1].parse::<i64>().ok());
        match limit {
            Some(limit) => state.set_int("battery_limit_percent", limit),
            None => state.mark_unparsed("battery_limit_percent"),
        }
    }
}

impl Bridge for AsusctlBridge {
    fn name(&self) -> &'static str {
        "asusctl"
    }

    fn is_available(&self) -> bool {
        self.invoker.is_available()
    }

    fn current_state(&self) -> ToolState {
        let mut state = ToolState::new();
        if !self.is_available() {
            return state;
        }

        self.read_power_profile(&mut state);
        self.read_keyboard_brightness(&mut state);
        self.read_battery_limit(&mut state);
        state
    }

    fn apply_settings(&self, request: &SettingsRequest) -> Vec<ApplyOutcome> {
        let mut outcomes = Vec::new();
        if !self.is_available() {
            return outcomes;
        }

        if let Some(Setting::PowerProfile(profile)) = request.get(SettingKey::PowerProfile) {
            let profile = Self::canonical_profile(profile);
            let outcome = match self.invoker.run(&["profile", "set", profile]) {
                Ok(output) => ApplyOutcome::from_output(SettingKey::PowerProfile, "asusctl", output),
                Err(e) => ApplyOutcome::failed(SettingKey::PowerProfile, e),
            };
            outcomes.push(outcome);
        }

        if let Some(Setting::KeyboardBrightness(level)) =
            request.get(SettingKey::KeyboardBrightness)
        {
            let outcome = match self.invoker.run(&["leds", "set", level.as_arg()]) {
                Ok(output) => {
                    ApplyOutcome::from_output(SettingKey::KeyboardBrightness, "asusctl", output)
                }
                Err(e) => ApplyOutcome::failed(SettingKey::KeyboardBrightness, e),
            };
            outcomes.push(outcome);
        }

        if let Some(Setting::BatteryLimit(limit)) = request.get(SettingKey::BatteryLimit) {
            if (20..=100).contains(limit) {
                let outcome = match self.invoker.run(&["battery", "limit", &limit.to_string()]) {
                    Ok(output) => {
                        ApplyOutcome::from_output(SettingKey::BatteryLimit, "asusctl", output)
                    }
                    Err(e) => ApplyOutcome::failed(SettingKey::BatteryLimit, e),
                };
                outcomes.push(outcome);
            } else {
                log::warn!(target: "bridge", "battery_limit {} outside 20..=100, skipping", limit);
            }
        }

        if let Some(Setting::CpuTdp(watts)) = request.get(SettingKey::CpuTdp) {
            if self.supports_cpu_tdp() {
                outcomes.push(self.set_armoury_attribute(CPU_TDP_ATTRIBUTE, i64::from(*watts)));
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::ScriptedRunner;
    use crate::bridge::FieldRead;

    const ARMOURY_LISTING: &str = "\
ppt_pl1_spl:
  current: 15..[25]..35
  default: 35
ppt_pl2_sppt:
  current: 25..[35]..54
  default: 54
panel_overdrive:
  current: [(1),0]
  default: 0
boot_sound:
  current: [(2),0,1]
  default: MuteAndFast
";

    #[test]
    fn test_parse_ranged_attribute() {
        let attrs = parse_armoury_list(ARMOURY_LISTING);
        let pl1 = &attrs["ppt_pl1_spl"];
        assert_eq!(pl1.min, Some(15));
        assert_eq!(pl1.current, Some(25));
        assert_eq!(pl1.max, Some(35));
        assert_eq!(pl1.default, Some(ArmouryDefault::Int(35)));
        assert_eq!(pl1.options, None);
    }

    #[test]
    fn test_parse_discrete_attribute_preserves_declaration_order() {
        let attrs = parse_armoury_list(ARMOURY_LISTING);
        let overdrive = &attrs["panel_overdrive"];
        assert_eq!(overdrive.current, Some(1));
        assert_eq!(overdrive.options, Some(vec![1, 0]));
        assert_eq!(overdrive.min, None);
    }

    #[test]
    fn test_parse_discrete_selected_not_smallest() {
        let attrs = parse_armoury_list(ARMOURY_LISTING);
        let sound = &attrs["boot_sound"];
        assert_eq!(sound.current, Some(2));
        assert_eq!(sound.options, Some(vec![2, 0, 1]));
        assert_eq!(
            sound.default,
            Some(ArmouryDefault::Text("MuteAndFast".to_string()))
        );
    }

    #[test]
    fn test_parse_armoury_names_are_case_sensitive() {
        let listing = "Ppt_Pl1:\n  current: 1..[2]..3\nppt_pl1:\n  current: 4..[5]..6\n";
        let attrs = parse_armoury_list(listing);
        assert_eq!(attrs["Ppt_Pl1"].current, Some(2));
        assert_eq!(attrs["ppt_pl1"].current, Some(5));
    }

    #[test]
    fn test_current_state_parses_all_fields() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&["profile", "get"], "Active profile: LowPower\n")
                .on(&["leds", "get"], "Current keyboard led brightness: Med\n")
                .on(&["battery", "info"], "Current battery charge limit: 60%\n"),
        );
        let bridge = AsusctlBridge::new(runner);

        let state = bridge.current_state();
        assert_eq!(state.text("power_profile"), Some("LowPower"));
        assert_eq!(state.text("keyboard_brightness"), Some("med"));
        assert_eq!(state.int("battery_limit_percent"), Some(60));
    }

    #[test]
    fn test_garbled_output_marks_field_unparsed() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on(&["profile", "get"], "???\n")
                .on(&["leds", "get"], "brightness: ultraviolet\n")
                .on(&["battery", "info"], "no limit configured\n"),
        );
        let bridge = AsusctlBridge::new(runner);

        let state = bridge.current_state();
        assert_eq!(state.get("power_profile"), Some(&FieldRead::Unparsed));
        assert_eq!(state.get("keyboard_brightness"), Some(&FieldRead::Unparsed));
        assert_eq!(state.get("battery_limit_percent"), Some(&FieldRead::Unparsed));
    }

    #[test]
    fn test_unavailable_tool_yields_empty_state() {
        let bridge = AsusctlBridge::new(Arc::new(ScriptedRunner::absent()));
        assert!(!bridge.is_available());
        assert!(bridge.current_state().is_empty());
        assert!(bridge.apply_settings(&SettingsRequest::new()).is_empty());
    }

    #[test]
    fn test_apply_canonicalizes_profile_case() {
        let runner = Arc::new(ScriptedRunner::new());
        let bridge = AsusctlBridge::new(runner.clone());

        let request: SettingsRequest = [Setting::PowerProfile("lowpower".to_string())]
            .into_iter()
            .collect();
        let outcomes = bridge.apply_settings(&request);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(
            runner.recorded(),
            vec![vec!["asusctl", "profile", "set", "LowPower"]]
        );
    }

    #[test]
    fn test_apply_skips_out_of_range_battery_limit() {
        let runner = Arc::new(ScriptedRunner::new());
        let bridge = AsusctlBridge::new(runner.clone());

        let request: SettingsRequest = [Setting::BatteryLimit(10)].into_iter().collect();
        let outcomes = bridge.apply_settings(&request);
        assert!(outcomes.is_empty());
        assert!(runner.recorded().is_empty());
    }

    #[test]
    fn test_apply_cpu_tdp_through_armoury_when_supported() {
        let runner = Arc::new(
            ScriptedRunner::new().on(&["armoury", "list"], ARMOURY_LISTING),
        );
        let bridge = AsusctlBridge::new(runner.clone());

        let request: SettingsRequest = [Setting::CpuTdp(30)].into_iter().collect();
        let outcomes = bridge.apply_settings(&request);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());

        let calls = runner.recorded();
        assert_eq!(
            calls.last().unwrap(),
            &vec!["asusctl", "armoury", "set", "ppt_pl1_spl", "30"]
        );
    }

    #[test]
    fn test_apply_cpu_tdp_skipped_without_armoury_attribute() {
        let runner = Arc::new(ScriptedRunner::new().on(&["armoury", "list"], "mini_led_mode:\n  current: [(0),1]\n  default: 0\n"));
        let bridge = AsusctlBridge::new(runner.clone());

        let request: SettingsRequest = [Setting::CpuTdp(30)].into_iter().collect();
        assert!(bridge.apply_settings(&request).is_empty());
        // Only the capability probe ran, no write.
        assert_eq!(runner.recorded(), vec![vec!["asusctl", "armoury", "list"]]);
    }

    #[test]
    fn test_failed_write_reports_command_failed() {
        let runner = Arc::new(ScriptedRunner::new().on_exit(
            &["battery", "limit", "80"],
            1,
            "dbus error",
        ));
        let bridge = AsusctlBridge::new(runner);

        let request: SettingsRequest = [Setting::BatteryLimit(80)].into_iter().collect();
        let outcomes = bridge.apply_settings(&request);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_err());
    }
}
