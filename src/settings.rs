use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Keyboard backlight levels understood by `asusctl leds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedLevel {
    Off,
    Low,
    Med,
    High,
}

impl LedLevel {
    pub const ALL: [LedLevel; 4] = [LedLevel::Off, LedLevel::Low, LedLevel::Med, LedLevel::High];

    pub fn as_arg(self) -> &'static str {
        match self {
            LedLevel::Off => "off",
            LedLevel::Low => "low",
            LedLevel::Med => "med",
            LedLevel::High => "high",
        }
    }

    /// Numeric slider position (0..=3) to level.
    pub fn from_index(index: i64) -> Option<Self> {
        Self::ALL.get(usize::try_from(index).ok()?).copied()
    }
}

impl FromStr for LedLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_arg().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for LedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// GPU MUX modes understood by supergfxctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuMode {
    Integrated,
    Hybrid,
    Dedicated,
    Vfio,
}

impl GpuMode {
    pub const ALL: [GpuMode; 4] = [
        GpuMode::Integrated,
        GpuMode::Hybrid,
        GpuMode::Dedicated,
        GpuMode::Vfio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GpuMode::Integrated => "integrated",
            GpuMode::Hybrid => "hybrid",
            GpuMode::Dedicated => "dedicated",
            GpuMode::Vfio => "vfio",
        }
    }

    /// supergfxctl expects the mode capitalized on the command line.
    pub fn as_arg(self) -> &'static str {
        match self {
            GpuMode::Integrated => "Integrated",
            GpuMode::Hybrid => "Hybrid",
            GpuMode::Dedicated => "Dedicated",
            GpuMode::Vfio => "Vfio",
        }
    }
}

impl FromStr for GpuMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for GpuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of settings the bridges know how to apply. Each variant
/// carries its typed payload; external profile data is converted at the
/// [`SettingsRequest::from_raw`] boundary where unknown keys stay a no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    /// asusctl power profile name (LowPower, Balanced, Performance).
    PowerProfile(String),
    KeyboardBrightness(LedLevel),
    /// Battery charge limit percentage.
    BatteryLimit(u8),
    GpuMode(GpuMode),
    /// Sustained CPU package power in watts.
    CpuTdp(u32),
    /// Fast boost power limit in watts. When absent, 130% of the
    /// sustained limit is used.
    CpuFastLimit(u32),
    /// Slow (average) power limit in watts. When absent, mirrors the
    /// sustained limit.
    CpuSlowLimit(u32),
    /// CPU thermal limit in Celsius.
    CpuTempLimit(u8),
    /// GPU core clock floor in MHz.
    GpuClockMin(u32),
    /// GPU core clock ceiling in MHz.
    GpuClockMax(u32),
    /// GPU thermal throttle target in Celsius.
    GpuTempLimit(u8),
    /// GPU board power limit in watts.
    GpuPowerLimit(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingKey {
    PowerProfile,
    KeyboardBrightness,
    BatteryLimit,
    GpuMode,
    CpuTdp,
    CpuFastLimit,
    CpuSlowLimit,
    CpuTempLimit,
    GpuClockMin,
    GpuClockMax,
    GpuTempLimit,
    GpuPowerLimit,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::PowerProfile => "power_profile",
            SettingKey::KeyboardBrightness => "keyboard_brightness",
            SettingKey::BatteryLimit => "battery_limit",
            SettingKey::GpuMode => "gpu_mode",
            SettingKey::CpuTdp => "cpu_tdp",
            SettingKey::CpuFastLimit => "cpu_fast_limit",
            SettingKey::CpuSlowLimit => "cpu_slow_limit",
            SettingKey::CpuTempLimit => "cpu_temp_limit",
            SettingKey::GpuClockMin => "gpu_clock_min",
            SettingKey::GpuClockMax => "gpu_clock_max",
            SettingKey::GpuTempLimit => "gpu_temp_limit",
            SettingKey::GpuPowerLimit => "gpu_power_limit",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Setting {
    pub fn key(&self) -> SettingKey {
        match self {
            Setting::PowerProfile(_) => SettingKey::PowerProfile,
            Setting::KeyboardBrightness(_) => SettingKey::KeyboardBrightness,
            Setting::BatteryLimit(_) => SettingKey::BatteryLimit,
            Setting::GpuMode(_) => SettingKey::GpuMode,
            Setting::CpuTdp(_) => SettingKey::CpuTdp,
            Setting::CpuFastLimit(_) => SettingKey::CpuFastLimit,
            Setting::CpuSlowLimit(_) => SettingKey::CpuSlowLimit,
            Setting::CpuTempLimit(_) => SettingKey::CpuTempLimit,
            Setting::GpuClockMin(_) => SettingKey::GpuClockMin,
            Setting::GpuClockMax(_) => SettingKey::GpuClockMax,
            Setting::GpuTempLimit(_) => SettingKey::GpuTempLimit,
            Setting::GpuPowerLimit(_) => SettingKey::GpuPowerLimit,
        }
    }

    /// Parse one raw key/value pair from profile data or the command line.
    /// Unknown keys and values of the wrong shape return `None`; the
    /// caller treats that as a silent no-op so newer profile fields do not
    /// break older binaries.
    pub fn from_raw(key: &str, value: &RawValue) -> Option<Setting> {
        match key {
            "power_profile" => Some(Setting::PowerProfile(value.as_str()?.to_string())),
            "keyboard_brightness" => {
                let level = match value {
                    RawValue::Int(i) => LedLevel::from_index(*i)?,
                    RawValue::Str(s) => s.parse().ok()?,
                };
                Some(Setting::KeyboardBrightness(level))
            }
            "battery_limit" => Some(Setting::BatteryLimit(value.as_u8()?)),
            "gpu_mode" => Some(Setting::GpuMode(value.as_str()?.parse().ok()?)),
            "cpu_tdp" => Some(Setting::CpuTdp(value.as_u32()?)),
            "cpu_fast_limit" => Some(Setting::CpuFastLimit(value.as_u32()?)),
            "cpu_slow_limit" => Some(Setting::CpuSlowLimit(value.as_u32()?)),
            "cpu_temp_limit" => Some(Setting::CpuTempLimit(value.as_u8()?)),
            "gpu_clock_min" => Some(Setting::GpuClockMin(value.as_u32()?)),
            "gpu_clock_max" => Some(Setting::GpuClockMax(value.as_u32()?)),
            "gpu_temp_limit" => Some(Setting::GpuTempLimit(value.as_u8()?)),
            "gpu_power_limit" => Some(Setting::GpuPowerLimit(value.as_u32()?)),
            _ => None,
        }
    }
}

/// Scalar value as it arrives from the profile store or the CLI, before
/// it is matched against the closed [`Setting`] set.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i64),
    Str(String),
}

impl RawValue {
    /// Parse a command-line token: integer if it looks like one,
    /// otherwise a plain string.
    pub fn parse(token: &str) -> RawValue {
        match token.parse::<i64>() {
            Ok(i) => RawValue::Int(i),
            Err(_) => RawValue::Str(token.to_string()),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Str(s) => Some(s),
            RawValue::Int(_) => None,
        }
    }

    fn as_u8(&self) -> Option<u8> {
        match self {
            RawValue::Int(i) => u8::try_from(*i).ok(),
            RawValue::Str(_) => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            RawValue::Int(i) => u32::try_from(*i).ok(),
            RawValue::Str(_) => None,
        }
    }
}

impl From<&toml::Value> for RawValue {
    fn from(value: &toml::Value) -> Self {
        match value {
            toml::Value::Integer(i) => RawValue::Int(*i),
            other => RawValue::Str(other.as_str().map(String::from).unwrap_or_default()),
        }
    }
}

/// A flat bundle of settings addressed to whichever bridges recognize
/// them. Iteration order is fixed (key order) so repeated application of
/// the same request produces the same invocation sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsRequest {
    settings: BTreeMap<SettingKey, Setting>,
}

impl SettingsRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last insert per key wins.
    pub fn insert(&mut self, setting: Setting) {
        self.settings.insert(setting.key(), setting);
    }

    pub fn get(&self, key: SettingKey) -> Option<&Setting> {
        self.settings.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.settings.values()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Build a request from raw key/value pairs, dropping anything the
    /// closed setting set does not recognize.
    pub fn from_raw<'a>(pairs: impl IntoIterator<Item = (&'a str, RawValue)>) -> Self {
        let mut request = Self::new();
        for (key, value) in pairs {
            match Setting::from_raw(key, &value) {
                Some(setting) => request.insert(setting),
                None => {
                    log::debug!(target: "settings", "ignoring unrecognized setting: {}", key);
                }
            }
        }
        request
    }

    /// Boundary for external TOML profile tables.
    pub fn from_toml_table(table: &toml::value::Table) -> Self {
        Self::from_raw(
            table
                .iter()
                .map(|(key, value)| (key.as_str(), RawValue::from(value))),
        )
    }
}

impl FromIterator<Setting> for SettingsRequest {
    fn from_iter<T: IntoIterator<Item = Setting>>(iter: T) -> Self {
        let mut request = Self::new();
        for setting in iter {
            request.insert(setting);
        }
        request
    }
}
