use crate::error::{Error, Result};
use crate::settings::SettingsRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Shipped defaults. Profile names match the asusctl power profiles;
/// values mirror sensible presets for a hybrid AMD+NVIDIA machine.
const DEFAULT_CONFIG: &str = r#"
[general]
current_profile = "Balanced"

[profiles.LowPower]
power_profile = "LowPower"
gpu_mode = "Integrated"
cpu_tdp = 25
cpu_temp_limit = 75
gpu_clock_min = 300
gpu_clock_max = 900
gpu_temp_limit = 80
battery_limit = 60
keyboard_brightness = "off"

[profiles.Balanced]
power_profile = "Balanced"
gpu_mode = "Hybrid"
cpu_tdp = 45
cpu_temp_limit = 85
gpu_clock_min = 300
gpu_clock_max = 1500
gpu_temp_limit = 87
battery_limit = 80
keyboard_brightness = "low"

[profiles.Performance]
power_profile = "Performance"
gpu_mode = "Hybrid"
cpu_tdp = 65
cpu_temp_limit = 95
gpu_clock_min = 300
gpu_clock_max = 2100
gpu_temp_limit = 90
battery_limit = 100
keyboard_brightness = "med"
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    general: General,
    /// Profiles stay schema-less here: unknown keys survive load/save
    /// round-trips untouched and are only filtered out when a profile
    /// is converted into a SettingsRequest.
    profiles: BTreeMap<String, toml::value::Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct General {
    current_profile: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            current_profile: "Balanced".to_string(),
        }
    }
}

impl Default for StoreData {
    fn default() -> Self {
        // Parse through a shadow struct without `#[serde(default)]`:
        // the container-level default on StoreData makes its Deserialize
        // impl call StoreData::default(), which would recurse here.
        #[derive(Deserialize)]
        struct Shipped {
            general: General,
            profiles: BTreeMap<String, toml::value::Table>,
        }
        let shipped: Shipped =
            toml::from_str(DEFAULT_CONFIG).expect("shipped default config must parse");
        Self {
            general: shipped.general,
            profiles: shipped.profiles,
        }
    }
}

/// TOML-backed profile store at `~/.config/asus-helper/config.toml`.
/// A simple persistence collaborator: named bundles of raw settings.
pub struct ProfileStore {
    path: PathBuf,
    data: StoreData,
}

impl ProfileStore {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("asus-helper")
            .join("config.toml")
    }

    /// Load from `path`, creating it with defaults when missing. A file
    /// that fails to parse is left on disk and defaults are used for
    /// the session.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::ProfileStore(format!("cannot read {}: {}", path.display(), e)))?;
            match toml::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!(target: "profile", "could not parse {}: {}. Using defaults.", path.display(), e);
                    StoreData::default()
                }
            }
        } else {
            log::info!(target: "profile", "creating default config at {}", path.display());
            let store = Self {
                path: path.clone(),
                data: StoreData::default(),
            };
            store.save()?;
            store.data
        };

        Ok(Self { path, data })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ProfileStore(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let raw = toml::to_string_pretty(&self.data)
            .map_err(|e| Error::ProfileStore(format!("cannot serialize config: {}", e)))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| Error::ProfileStore(format!("cannot write {}: {}", self.path.display(), e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.data.profiles.keys().map(String::as_str).collect()
    }

    pub fn current_profile_name(&self) -> &str {
        &self.data.general.current_profile
    }

    pub fn set_current_profile(&mut self, name: &str) -> Result<()> {
        if !self.data.profiles.contains_key(name) {
            return Err(Error::ProfileStore(format!("no such profile: {}", name)));
        }
        self.data.general.current_profile = name.to_string();
        self.save()
    }

    /// Convert a named profile into a settings request, dropping keys
    /// the closed setting set does not recognize.
    pub fn request_for(&self, name: &str) -> Option<SettingsRequest> {
        self.data
            .profiles
            .get(name)
            .map(SettingsRequest::from_toml_table)
    }

    pub fn current_request(&self) -> Option<SettingsRequest> {
        self.request_for(self.current_profile_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Setting, SettingKey};

    #[test]
    fn test_load_creates_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        let store = ProfileStore::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.current_profile_name(), "Balanced");
        assert_eq!(
            store.profile_names(),
            vec!["Balanced", "LowPower", "Performance"]
        );

        let request = store.current_request().unwrap();
        assert_eq!(request.get(SettingKey::CpuTdp), Some(&Setting::CpuTdp(45)));
        assert_eq!(
            request.get(SettingKey::BatteryLimit),
            Some(&Setting::BatteryLimit(80))
        );
    }

    #[test]
    fn test_unknown_profile_keys_survive_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[general]
current_profile = "Custom"

[profiles.Custom]
cpu_tdp = 35
fan_curve = "30c:0%,90c:100%"
"#,
        )
        .unwrap();

        let store = ProfileStore::load(&path).unwrap();
        store.save().unwrap();

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("fan_curve"));

        // The unknown key is a silent no-op at the request boundary.
        let request = store.request_for("Custom").unwrap();
        assert_eq!(request.len(), 1);
        assert_eq!(request.get(SettingKey::CpuTdp), Some(&Setting::CpuTdp(35)));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "this is not toml [[[").unwrap();

        let store = ProfileStore::load(&path).unwrap();
        assert_eq!(store.current_profile_name(), "Balanced");
    }

    #[test]
    fn test_set_current_profile_validates_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let mut store = ProfileStore::load(&path).unwrap();

        assert!(store.set_current_profile("Performance").is_ok());
        assert!(store.set_current_profile("Nonexistent").is_err());

        let reloaded = ProfileStore::load(&path).unwrap();
        assert_eq!(reloaded.current_profile_name(), "Performance");
    }
}
