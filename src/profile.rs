use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{db, AppError, AppResult};

pub const USER_PROFILE_KEY: &str = "userProfile";

/// The single user record. `age` is free text; digit filtering happens at input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: String,
    pub age: String,
    pub gender: String,
}

trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    fn save(&self) -> anyhow::Result<()>;
}

/// JSON object persisted at `settings.json`.
struct FileSettings {
    path: PathBuf,
    data: Mutex<BTreeMap<String, Value>>,
}

impl FileSettings {
    fn load(path: &Path) -> Self {
        let data = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(
                    target: "dream_journal",
                    event = "settings_unreadable",
                    path = %path.display(),
                    error = %err
                );
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        }
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: Value) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value);
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let bytes = {
            let guard = self
                .data
                .lock()
                .map_err(|_| anyhow::anyhow!("settings lock poisoned"))?;
            serde_json::to_vec_pretty(&*guard)?
        };
        db::write_atomic(&self.path, &bytes)
            .with_context(|| format!("write settings {}", self.path.display()))
    }
}

#[derive(Default)]
struct MemorySettings {
    data: Mutex<BTreeMap<String, Value>>,
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: Value) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value);
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handle to the key-value settings store holding the user profile.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<dyn SettingsStore>,
}

impl SettingsHandle {
    pub fn file(path: &Path) -> Self {
        Self {
            inner: Arc::new(FileSettings::load(path)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(MemorySettings::default()),
        }
    }

    /// The stored profile, or an empty one on first run or unreadable data.
    pub fn load_profile(&self) -> UserProfile {
        let Some(value) = self.inner.get(USER_PROFILE_KEY) else {
            return UserProfile::default();
        };
        serde_json::from_value(value).unwrap_or_else(|err| {
            warn!(target: "dream_journal", event = "profile_decode_failed", error = %err);
            UserProfile::default()
        })
    }

    /// Replace the stored profile wholesale.
    pub fn save_profile(&self, profile: &UserProfile) -> AppResult<()> {
        let value = serde_json::to_value(profile)?;
        self.inner.set(USER_PROFILE_KEY, value);
        self.inner.save().map_err(|err| {
            AppError::new("SETTINGS/SAVE", "Could not save your profile.").with_cause(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile() -> UserProfile {
        UserProfile {
            name: "Robin".into(),
            age: "31".into(),
            gender: "nonbinary".into(),
        }
    }

    #[test]
    fn first_run_profile_is_empty() {
        let settings = SettingsHandle::in_memory();
        assert_eq!(settings.load_profile(), UserProfile::default());
    }

    #[test]
    fn file_settings_survive_reopen() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("settings.json");
        SettingsHandle::file(&path)
            .save_profile(&profile())
            .expect("save");
        assert_eq!(SettingsHandle::file(&path).load_profile(), profile());
    }

    #[test]
    fn save_overwrites_whole_record() {
        let settings = SettingsHandle::in_memory();
        settings.save_profile(&profile()).expect("save");
        let renamed = UserProfile {
            name: "Sam".into(),
            ..UserProfile::default()
        };
        settings.save_profile(&renamed).expect("save");
        assert_eq!(settings.load_profile(), renamed);
    }

    #[test]
    fn corrupt_settings_file_loads_empty_profile() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, b"{not json").expect("write");
        assert_eq!(SettingsHandle::file(&path).load_profile(), UserProfile::default());
    }
}
