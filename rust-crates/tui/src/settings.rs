use anyhow::{
    Context,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEFAULT_DATA_DIR: &str = "~/.little-flowers";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageMode::Local => "On this device",
            StorageMode::Remote => "Sync server",
        };
        write!(f, "{name}")
    }
}

/// Preferences that survive restarts. A changed storage mode is only picked up
/// on the next start.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage_mode: StorageMode,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or empty file yields the defaults.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let data = fs::read(&self.path).context("Failed to read settings")?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Settings::default());
        }
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse settings at {}", self.path.display()))
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        let json =
            serde_json::to_vec_pretty(settings).context("Failed to serialize settings")?;
        fs::write(&self.path, json).context("Failed to write settings")?;
        Ok(())
    }
}

pub fn resolve_data_dir(dir: Option<&str>) -> PathBuf {
    let raw = dir.unwrap_or(DEFAULT_DATA_DIR);
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn load__missing_file_gives_defaults() {
        // given
        let tmp = TempDir::new("settings").unwrap();
        let sut = SettingsStore::new(tmp.path());

        // when
        let settings = sut.load().unwrap();

        // then
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.storage_mode, StorageMode::Local);
    }

    #[test]
    fn save__then_load_returns_saved_settings() {
        // given
        let tmp = TempDir::new("settings").unwrap();
        let sut = SettingsStore::new(tmp.path().join("nested"));
        let settings = Settings {
            storage_mode: StorageMode::Remote,
            remote_url: Some("http://127.0.0.1:8080".to_string()),
            profile: Some("parent".to_string()),
            child_name: None,
        };

        // when
        sut.save(&settings).unwrap();

        // then
        assert_eq!(sut.load().unwrap(), settings);
    }

    #[test]
    fn load__tolerates_missing_fields() {
        // given
        let tmp = TempDir::new("settings").unwrap();
        let sut = SettingsStore::new(tmp.path());
        fs::write(sut.path(), br#"{"storage_mode":"remote"}"#).unwrap();

        // when
        let settings = sut.load().unwrap();

        // then
        assert_eq!(settings.storage_mode, StorageMode::Remote);
        assert_eq!(settings.remote_url, None);
    }

    #[test]
    fn resolve_data_dir__expands_tilde() {
        let resolved = resolve_data_dir(Some("~/flowers"));
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert_eq!(resolve_data_dir(Some("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
