use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reminder::TriggerPolicy;

/// Application-level constants
pub const APP_NAME: &str = "Medminder";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current database schema version. Bump on any table shape change.
pub const SCHEMA_VERSION: i64 = 3;

/// Overrides the data directory (tests, portable installs).
pub const DATA_DIR_ENV: &str = "MEDMINDER_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Get the application data directory.
/// `$MEDMINDER_DATA_DIR` if set, otherwise ~/Medminder/.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// SQLite database file inside the data directory
pub fn database_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("medication_database.db"))
}

pub fn settings_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("settings.json"))
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medminder_lib=info,medminder=info,warn"
}

/// What to do when the on-disk schema is newer than this build understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPolicy {
    /// Drop every table and recreate the current schema. Local data is lost.
    #[default]
    Destructive,
    /// Refuse to open the database.
    Strict,
}

/// User-tunable settings, persisted as `settings.json` in the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trigger_policy: TriggerPolicy,
    /// Whether the host grants precise wake-ups. When false, reminders are
    /// registered as best-effort.
    pub exact_alarms_allowed: bool,
    /// Maximum delay (seconds) a best-effort reminder may be deferred by.
    pub inexact_slack_secs: u64,
    pub migration_policy: MigrationPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger_policy: TriggerPolicy::AtStart,
            exact_alarms_allowed: true,
            inexact_slack_secs: 0,
            migration_policy: MigrationPolicy::Destructive,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_is_medminder() {
        assert_eq!(APP_NAME, "Medminder");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn database_lives_in_data_dir() {
        let Ok(db) = database_path() else { return };
        let dir = app_data_dir().unwrap();
        assert!(db.starts_with(dir));
        assert!(db.ends_with("medication_database.db"));
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.trigger_policy, TriggerPolicy::AtStart);
        assert!(settings.exact_alarms_allowed);
    }

    #[test]
    fn settings_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            trigger_policy: TriggerPolicy::LeadMinutes(5),
            exact_alarms_allowed: false,
            inexact_slack_secs: 30,
            migration_policy: MigrationPolicy::Strict,
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "exact_alarms_allowed": false }"#).unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert!(!settings.exact_alarms_allowed);
        assert_eq!(settings.migration_policy, MigrationPolicy::Destructive);
    }

    #[test]
    fn malformed_settings_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
