//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use tm_core::ValidationError;
use tm_core::analytics::{MILLIS_PER_MONTH, check_utc_offset};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// The user commands act on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// Analytics offset in seconds, UTC minus local time. Defaults to the
    /// machine's current offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_seconds: Option<i64>,

    /// How many months `entry list` shows without `--all`.
    pub list_window_months: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("user_id", &self.user_id)
            .field("utc_offset_seconds", &self.utc_offset_seconds)
            .field("list_window_months", &self.list_window_months)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("timeops.db"),
            user_id: None,
            utc_offset_seconds: None,
            list_window_months: 3,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TM_*)
        figment = figment.merge(Env::prefixed("TM_"));

        figment.extract()
    }

    /// The configured analytics offset, or the machine's current one.
    pub fn utc_offset(&self) -> Result<i64, ValidationError> {
        check_utc_offset(
            self.utc_offset_seconds
                .unwrap_or_else(|| -i64::from(Local::now().offset().local_minus_utc())),
        )
    }

    /// Earliest start time `entry list` shows by default, relative to `now`.
    pub fn list_since(&self, now: i64) -> i64 {
        now - i64::from(self.list_window_months) * MILLIS_PER_MONTH / 1_000
    }
}

/// Returns the platform-specific config directory for timeops.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("timeops"))
}

/// Returns the platform-specific data directory for timeops.
///
/// On Linux: `~/.local/share/timeops`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("timeops"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_timeops() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "timeops");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("timeops.db"));
        assert_eq!(config.user_id, None);
        assert_eq!(config.list_window_months, 3);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("timeops.toml");
        std::fs::write(
            &path,
            "database_path = \"/tmp/other.db\"\nuser_id = 7\nutc_offset_seconds = -7200\nlist_window_months = 1\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.user_id, Some(7));
        assert_eq!(config.utc_offset().unwrap(), -7_200);
        assert_eq!(config.list_window_months, 1);
    }

    #[test]
    fn test_out_of_range_offset_is_rejected() {
        let config = Config {
            utc_offset_seconds: Some(i64::MIN),
            ..Config::default()
        };
        let err = config.utc_offset().unwrap_err();
        assert_eq!(
            err,
            ValidationError::UtcOffsetOutOfRange { value: i64::MIN }
        );
    }

    #[test]
    fn test_list_since_uses_synthetic_months() {
        let config = Config {
            list_window_months: 3,
            ..Config::default()
        };
        assert_eq!(config.list_since(10_000_000), 10_000_000 - 7_884_003);
    }
}
