//! Configuration (spec §6)
//!
//! Named options with defaults, overridable by a `sortai.toml` in the application
//! data directory and by `SORTAI_*` environment variables. Resolution order mirrors
//! the teacher's `VESTIGE_ENCRYPTION_KEY` / `FASTEMBED_CACHE_PATH` precedence: env var
//! wins, then the config file, then the built-in default.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write config file {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no platform data directory could be determined")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DestinationMode {
    #[default]
    Centralized,
    Distributed,
    CustomPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmPreference {
    #[default]
    Automatic,
    LocalOnly,
    PreferLocalLarge,
    Cloud,
}

/// The full set of named options from spec §6, with the defaults given there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub destination_mode: DestinationMode,
    pub custom_destination_path: Option<PathBuf>,
    pub max_taxonomy_depth: u32,
    pub stability_vs_correctness: f32,
    pub enable_deep_analysis: bool,
    pub deep_analysis_file_types: Vec<String>,
    pub soft_move: bool,
    pub enable_notifications: bool,
    pub respect_battery_status: bool,
    pub enable_watch_mode: bool,
    pub watch_quiet_period_secs: u64,
    pub llm_preference: LlmPreference,
    pub escalation_threshold: f32,
    pub auto_accept_threshold: f32,
    pub max_concurrent_deep_analysis: usize,
    pub max_queue_size: usize,
    /// Movement-log rows older than this many days are eligible for pruning by `gc`.
    pub movement_log_retention_days: u32,
    /// Number of rotated backup files `backup` keeps before evicting the oldest.
    pub max_backups: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination_mode: DestinationMode::Centralized,
            custom_destination_path: None,
            max_taxonomy_depth: 5,
            stability_vs_correctness: 0.5,
            enable_deep_analysis: true,
            deep_analysis_file_types: vec![
                "pdf".into(),
                "docx".into(),
                "jpg".into(),
                "png".into(),
                "mp4".into(),
                "mp3".into(),
            ],
            soft_move: false,
            enable_notifications: true,
            respect_battery_status: true,
            enable_watch_mode: false,
            watch_quiet_period_secs: 3,
            llm_preference: LlmPreference::Automatic,
            escalation_threshold: 0.5,
            auto_accept_threshold: 0.85,
            max_concurrent_deep_analysis: 2,
            max_queue_size: 1000,
            movement_log_retention_days: 90,
            max_backups: 7,
        }
    }
}

impl Config {
    /// Default platform data directory: `~/.local/share/sortai` on Linux, the
    /// platform-appropriate equivalent elsewhere.
    pub fn data_dir() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("SORTAI_DATA_DIR") {
            return Ok(PathBuf::from(path));
        }
        ProjectDirs::from("com", "sortai", "sortai")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoDataDir)
    }

    fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join("sortai.toml")
    }

    /// Load configuration: defaults, overlaid with the on-disk file (if present),
    /// overlaid with environment variable overrides.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::config_path(data_dir);
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Read(path.clone(), e))?;
            toml::from_str(&text)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::Read(data_dir.to_path_buf(), e))?;
        let path = Self::config_path(data_dir);
        let text = toml::to_string_pretty(self)?;
        std::fs::write(&path, text).map_err(|e| ConfigError::Write(path, e))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SORTAI_MAX_TAXONOMY_DEPTH") {
            if let Ok(v) = v.parse() {
                self.max_taxonomy_depth = v;
            }
        }
        if let Ok(v) = std::env::var("SORTAI_AUTO_ACCEPT_THRESHOLD") {
            if let Ok(v) = v.parse() {
                self.auto_accept_threshold = v;
            }
        }
        if let Ok(v) = std::env::var("SORTAI_ESCALATION_THRESHOLD") {
            if let Ok(v) = v.parse() {
                self.escalation_threshold = v;
            }
        }
        if let Ok(v) = std::env::var("SORTAI_WATCH_QUIET_PERIOD_SECS") {
            if let Ok(v) = v.parse() {
                self.watch_quiet_period_secs = v;
            }
        }
        if let Ok(v) = std::env::var("SORTAI_MOVEMENT_LOG_RETENTION_DAYS") {
            if let Ok(v) = v.parse() {
                self.movement_log_retention_days = v;
            }
        }
        if let Ok(v) = std::env::var("SORTAI_LLM_PREFERENCE") {
            self.llm_preference = match v.to_ascii_lowercase().as_str() {
                "local_only" | "local-only" => LlmPreference::LocalOnly,
                "prefer_local_large" => LlmPreference::PreferLocalLarge,
                "cloud" => LlmPreference::Cloud,
                _ => LlmPreference::Automatic,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_spec_ranges() {
        let config = Config::default();
        assert!(config.max_taxonomy_depth >= 2 && config.max_taxonomy_depth <= 7);
        assert!(config.watch_quiet_period_secs >= 1 && config.watch_quiet_period_secs <= 10);
        assert!(config.stability_vs_correctness >= 0.0 && config.stability_vs_correctness <= 1.0);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.max_taxonomy_depth = 4;
        config.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.max_taxonomy_depth, 4);
    }

    #[test]
    fn env_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        Config::default().save(dir.path()).unwrap();
        // SAFETY: test-only, single-threaded env mutation scoped to this test.
        unsafe { std::env::set_var("SORTAI_MAX_TAXONOMY_DEPTH", "6") };
        let loaded = Config::load(dir.path()).unwrap();
        unsafe { std::env::remove_var("SORTAI_MAX_TAXONOMY_DEPTH") };
        assert_eq!(loaded.max_taxonomy_depth, 6);
    }
}
