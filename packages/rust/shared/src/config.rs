//! Application configuration for LeadDesk.
//!
//! User config lives at `~/.leaddesk/leaddesk.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{LeadDeskError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leaddesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leaddesk";

/// Largest accepted day-boundary offset, in minutes.
const MAX_OFFSET_MINUTES: i32 = 24 * 60;

// ---------------------------------------------------------------------------
// Config structs (matching leaddesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Lead distribution behaviour.
    #[serde(default)]
    pub distribution: DistributionConfig,

    /// Score → tier thresholds.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file. A leading `~/` is expanded to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.leaddesk/leaddesk.db".into()
}

impl DefaultsConfig {
    /// Resolve `db_path`, expanding `~/`.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.db_path)
    }
}

/// `[distribution]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Offset from UTC, in minutes, of the clock that defines "today"
    /// for daily quotas.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// How many times a distribution is recomputed after losing a race
    /// for a lead before giving up.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            max_commit_attempts: default_max_commit_attempts(),
        }
    }
}

fn default_max_commit_attempts() -> u32 {
    3
}

impl DistributionConfig {
    /// The day-boundary offset as a chrono offset.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        if self.utc_offset_minutes.abs() >= MAX_OFFSET_MINUTES {
            return Err(LeadDeskError::config(format!(
                "utc_offset_minutes {} is out of range (must be within ±{MAX_OFFSET_MINUTES})",
                self.utc_offset_minutes
            )));
        }
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            LeadDeskError::config(format!(
                "invalid utc_offset_minutes {}",
                self.utc_offset_minutes
            ))
        })
    }
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Scores at or above this are `high`.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u8,

    /// Scores at or above this (and below `high_threshold`) are `medium`.
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
        }
    }
}

fn default_high_threshold() -> u8 {
    70
}
fn default_medium_threshold() -> u8 {
    40
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leaddesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadDeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leaddesk/leaddesk.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadDeskError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LeadDeskError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadDeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadDeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadDeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings that cannot work at runtime.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    config.distribution.utc_offset()?;

    if config.distribution.max_commit_attempts == 0 {
        return Err(LeadDeskError::config(
            "max_commit_attempts must be at least 1",
        ));
    }

    let scoring = &config.scoring;
    if scoring.high_threshold > 100 || scoring.medium_threshold > scoring.high_threshold {
        return Err(LeadDeskError::config(format!(
            "scoring thresholds must satisfy medium ({}) <= high ({}) <= 100",
            scoring.medium_threshold, scoring.high_threshold
        )));
    }
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| LeadDeskError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("max_commit_attempts"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.distribution.max_commit_attempts, 3);
        assert_eq!(parsed.scoring.high_threshold, 70);
        assert!(validate_config(&parsed).is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[distribution]
utc_offset_minutes = 120
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.distribution.utc_offset_minutes, 120);
        assert_eq!(config.distribution.max_commit_attempts, 3);
        assert_eq!(config.defaults.db_path, "~/.leaddesk/leaddesk.db");
        let offset = config.distribution.utc_offset().expect("offset");
        assert_eq!(offset.local_minus_utc(), 7200);
    }

    #[test]
    fn out_of_range_offset_rejected() {
        let mut config = AppConfig::default();
        config.distribution.utc_offset_minutes = 24 * 60;
        assert!(validate_config(&config).is_err());
        config.distribution.utc_offset_minutes = -330;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.scoring.medium_threshold = 80;
        config.scoring.high_threshold = 60;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("thresholds"));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.distribution.max_commit_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn absolute_db_path_is_untouched() {
        let defaults = DefaultsConfig {
            db_path: "/var/lib/leaddesk.db".into(),
        };
        assert_eq!(
            defaults.resolved_db_path().unwrap(),
            PathBuf::from("/var/lib/leaddesk.db")
        );
    }

    #[test]
    fn load_config_from_file() {
        let path = std::env::temp_dir().join(format!("leaddesk_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[scoring]\nhigh_threshold = 90\n").unwrap();
        let config = load_config_from(&path).expect("load");
        assert_eq!(config.scoring.high_threshold, 90);
        assert_eq!(config.scoring.medium_threshold, 40);
        let _ = std::fs::remove_file(&path);
    }
}
