//! # Configuration Management Module
//!
//! Persistent engine settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `exercises`: down/up thresholds per exercise kind
//! - `rep_counter`: quality gating, smoothing and confirmation frames
//! - `heart_rate`: resting/maximum heart rate for Karvonen zones
//! - `biometrics`: wearable poll interval and plausible bpm bounds
//! - `session` / `latency`: rolling window sizes
//! - `storage`: where finished session summaries go
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/mirror-coach/config.toml
//! - Linux: ~/.config/mirror-coach/config.toml
//! - Windows: %APPDATA%\mirror-coach\config.toml
//!
//! Loading never validates. A degenerate file still loads so the engine can
//! report the problem when a session is started.

use crate::error::{ConfigError, SetupError};
use crate::exercise::ExerciseTable;
use crate::zone::HeartRateProfile;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exercises: ExerciseTable,
    pub rep_counter: RepCounterConfig,
    pub heart_rate: HeartRateProfile,
    pub biometrics: BiometricsConfig,
    pub session: SessionConfig,
    pub latency: LatencyConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepCounterConfig {
    /// Frames below this pose confidence still move the phase but do not score
    pub min_frame_quality: f64,
    pub quality_window: usize,
    /// Moving-average length for the primary angle; 1 disables smoothing
    pub smoothing_window: usize,
    /// Consecutive frames past a threshold before the phase flips
    pub confirm_frames: u32,
}

impl Default for RepCounterConfig {
    fn default() -> Self {
        Self {
            min_frame_quality: 0.3,
            quality_window: 30,
            smoothing_window: 1,
            confirm_frames: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiometricsConfig {
    pub poll_interval_secs: u64,
    pub min_valid_bpm: u16,
    pub max_valid_bpm: u16,
    pub heart_rate_window: usize,
}

impl Default for BiometricsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            min_valid_bpm: 25,
            max_valid_bpm: 250,
            heart_rate_window: 20,
        }
    }
}

impl BiometricsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub quality_window: usize,
    /// Posture samples kept per session; the oldest are dropped first
    pub timeline_window: usize,
    /// Minimum spacing between posture samples; 0 keeps every frame
    pub timeline_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quality_window: 90,
            // Ten minutes at 5 Hz
            timeline_window: 3000,
            timeline_interval_ms: 200,
        }
    }
}

impl SessionConfig {
    pub fn timeline_interval(&self) -> Duration {
        Duration::from_millis(self.timeline_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub window: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self { window: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON-lines file for finished sessions; defaults to the platform data dir
    pub summaries_file: Option<PathBuf>,
    /// Sessions kept when running without a file
    pub memory_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            summaries_file: None,
            memory_capacity: 50,
        }
    }
}

impl StorageConfig {
    pub fn resolved_summaries_file(&self) -> PathBuf {
        self.summaries_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mirror-coach")
                .join("sessions.jsonl")
        })
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mirror-coach")
            .join("config.toml")
    }

    /// Load config from the platform location, or create default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                log::debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                log::info!("Wrote default config to {}", path.display());
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Check everything a session depends on.
    ///
    /// The engine refuses `start` while this fails.
    pub fn validate(&self) -> Result<(), SetupError> {
        self.exercises.validate()?;
        self.heart_rate.validate()?;

        let rc = &self.rep_counter;
        if !(0.0..=1.0).contains(&rc.min_frame_quality) {
            return Err(invalid("rep_counter.min_frame_quality", "must be within 0..=1"));
        }
        if rc.quality_window == 0 || rc.smoothing_window == 0 {
            return Err(invalid("rep_counter", "window sizes must be at least 1"));
        }
        if rc.confirm_frames == 0 {
            return Err(invalid("rep_counter.confirm_frames", "must be at least 1"));
        }

        let bio = &self.biometrics;
        if bio.poll_interval_secs == 0 {
            return Err(invalid("biometrics.poll_interval_secs", "must be positive"));
        }
        if bio.min_valid_bpm >= bio.max_valid_bpm {
            return Err(invalid("biometrics", "min_valid_bpm must be below max_valid_bpm"));
        }
        if bio.heart_rate_window == 0
            || self.session.quality_window == 0
            || self.session.timeline_window == 0
            || self.latency.window == 0
        {
            return Err(invalid("window", "window sizes must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> SetupError {
    SetupError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::{ExerciseKind, ExerciseThresholds};
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.biometrics.poll_interval_secs, 30);
        assert_eq!(config.rep_counter.confirm_frames, 1);
        assert_eq!(config.exercises.squat, ExerciseThresholds::new(90.0, 160.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.biometrics.poll_interval_secs = 45;

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("poll_interval_secs = 45"));
        assert!(toml_str.contains("[exercises.squat]"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [exercises.squat]
            down_angle = 85.0
            up_angle = 165.0

            [heart_rate]
            resting_hr = 55.0
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.exercises.squat, ExerciseThresholds::new(85.0, 165.0));
        assert_eq!(config.exercises.pushup, ExerciseThresholds::new(90.0, 160.0));
        assert_eq!(config.heart_rate.resting_hr, 55.0);
        assert_eq!(config.rep_counter, RepCounterConfig::default());
    }

    #[test]
    fn test_config_load_creates_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_config_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.heart_rate.resting_hr = 48.0;
        config.storage.memory_capacity = 5;
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_config_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "exercises = 3").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_validate_reports_degenerate_settings() {
        let mut config = Config::default();
        config.exercises.squat = ExerciseThresholds::new(170.0, 160.0);
        assert!(matches!(
            config.validate(),
            Err(SetupError::DegenerateThresholds { exercise: ExerciseKind::Squat, .. })
        ));

        let mut config = Config::default();
        config.heart_rate.max_hr = Some(50.0);
        assert!(matches!(
            config.validate(),
            Err(SetupError::DegenerateHeartRateReserve { .. })
        ));

        let mut config = Config::default();
        config.rep_counter.confirm_frames = 0;
        assert!(matches!(
            config.validate(),
            Err(SetupError::InvalidSetting { name: "rep_counter.confirm_frames", .. })
        ));

        let mut config = Config::default();
        config.session.timeline_window = 0;
        assert!(matches!(config.validate(), Err(SetupError::InvalidSetting { name: "window", .. })));
    }
}
