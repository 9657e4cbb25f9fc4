//! # Error Types Module
//!
//! Centralized error handling for the coaching engine.
//! Every failure is a structured value so callers can tell a rejected command
//! from a discarded sample or a broken configuration.
//!
//! ## Error Types
//! - `EngineError`: Result of a session command or tick that did not apply
//! - `SampleError`: Angle or biometric value outside physical bounds
//! - `SetupError`: Degenerate thresholds or heart-rate profile
//! - `ConfigError`: Configuration file I/O and parsing errors
//! - `StoreError`: Session summary persistence failures
//! - `SourceError`: Upstream producer failures (camera, wearable)
//! - `CommandParseError`: Voice/API input that does not map to a command
//!
//! Upstream outages never appear in `EngineError`: a stale or
//! failing wearable shows up only as a freshness tier.

use crate::command::CommandKind;
use crate::exercise::ExerciseKind;
use crate::session::Lifecycle;
use thiserror::Error;

/// Errors returned by `SessionEngine` operations.
///
/// None of them leave the engine partially updated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Command is not legal in the current lifecycle state
    #[error("cannot {command} while the session is {state}")]
    InvalidTransition { command: CommandKind, state: Lifecycle },

    /// Sample was discarded without touching session state
    #[error("sample rejected: {0}")]
    OutOfRangeSample(#[from] SampleError),

    /// Configuration must be corrected before a session can start
    #[error("configuration error: {0}")]
    Configuration(#[from] SetupError),

    /// Settings can only be replaced between sessions
    #[error("cannot reconfigure while the session is {0}")]
    SessionRunning(Lifecycle),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("{field} = {value} is outside the valid range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("no usable joint angle for {0}")]
    MissingPrimaryAngle(ExerciseKind),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("{exercise} thresholds are degenerate: down_angle {down_angle} must be below up_angle {up_angle}")]
    DegenerateThresholds {
        exercise: ExerciseKind,
        down_angle: f64,
        up_angle: f64,
    },

    #[error("heart-rate reserve is not positive: max_hr {max_hr} must exceed resting_hr {resting_hr}")]
    DegenerateHeartRateReserve { resting_hr: f64, max_hr: f64 },

    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Errors that can occur during configuration file operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to write config file: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseFailed(#[source] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[source] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session summary could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt session record on line {line}: {source}")]
    CorruptRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("session store writer has shut down")]
    WriterClosed,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("source request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command `{0}`")]
    UnknownIntent(String),

    #[error("`{0}` needs an exercise")]
    MissingExercise(String),

    #[error("unknown exercise `{0}`")]
    UnknownExercise(String),
}
