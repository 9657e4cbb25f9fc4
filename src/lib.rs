//! Exercise-coaching core for a smart mirror: repetition counting from pose
//! angles, heart-rate zones from a wearable, and the session state machine
//! the voice/API layer drives.

pub mod biometrics;
pub mod clock;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod exercise;
pub mod latency;
pub mod rep_counter;
pub mod session;
pub mod sources;
pub mod store;
pub mod timeseries;
pub mod zone;

pub use command::Command;
pub use config::Config;
pub use error::EngineError;
pub use exercise::{AngleSample, ExerciseKind, JointAngles};
pub use session::{Lifecycle, SessionEngine, SessionStatus, SessionSummary};
