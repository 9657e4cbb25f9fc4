//! # Producer Sources
//!
//! The engine never talks to a camera or a wearable itself. Producers are
//! reached through two small traits, and this module ships simulated
//! implementations for demos and tests.
//!
//! ## Simulated Motion
//! The angle simulator sweeps the active exercise's primary joint between its
//! thresholds along a sine wave (0.12 rad per frame, ~52 frames per rep) and
//! holds the other joints in a neutral pose.

use crate::clock::Clock;
use crate::error::SourceError;
use crate::exercise::{AngleSample, ExerciseKind, ExerciseTable, JointAngles};
use crate::biometrics::BiometricSample;
use std::f64::consts::TAU;
use std::sync::Arc;

/// Pose pipeline output, one sample per processed frame
pub trait AngleSource: Send {
    /// `None` when no frame is ready
    fn next(&mut self) -> Option<AngleSample>;

    /// Told which exercise the session is counting; sources that cannot
    /// specialise ignore it
    fn track(&mut self, _exercise: ExerciseKind) {}
}

/// Wearable client. Retry and backoff are its own business.
pub trait BiometricSource: Send {
    fn poll(&mut self) -> Result<BiometricSample, SourceError>;
}

const PROGRESS_STEP: f64 = 0.12;

pub struct SimulatedAngleSource {
    clock: Arc<dyn Clock>,
    table: ExerciseTable,
    exercise: ExerciseKind,
    progress: f64,
    quality: f64,
    /// Sweep this far past each threshold so every cycle crosses it
    overshoot: f64,
}

impl SimulatedAngleSource {
    pub fn new(clock: Arc<dyn Clock>, table: ExerciseTable, exercise: ExerciseKind) -> Self {
        Self {
            clock,
            table,
            exercise,
            progress: 0.0,
            quality: 0.9,
            overshoot: 5.0,
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    fn angles(&self, depth: f64) -> JointAngles {
        let thresholds = self.table.thresholds(self.exercise);
        let top = (thresholds.up_angle + self.overshoot).min(180.0);
        let bottom = (thresholds.down_angle - self.overshoot).max(0.0);
        let angle = top - (top - bottom) * depth;

        let mut angles = JointAngles {
            left_elbow: Some(165.0),
            right_elbow: Some(165.0),
            left_knee: Some(160.0),
            right_knee: Some(160.0),
            left_hip: Some(150.0),
            right_hip: Some(150.0),
            shoulder_hip_alignment: Some(150.0),
            torso_forward: Some(12.0),
        };
        match self.exercise {
            ExerciseKind::Squat => {
                angles.left_knee = Some(angle);
                angles.right_knee = Some(angle);
                angles.torso_forward = Some(10.0 + depth * 10.0);
            }
            ExerciseKind::PushUp => {
                angles.left_elbow = Some(angle);
                angles.right_elbow = Some(angle);
                angles.left_knee = Some(175.0);
                angles.right_knee = Some(175.0);
                angles.torso_forward = Some(5.0);
            }
            ExerciseKind::Crunch => {
                angles.left_hip = Some(angle);
                angles.right_hip = Some(angle);
                angles.left_knee = Some(90.0);
                angles.right_knee = Some(90.0);
                angles.shoulder_hip_alignment = Some(140.0 - depth * 25.0);
                angles.torso_forward = Some(15.0 + depth * 8.0);
            }
        }
        angles
    }
}

impl AngleSource for SimulatedAngleSource {
    fn next(&mut self) -> Option<AngleSample> {
        self.progress = (self.progress + PROGRESS_STEP) % TAU;
        let depth = (self.progress.sin() + 1.0) / 2.0;
        Some(AngleSample::new(self.angles(depth), self.clock.now(), self.quality))
    }

    fn track(&mut self, exercise: ExerciseKind) {
        if exercise != self.exercise {
            log::debug!("Simulated pose switching to {}", exercise);
            self.exercise = exercise;
            self.progress = 0.0;
        }
    }
}

/// Wearable that climbs from a resting rate during a workout
pub struct SimulatedBiometricSource {
    clock: Arc<dyn Clock>,
    resting_bpm: f64,
    swing_bpm: f64,
    polls: u32,
    steps: u32,
    steps_per_poll: u32,
    /// Every n-th poll fails
    fail_every: Option<u32>,
}

impl SimulatedBiometricSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            resting_bpm: 72.0,
            swing_bpm: 60.0,
            polls: 0,
            steps: 0,
            steps_per_poll: 15,
            fail_every: None,
        }
    }

    pub fn failing_every(mut self, n: u32) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }
}

impl BiometricSource for SimulatedBiometricSource {
    fn poll(&mut self) -> Result<BiometricSample, SourceError> {
        self.polls += 1;
        if let Some(n) = self.fail_every {
            if self.polls % n == 0 {
                return Err(SourceError::Unavailable("simulated wearable outage".to_string()));
            }
        }

        let effort = (1.0 - (f64::from(self.polls) * 0.4).cos()) / 2.0;
        let bpm = (self.resting_bpm + self.swing_bpm * effort).round() as u16;
        self.steps += self.steps_per_poll;

        Ok(BiometricSample::reading(bpm, Some(self.steps), self.clock.wall()))
    }
}
