//! # Exercise Table Module
//!
//! Exercise kinds are a closed enumeration. Everything that differs between
//! them (which joint drives the rep, where the thresholds sit) is data looked
//! up by kind, so adding an exercise means adding a variant and a table row.
//!
//! ## Primary Angles
//! - Squat: mean of both knee angles
//! - Push-up: the smaller elbow angle (the arm that bends more)
//! - Crunch: mean of both hip angles, falling back to shoulder-hip alignment

use crate::error::{CommandParseError, SampleError, SetupError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

pub const MIN_JOINT_ANGLE: f64 = 0.0;
pub const MAX_JOINT_ANGLE: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Squat,
    PushUp,
    Crunch,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 3] = [ExerciseKind::Squat, ExerciseKind::PushUp, ExerciseKind::Crunch];

    pub fn name(&self) -> &'static str {
        match self {
            ExerciseKind::Squat => "squat",
            ExerciseKind::PushUp => "pushup",
            ExerciseKind::Crunch => "crunch",
        }
    }

    /// Next kind in table order, wrapping around. Backs the "next" voice intent.
    pub fn next(&self) -> ExerciseKind {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn index(&self) -> usize {
        match self {
            ExerciseKind::Squat => 0,
            ExerciseKind::PushUp => 1,
            ExerciseKind::Crunch => 2,
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExerciseKind {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match key.as_str() {
            "squat" | "squats" | "sentadilla" | "sentadillas" => Ok(ExerciseKind::Squat),
            "pushup" | "pushups" | "flexion" | "flexiones" | "lagartija" | "lagartijas" => {
                Ok(ExerciseKind::PushUp)
            }
            "crunch" | "crunches" | "abdominal" | "abdominales" => Ok(ExerciseKind::Crunch),
            _ => Err(CommandParseError::UnknownExercise(s.trim().to_string())),
        }
    }
}

/// One value per exercise kind, backed by a fixed array.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseMap<T> {
    slots: [T; 3],
}

impl<T> ExerciseMap<T> {
    pub fn from_fn(mut f: impl FnMut(ExerciseKind) -> T) -> Self {
        Self {
            slots: ExerciseKind::ALL.map(&mut f),
        }
    }

    pub fn get(&self, kind: ExerciseKind) -> &T {
        &self.slots[kind.index()]
    }

    pub fn get_mut(&mut self, kind: ExerciseKind) -> &mut T {
        &mut self.slots[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExerciseKind, &T)> + '_ {
        ExerciseKind::ALL.iter().map(move |kind| (*kind, self.get(*kind)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExerciseThresholds {
    pub down_angle: f64,
    pub up_angle: f64,
}

impl ExerciseThresholds {
    pub fn new(down_angle: f64, up_angle: f64) -> Self {
        Self { down_angle, up_angle }
    }

    pub fn span(&self) -> f64 {
        self.up_angle - self.down_angle
    }

    pub fn validate(&self, exercise: ExerciseKind) -> Result<(), SetupError> {
        let in_range = |a: f64| a.is_finite() && (MIN_JOINT_ANGLE..=MAX_JOINT_ANGLE).contains(&a);
        if !in_range(self.down_angle) || !in_range(self.up_angle) || self.down_angle >= self.up_angle {
            return Err(SetupError::DegenerateThresholds {
                exercise,
                down_angle: self.down_angle,
                up_angle: self.up_angle,
            });
        }
        Ok(())
    }
}

/// Threshold pair for every exercise kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTable {
    pub squat: ExerciseThresholds,
    pub pushup: ExerciseThresholds,
    pub crunch: ExerciseThresholds,
}

impl Default for ExerciseTable {
    fn default() -> Self {
        Self {
            squat: ExerciseThresholds::new(90.0, 160.0),
            pushup: ExerciseThresholds::new(90.0, 160.0),
            crunch: ExerciseThresholds::new(110.0, 140.0),
        }
    }
}

impl ExerciseTable {
    pub fn thresholds(&self, kind: ExerciseKind) -> ExerciseThresholds {
        match kind {
            ExerciseKind::Squat => self.squat,
            ExerciseKind::PushUp => self.pushup,
            ExerciseKind::Crunch => self.crunch,
        }
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        for kind in ExerciseKind::ALL {
            self.thresholds(kind).validate(kind)?;
        }
        Ok(())
    }
}

/// Named joint angles in degrees, as produced by the pose pipeline.
///
/// Joints the pipeline could not see are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointAngles {
    pub left_elbow: Option<f64>,
    pub right_elbow: Option<f64>,
    pub left_knee: Option<f64>,
    pub right_knee: Option<f64>,
    pub left_hip: Option<f64>,
    pub right_hip: Option<f64>,
    pub shoulder_hip_alignment: Option<f64>,
    pub torso_forward: Option<f64>,
}

impl JointAngles {
    /// Angles with both sides of `kind`'s driving joint set to `angle`
    pub fn symmetric(kind: ExerciseKind, angle: f64) -> Self {
        let mut angles = Self::default();
        match kind {
            ExerciseKind::Squat => {
                angles.left_knee = Some(angle);
                angles.right_knee = Some(angle);
            }
            ExerciseKind::PushUp => {
                angles.left_elbow = Some(angle);
                angles.right_elbow = Some(angle);
            }
            ExerciseKind::Crunch => {
                angles.left_hip = Some(angle);
                angles.right_hip = Some(angle);
            }
        }
        angles
    }

    /// Range-checks the torso readings used for posture grading
    pub fn check_posture(&self) -> Result<(), SampleError> {
        for (field, value) in [
            ("torso_forward", self.torso_forward),
            ("shoulder_hip_alignment", self.shoulder_hip_alignment),
        ] {
            if let Some(v) = value {
                check_angle(field, v)?;
            }
        }
        Ok(())
    }

    /// The angle that drives `kind`'s rep machine.
    ///
    /// Every contributing joint is range-checked; one bad joint rejects the sample.
    pub fn primary_angle(&self, kind: ExerciseKind) -> Result<f64, SampleError> {
        let pair = |field_l: &'static str,
                    l: Option<f64>,
                    field_r: &'static str,
                    r: Option<f64>|
         -> Result<Vec<f64>, SampleError> {
            let mut out = Vec::with_capacity(2);
            for (field, value) in [(field_l, l), (field_r, r)] {
                if let Some(v) = value {
                    out.push(check_angle(field, v)?);
                }
            }
            Ok(out)
        };

        match kind {
            ExerciseKind::Squat => {
                let knees = pair("left_knee", self.left_knee, "right_knee", self.right_knee)?;
                mean(&knees).ok_or(SampleError::MissingPrimaryAngle(kind))
            }
            ExerciseKind::PushUp => {
                let elbows = pair("left_elbow", self.left_elbow, "right_elbow", self.right_elbow)?;
                elbows
                    .into_iter()
                    .reduce(f64::min)
                    .ok_or(SampleError::MissingPrimaryAngle(kind))
            }
            ExerciseKind::Crunch => {
                let hips = pair("left_hip", self.left_hip, "right_hip", self.right_hip)?;
                if let Some(avg) = mean(&hips) {
                    return Ok(avg);
                }
                match self.shoulder_hip_alignment {
                    Some(v) => check_angle("shoulder_hip_alignment", v),
                    None => Err(SampleError::MissingPrimaryAngle(kind)),
                }
            }
        }
    }
}

fn check_angle(field: &'static str, value: f64) -> Result<f64, SampleError> {
    if value.is_finite() && (MIN_JOINT_ANGLE..=MAX_JOINT_ANGLE).contains(&value) {
        Ok(value)
    } else {
        Err(SampleError::OutOfRange {
            field,
            value,
            min: MIN_JOINT_ANGLE,
            max: MAX_JOINT_ANGLE,
        })
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// One processed video frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleSample {
    pub angles: JointAngles,
    pub captured_at: Instant,
    /// Pose-landmark confidence for the frame, 0..=1
    pub quality: f64,
}

impl AngleSample {
    pub fn new(angles: JointAngles, captured_at: Instant, quality: f64) -> Self {
        Self {
            angles,
            captured_at,
            quality,
        }
    }

    pub fn validate_quality(&self) -> Result<f64, SampleError> {
        if self.quality.is_finite() && (0.0..=1.0).contains(&self.quality) {
            Ok(self.quality)
        } else {
            Err(SampleError::OutOfRange {
                field: "quality",
                value: self.quality,
                min: 0.0,
                max: 1.0,
            })
        }
    }
}
