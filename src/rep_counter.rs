//! # Repetition Counter Module
//!
//! Turns the noisy primary joint angle of one exercise into repetition events
//! and a form-quality score.
//!
//! ## Phase Machine
//! ```text
//!        angle <= down_angle
//!   Up ───────────────────────▶ Down
//!    ▲                           │
//!    └───────────────────────────┘
//!        angle >= up_angle  (rep counted here)
//! ```
//! Angles strictly between the thresholds never change the phase. That dead
//! band is what keeps sensor jitter from double-counting, and samples inside
//! it are reported as `Transitioning`.
//!
//! ## Quality
//! Per-sample quality is the frame's pose confidence times a form score: how
//! close the current phase's extremum (deepest angle while Down, highest while
//! Up) sits to that phase's threshold. Frames below `min_frame_quality` still
//! drive the phase but are kept out of the rolling mean.
//!
//! ## Posture
//! Every seen frame also grades the body parts that matter for the exercise
//! (legs for squats, arms for push-ups, the torso for all three) against the
//! current phase's target. A part that stands out produces a part-aware cue;
//! otherwise the cue comes from the primary angle alone.

use crate::config::RepCounterConfig;
use crate::error::SampleError;
use crate::exercise::{AngleSample, ExerciseKind, ExerciseThresholds, JointAngles};
use crate::timeseries::RollingMean;
use crate::zone::StatusColor;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Forward lean past this many degrees counts against a squat
const MAX_SQUAT_TORSO_LEAN: f64 = 25.0;
/// A push-up torso flatter than this is sagging
const MIN_PUSHUP_TORSO_ANGLE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepPhase {
    Up,
    Down,
    /// Reported for samples inside the dead band; never stored
    Transitioning,
}

/// Coaching cue for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFeedback {
    NoSkeleton,
    GoLower,
    ControlUp,
    GoHigher,
    ProtectNeck,
    StraightBack,
    BraceCore,
    GoLowerLeft,
    GoLowerRight,
    ExtendLeft,
    ExtendRight,
    Excellent,
    Good,
    KeepTrying,
}

/// Posture grade per body part.
///
/// A part is green within the feedback margin of its target, yellow within
/// twice the margin and red beyond. Parts the exercise does not grade, and
/// joints the camera did not see, stay green.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartColors {
    pub left_arm: StatusColor,
    pub right_arm: StatusColor,
    pub left_leg: StatusColor,
    pub right_leg: StatusColor,
    pub torso: StatusColor,
}

impl Default for PartColors {
    fn default() -> Self {
        Self {
            left_arm: StatusColor::Green,
            right_arm: StatusColor::Green,
            left_leg: StatusColor::Green,
            right_leg: StatusColor::Green,
            torso: StatusColor::Green,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepObservation {
    pub rep_completed: bool,
    /// Rolling quality average after this sample, 0..=1
    pub quality: f64,
    /// This sample's own score, `None` when it was not scored
    pub sample_quality: Option<f64>,
    pub phase: RepPhase,
    pub angle: Option<f64>,
    pub feedback: FormFeedback,
    /// `None` when the skeleton was not seen
    pub parts: Option<PartColors>,
    /// The angle jumped across the whole dead band since the previous sample.
    /// A rep may have been missed in between.
    pub fast_transition: bool,
}

#[derive(Debug, Clone)]
pub struct RepCounter {
    kind: ExerciseKind,
    thresholds: ExerciseThresholds,
    settings: RepCounterConfig,
    phase: RepPhase,
    count: u32,
    quality: RollingMean,
    smoothing: RollingMean,
    pending_frames: u32,
    extremum: Option<f64>,
    previous_angle: Option<f64>,
    last_transition_at: Option<Instant>,
    fast_transitions: u32,
}

impl RepCounter {
    pub fn new(kind: ExerciseKind, thresholds: ExerciseThresholds, settings: RepCounterConfig) -> Self {
        Self {
            kind,
            thresholds,
            quality: RollingMean::new(settings.quality_window),
            smoothing: RollingMean::new(settings.smoothing_window),
            settings,
            phase: RepPhase::Up,
            count: 0,
            pending_frames: 0,
            extremum: None,
            previous_angle: None,
            last_transition_at: None,
            fast_transitions: 0,
        }
    }

    pub fn kind(&self) -> ExerciseKind {
        self.kind
    }

    pub fn phase(&self) -> RepPhase {
        self.phase
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Rolling quality average; 0 before any sample was scored
    pub fn quality(&self) -> f64 {
        self.quality.mean().unwrap_or(0.0)
    }

    pub fn last_transition_at(&self) -> Option<Instant> {
        self.last_transition_at
    }

    pub fn fast_transitions(&self) -> u32 {
        self.fast_transitions
    }

    /// Feed one frame.
    ///
    /// Out-of-range angles or frame quality reject the sample without touching
    /// any state. A frame without the exercise's joints is not an error: it
    /// reports `NoSkeleton` and leaves the phase alone.
    pub fn observe(&mut self, sample: &AngleSample) -> Result<RepObservation, SampleError> {
        let frame_quality = sample.validate_quality()?;
        sample.angles.check_posture()?;
        let raw = match sample.angles.primary_angle(self.kind) {
            Ok(angle) => angle,
            Err(SampleError::MissingPrimaryAngle(_)) => return Ok(self.no_skeleton()),
            Err(e) => return Err(e),
        };

        self.smoothing.push(raw);
        let angle = self.smoothing.mean().unwrap_or(raw);
        let ExerciseThresholds { down_angle, up_angle } = self.thresholds;

        let fast_transition = match self.previous_angle {
            Some(prev) => (prev <= down_angle && angle >= up_angle) || (prev >= up_angle && angle <= down_angle),
            None => false,
        };
        if fast_transition {
            self.fast_transitions += 1;
            log::debug!(
                "{}: angle jumped {:.1} -> {:.1} across the whole band, possible missed rep",
                self.kind,
                self.previous_angle.unwrap_or(angle),
                angle
            );
        }
        self.previous_angle = Some(angle);

        let rep_completed = self.advance_phase(angle, sample.captured_at);

        let form = self.form_score();
        let sample_quality = if frame_quality >= self.settings.min_frame_quality {
            let q = (form * frame_quality).clamp(0.0, 1.0);
            self.quality.push(q);
            Some(q)
        } else {
            None
        };

        let phase = if angle > down_angle && angle < up_angle {
            RepPhase::Transitioning
        } else {
            self.phase
        };

        let parts = self.part_colors(&sample.angles);
        Ok(RepObservation {
            rep_completed,
            quality: self.quality(),
            sample_quality,
            phase,
            angle: Some(angle),
            feedback: self.feedback(angle, form, &sample.angles, &parts),
            parts: Some(parts),
            fast_transition,
        })
    }

    /// Zero the count, return to Up and forget all quality history
    pub fn reset(&mut self) {
        self.count = 0;
        self.quality.clear();
        self.fast_transitions = 0;
        self.last_transition_at = None;
        self.rearm();
    }

    /// Return to Up keeping the count, e.g. when the user switches back to
    /// this exercise and may be standing in a different posture.
    pub fn rearm(&mut self) {
        self.phase = RepPhase::Up;
        self.pending_frames = 0;
        self.extremum = None;
        self.previous_angle = None;
        self.smoothing.clear();
    }

    fn advance_phase(&mut self, angle: f64, at: Instant) -> bool {
        let crossed = match self.phase {
            RepPhase::Down => angle >= self.thresholds.up_angle,
            _ => angle <= self.thresholds.down_angle,
        };

        if !crossed {
            self.pending_frames = 0;
            self.track_extremum(angle);
            return false;
        }

        self.pending_frames += 1;
        if self.pending_frames < self.settings.confirm_frames {
            self.track_extremum(angle);
            return false;
        }

        self.pending_frames = 0;
        self.extremum = Some(angle);
        self.last_transition_at = Some(at);

        if self.phase == RepPhase::Down {
            self.phase = RepPhase::Up;
            self.count += 1;
            log::debug!("{}: rep {} completed at {:.1}°", self.kind, self.count, angle);
            true
        } else {
            self.phase = RepPhase::Down;
            false
        }
    }

    fn track_extremum(&mut self, angle: f64) {
        self.extremum = Some(match (self.phase, self.extremum) {
            (RepPhase::Down, Some(e)) => e.min(angle),
            (_, Some(e)) => e.max(angle),
            (_, None) => angle,
        });
    }

    /// Threshold the current phase is heading for
    fn phase_target(&self) -> f64 {
        match self.phase {
            RepPhase::Down => self.thresholds.down_angle,
            _ => self.thresholds.up_angle,
        }
    }

    fn margin(&self) -> f64 {
        (self.thresholds.span() * 0.1).max(5.0)
    }

    fn form_score(&self) -> f64 {
        let Some(extremum) = self.extremum else {
            return 0.0;
        };
        let span = self.thresholds.span().max(10.0);
        (1.0 - 1.2 * (extremum - self.phase_target()).abs() / span).clamp(0.0, 1.0)
    }

    fn part_colors(&self, angles: &JointAngles) -> PartColors {
        let target = self.phase_target();
        let margin = self.margin();
        let grade = |error: f64| {
            if error <= margin {
                StatusColor::Green
            } else if error <= 2.0 * margin {
                StatusColor::Yellow
            } else {
                StatusColor::Red
            }
        };
        let off_target = |angle: Option<f64>| grade(angle.map_or(0.0, |a| (a - target).abs()));

        let mut parts = PartColors::default();
        match self.kind {
            ExerciseKind::Squat => {
                parts.left_leg = off_target(angles.left_knee);
                parts.right_leg = off_target(angles.right_knee);
                let lean = angles.torso_forward.unwrap_or(0.0);
                parts.torso = grade((lean - MAX_SQUAT_TORSO_LEAN).max(0.0));
            }
            ExerciseKind::PushUp => {
                parts.left_arm = off_target(angles.left_elbow);
                parts.right_arm = off_target(angles.right_elbow);
                parts.torso = grade(
                    angles
                        .torso_forward
                        .map_or(0.0, |torso| (MIN_PUSHUP_TORSO_ANGLE - torso).max(0.0)),
                );
            }
            ExerciseKind::Crunch => {
                parts.torso = off_target(angles.shoulder_hip_alignment);
            }
        }
        parts
    }

    /// Cue for the worst graded part. Red beats yellow; on a tie the part
    /// listed first for the exercise wins.
    fn part_cue(&self, angle: f64, angles: &JointAngles, parts: &PartColors) -> Option<FormFeedback> {
        let target = self.phase_target();
        let candidates = match self.kind {
            ExerciseKind::Squat => [
                Some((parts.torso, FormFeedback::StraightBack)),
                uneven_side(
                    target,
                    (parts.left_leg, angles.left_knee),
                    (parts.right_leg, angles.right_knee),
                ),
            ],
            ExerciseKind::PushUp => [
                uneven_side(
                    target,
                    (parts.left_arm, angles.left_elbow),
                    (parts.right_arm, angles.right_elbow),
                ),
                Some((parts.torso, FormFeedback::BraceCore)),
            ],
            ExerciseKind::Crunch => {
                let cue = if angle < target - self.margin() {
                    FormFeedback::ProtectNeck
                } else {
                    FormFeedback::GoHigher
                };
                [Some((parts.torso, cue)), None]
            }
        };

        [StatusColor::Red, StatusColor::Yellow].into_iter().find_map(|severity| {
            candidates
                .iter()
                .flatten()
                .find(|(color, _)| *color == severity)
                .map(|(_, cue)| *cue)
        })
    }

    fn feedback(&self, angle: f64, form: f64, angles: &JointAngles, parts: &PartColors) -> FormFeedback {
        if let Some(cue) = self.part_cue(angle, angles, parts) {
            return cue;
        }

        let ExerciseThresholds { down_angle, up_angle } = self.thresholds;
        let margin = self.margin();

        match self.kind {
            ExerciseKind::Squat | ExerciseKind::PushUp => {
                if angle > up_angle - margin {
                    return FormFeedback::GoLower;
                }
                if angle < down_angle + margin {
                    return FormFeedback::ControlUp;
                }
            }
            ExerciseKind::Crunch => {
                if angle < down_angle - margin {
                    return FormFeedback::ProtectNeck;
                }
                if angle > up_angle - margin {
                    return FormFeedback::GoHigher;
                }
            }
        }

        if form >= 0.85 {
            FormFeedback::Excellent
        } else if form >= 0.65 {
            FormFeedback::Good
        } else {
            FormFeedback::KeepTrying
        }
    }

    fn no_skeleton(&self) -> RepObservation {
        RepObservation {
            rep_completed: false,
            quality: self.quality(),
            sample_quality: None,
            phase: self.phase,
            angle: None,
            feedback: FormFeedback::NoSkeleton,
            parts: None,
            fast_transition: false,
        }
    }
}

/// Side cue for a limb pair whose sides are graded differently.
///
/// Both joints must be seen; an evenly graded pair yields nothing and leaves
/// the cue to the primary angle.
fn uneven_side(
    target: f64,
    left: (StatusColor, Option<f64>),
    right: (StatusColor, Option<f64>),
) -> Option<(StatusColor, FormFeedback)> {
    let ((left_color, Some(left_angle)), (right_color, Some(right_angle))) = (left, right) else {
        return None;
    };
    if left_color == right_color {
        return None;
    }

    let left_worse = matches!(
        (left_color, right_color),
        (StatusColor::Red, _) | (StatusColor::Yellow, StatusColor::Green)
    );
    let (color, angle, lower, extend) = if left_worse {
        (left_color, left_angle, FormFeedback::GoLowerLeft, FormFeedback::ExtendLeft)
    } else {
        (right_color, right_angle, FormFeedback::GoLowerRight, FormFeedback::ExtendRight)
    };
    Some((color, if angle > target { lower } else { extend }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::JointAngles;

    fn squat_counter() -> RepCounter {
        RepCounter::new(
            ExerciseKind::Squat,
            ExerciseThresholds::new(90.0, 160.0),
            RepCounterConfig::default(),
        )
    }

    fn knee(angle: f64) -> AngleSample {
        AngleSample::new(JointAngles::symmetric(ExerciseKind::Squat, angle), Instant::now(), 1.0)
    }

    fn feed(counter: &mut RepCounter, angles: &[f64]) -> u32 {
        angles
            .iter()
            .map(|a| counter.observe(&knee(*a)).unwrap())
            .filter(|obs| obs.rep_completed)
            .count() as u32
    }

    #[test]
    fn test_rep_fires_on_down_to_up_only() {
        let mut counter = squat_counter();

        let down = counter.observe(&knee(85.0)).unwrap();
        assert!(!down.rep_completed);
        assert_eq!(counter.phase(), RepPhase::Down);

        let mid = counter.observe(&knee(120.0)).unwrap();
        assert!(!mid.rep_completed);
        assert_eq!(mid.phase, RepPhase::Transitioning);

        let up = counter.observe(&knee(165.0)).unwrap();
        assert!(up.rep_completed);
        assert_eq!(counter.phase(), RepPhase::Up);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let mut counter = squat_counter();
        assert_eq!(feed(&mut counter, &[90.0]), 0);
        assert_eq!(counter.phase(), RepPhase::Down);
        assert_eq!(feed(&mut counter, &[160.0]), 1);
    }

    #[test]
    fn test_hysteresis_band_never_counts() {
        let mut counter = squat_counter();
        let jitter: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 91.0 } else { 159.0 }).collect();
        assert_eq!(feed(&mut counter, &jitter), 0);
        assert_eq!(counter.phase(), RepPhase::Up);

        // Once at the bottom, jitter inside the band still adds nothing
        feed(&mut counter, &[80.0]);
        assert_eq!(feed(&mut counter, &jitter), 0);
        assert_eq!(counter.phase(), RepPhase::Down);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_one_rep_per_cycle() {
        let mut counter = squat_counter();
        let cycle = [170.0, 140.0, 100.0, 85.0, 88.0, 120.0, 150.0, 165.0, 170.0];
        for _ in 0..5 {
            assert_eq!(feed(&mut counter, &cycle), 1);
        }
        assert_eq!(counter.count(), 5);
    }

    #[test]
    fn test_out_of_range_rejected_without_phase_change() {
        let mut counter = squat_counter();
        assert!(counter.observe(&knee(-5.0)).is_err());
        assert!(counter.observe(&knee(200.0)).is_err());
        assert!(counter.observe(&knee(f64::NAN)).is_err());
        assert_eq!(counter.phase(), RepPhase::Up);

        let bad_quality = AngleSample::new(JointAngles::symmetric(ExerciseKind::Squat, 80.0), Instant::now(), 1.5);
        assert!(matches!(
            counter.observe(&bad_quality),
            Err(SampleError::OutOfRange { field: "quality", .. })
        ));
        assert_eq!(counter.phase(), RepPhase::Up);
    }

    #[test]
    fn test_low_quality_frames_drive_phase_but_not_score() {
        let mut counter = squat_counter();
        let blurry = |a: f64| AngleSample::new(JointAngles::symmetric(ExerciseKind::Squat, a), Instant::now(), 0.1);

        let obs = counter.observe(&blurry(85.0)).unwrap();
        assert_eq!(obs.sample_quality, None);
        let obs = counter.observe(&blurry(165.0)).unwrap();
        assert!(obs.rep_completed);
        assert_eq!(counter.quality(), 0.0);
    }

    #[test]
    fn test_quality_tracks_depth() {
        let mut exact = squat_counter();
        feed(&mut exact, &[90.0]);
        let on_target = exact.quality();

        let mut shallow = squat_counter();
        // 60 is 30 degrees past the threshold
        feed(&mut shallow, &[60.0]);
        let off_target = shallow.quality();

        assert!((on_target - 1.0).abs() < 1e-9);
        assert!(off_target < on_target);
        assert!((0.0..=1.0).contains(&off_target));
    }

    #[test]
    fn test_frame_quality_scales_score() {
        let mut counter = squat_counter();
        let sample = AngleSample::new(JointAngles::symmetric(ExerciseKind::Squat, 160.0), Instant::now(), 0.5);
        let obs = counter.observe(&sample).unwrap();
        assert_eq!(obs.sample_quality, Some(0.5));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut counter = squat_counter();
        feed(&mut counter, &[85.0, 165.0, 85.0]);
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.phase(), RepPhase::Down);

        counter.reset();
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.phase(), RepPhase::Up);
        assert_eq!(counter.quality(), 0.0);
        assert_eq!(counter.last_transition_at(), None);
    }

    #[test]
    fn test_rearm_keeps_count() {
        let mut counter = squat_counter();
        feed(&mut counter, &[85.0, 165.0, 85.0]);
        counter.rearm();
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.phase(), RepPhase::Up);
        // Standing back up after rearm is not a rep
        assert_eq!(feed(&mut counter, &[165.0]), 0);
    }

    #[test]
    fn test_confirm_frames_require_consecutive_samples() {
        let settings = RepCounterConfig {
            confirm_frames: 2,
            ..RepCounterConfig::default()
        };
        let mut counter = RepCounter::new(ExerciseKind::Squat, ExerciseThresholds::new(90.0, 160.0), settings);

        feed(&mut counter, &[85.0, 120.0]);
        assert_eq!(counter.phase(), RepPhase::Up);

        feed(&mut counter, &[85.0, 84.0]);
        assert_eq!(counter.phase(), RepPhase::Down);

        assert_eq!(feed(&mut counter, &[165.0]), 0);
        assert_eq!(feed(&mut counter, &[166.0]), 1);
    }

    #[test]
    fn test_fast_transition_counts_at_most_one_rep() {
        let mut counter = squat_counter();
        feed(&mut counter, &[170.0]);
        let obs = counter.observe(&knee(80.0)).unwrap();
        assert!(obs.fast_transition);
        let obs = counter.observe(&knee(170.0)).unwrap();
        assert!(obs.fast_transition);
        assert!(obs.rep_completed);
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.fast_transitions(), 2);
    }

    #[test]
    fn test_missing_joints_report_no_skeleton() {
        let mut counter = squat_counter();
        let sample = AngleSample::new(JointAngles::symmetric(ExerciseKind::PushUp, 90.0), Instant::now(), 1.0);
        let obs = counter.observe(&sample).unwrap();
        assert_eq!(obs.feedback, FormFeedback::NoSkeleton);
        assert_eq!(obs.angle, None);
        assert!(!obs.rep_completed);
    }

    #[test]
    fn test_feedback_cues() {
        let mut counter = squat_counter();
        assert_eq!(counter.observe(&knee(170.0)).unwrap().feedback, FormFeedback::GoLower);
        assert_eq!(counter.observe(&knee(92.0)).unwrap().feedback, FormFeedback::ControlUp);

        let mut crunch = RepCounter::new(
            ExerciseKind::Crunch,
            ExerciseThresholds::new(110.0, 140.0),
            RepCounterConfig::default(),
        );
        let hips = |a: f64| AngleSample::new(JointAngles::symmetric(ExerciseKind::Crunch, a), Instant::now(), 1.0);
        assert_eq!(crunch.observe(&hips(100.0)).unwrap().feedback, FormFeedback::ProtectNeck);
        assert_eq!(crunch.observe(&hips(139.0)).unwrap().feedback, FormFeedback::GoHigher);
    }

    fn pushup_counter() -> RepCounter {
        RepCounter::new(
            ExerciseKind::PushUp,
            ExerciseThresholds::new(90.0, 160.0),
            RepCounterConfig::default(),
        )
    }

    fn pose(angles: JointAngles) -> AngleSample {
        AngleSample::new(angles, Instant::now(), 1.0)
    }

    #[test]
    fn test_squat_torso_lean_asks_for_straight_back() {
        let mut counter = squat_counter();
        let leaning = |lean: f64| {
            pose(JointAngles {
                torso_forward: Some(lean),
                ..JointAngles::symmetric(ExerciseKind::Squat, 85.0)
            })
        };

        // Margin is 7 degrees past the 25 degree limit
        let obs = counter.observe(&leaning(45.0)).unwrap();
        assert_eq!(counter.phase(), RepPhase::Down);
        assert_eq!(obs.feedback, FormFeedback::StraightBack);
        let parts = obs.parts.unwrap();
        assert_eq!(parts.torso, StatusColor::Red);
        assert_eq!(parts.left_leg, StatusColor::Green);
        assert_eq!(parts.right_leg, StatusColor::Green);

        let obs = counter.observe(&leaning(35.0)).unwrap();
        assert_eq!(obs.parts.map(|p| p.torso), Some(StatusColor::Yellow));
        assert_eq!(obs.feedback, FormFeedback::StraightBack);

        let obs = counter.observe(&leaning(20.0)).unwrap();
        assert_eq!(obs.parts, Some(PartColors::default()));
        assert_ne!(obs.feedback, FormFeedback::StraightBack);
    }

    #[test]
    fn test_asymmetric_squat_names_the_lagging_knee() {
        let mut counter = squat_counter();
        feed(&mut counter, &[85.0]);

        let obs = counter
            .observe(&pose(JointAngles {
                left_knee: Some(88.0),
                right_knee: Some(115.0),
                ..JointAngles::default()
            }))
            .unwrap();
        assert_eq!(obs.feedback, FormFeedback::GoLowerRight);
        let parts = obs.parts.unwrap();
        assert_eq!(parts.left_leg, StatusColor::Green);
        assert_eq!(parts.right_leg, StatusColor::Red);
    }

    #[test]
    fn test_asymmetric_pushup_grades_each_arm() {
        let mut counter = pushup_counter();
        let elbows = |left: f64, right: f64| {
            pose(JointAngles {
                left_elbow: Some(left),
                right_elbow: Some(right),
                torso_forward: Some(15.0),
                ..JointAngles::default()
            })
        };

        // Top of the push-up with the right arm still bent
        let obs = counter.observe(&elbows(165.0, 140.0)).unwrap();
        assert_eq!(counter.phase(), RepPhase::Up);
        assert_eq!(obs.feedback, FormFeedback::ExtendRight);
        let parts = obs.parts.unwrap();
        assert_eq!(parts.left_arm, StatusColor::Green);
        assert_eq!(parts.right_arm, StatusColor::Red);
        assert_eq!(parts.torso, StatusColor::Green);

        // Bottom with the left arm lagging
        counter.observe(&elbows(85.0, 85.0)).unwrap();
        assert_eq!(counter.phase(), RepPhase::Down);
        let obs = counter.observe(&elbows(102.0, 92.0)).unwrap();
        assert_eq!(obs.feedback, FormFeedback::GoLowerLeft);
        assert_eq!(obs.parts.map(|p| (p.left_arm, p.right_arm)), Some((StatusColor::Yellow, StatusColor::Green)));
    }

    #[test]
    fn test_sagging_pushup_asks_to_brace() {
        let mut counter = pushup_counter();
        let obs = counter
            .observe(&pose(JointAngles {
                torso_forward: Some(0.0),
                ..JointAngles::symmetric(ExerciseKind::PushUp, 85.0)
            }))
            .unwrap();
        assert_eq!(obs.parts.map(|p| p.torso), Some(StatusColor::Yellow));
        assert_eq!(obs.feedback, FormFeedback::BraceCore);

        // Without a torso reading there is nothing to grade
        let obs = counter.observe(&pose(JointAngles::symmetric(ExerciseKind::PushUp, 85.0))).unwrap();
        assert_eq!(obs.parts.map(|p| p.torso), Some(StatusColor::Green));
        assert_ne!(obs.feedback, FormFeedback::BraceCore);
    }

    #[test]
    fn test_crunch_torso_drives_cue() {
        let mut crunch = RepCounter::new(
            ExerciseKind::Crunch,
            ExerciseThresholds::new(110.0, 140.0),
            RepCounterConfig::default(),
        );
        let obs = crunch
            .observe(&pose(JointAngles {
                shoulder_hip_alignment: Some(140.0),
                ..JointAngles::symmetric(ExerciseKind::Crunch, 108.0)
            }))
            .unwrap();
        assert_eq!(crunch.phase(), RepPhase::Down);
        assert_eq!(obs.parts.map(|p| p.torso), Some(StatusColor::Red));
        assert_eq!(obs.feedback, FormFeedback::GoHigher);
    }

    #[test]
    fn test_out_of_range_torso_rejects_sample() {
        let mut counter = squat_counter();
        let sample = pose(JointAngles {
            torso_forward: Some(240.0),
            ..JointAngles::symmetric(ExerciseKind::Squat, 85.0)
        });
        assert!(matches!(
            counter.observe(&sample),
            Err(SampleError::OutOfRange { field: "torso_forward", .. })
        ));
        assert_eq!(counter.phase(), RepPhase::Up);
    }

    #[test]
    fn test_no_skeleton_has_no_parts() {
        let mut counter = squat_counter();
        let obs = counter.observe(&pose(JointAngles::default())).unwrap();
        assert_eq!(obs.parts, None);
    }
}
