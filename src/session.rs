//! # Session Engine Module
//!
//! The aggregate every producer talks to. Vision frames, wearable polls and
//! voice/API commands all call into one `SessionEngine`, each call being one
//! critical section over the whole state, so `status()` always sees rep
//! totals, quality and lifecycle that belong together.
//!
//! ## Lifecycle
//! ```text
//!            start                pause
//!   Idle ───────────▶ Active ◀────────────▶ Paused
//!                      │  ▲      resume       │
//!                      │  └─ switch_exercise   │
//!                      └──────────┬────────────┘
//!                                 │ stop
//!                                 ▼
//!                              Stopped ── start ──▶ Active
//! ```
//! Any other command is rejected with `EngineError::InvalidTransition` and
//! changes nothing, not even `last_command`.
//!
//! ## Timing
//! Active duration accumulates only while Active. Durations come from the
//! engine's `Clock::now()`; stamps shown to the user come from `Clock::wall()`.
//!
//! ## Posture Timeline
//! Observed frames are sampled into a bounded timeline at most once per
//! `session.timeline_interval_ms`, plus every frame that completes a rep.
//! The timeline survives `stop` and is replaced by the next `start`.

use crate::biometrics::{BiometricSample, BiometricStatus, HeartRateStats};
use crate::clock::{Clock, SystemClock};
use crate::command::Command;
use crate::config::Config;
use crate::error::EngineError;
use crate::exercise::{AngleSample, ExerciseKind, ExerciseMap};
use crate::latency::{Channel, PerformanceMonitor, PerformanceReport};
use crate::rep_counter::{FormFeedback, PartColors, RepCounter, RepObservation, RepPhase};
use crate::store::SessionStore;
use crate::timeseries::{RollingMean, RollingWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Idle,
    Active,
    Paused,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Active => "active",
            Lifecycle::Paused => "paused",
            Lifecycle::Stopped => "stopped",
        })
    }
}

/// Last accepted command and when it was applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: Command,
    pub at: DateTime<Utc>,
}

/// Immutable record of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration: Duration,
    pub active_duration: Duration,
    pub total_reps: u32,
    /// Only exercises that were active at some point during the session
    pub rep_breakdown: BTreeMap<ExerciseKind, u32>,
    pub average_quality: f64,
    pub average_hr: Option<f64>,
    pub peak_hr: Option<u16>,
    pub steps: Option<u32>,
    pub final_exercise: ExerciseKind,
}

/// Coherent snapshot for the display and API layers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub lifecycle: Lifecycle,
    pub exercise: Option<ExerciseKind>,
    pub phase: Option<RepPhase>,
    pub active_duration: Duration,
    pub reps: BTreeMap<ExerciseKind, u32>,
    pub total_reps: u32,
    /// Rolling form quality, 0..=1
    pub quality: f64,
    pub heart_rate_avg: Option<f64>,
    pub peak_hr: Option<u16>,
    pub biometrics: Option<BiometricStatus>,
    pub steps: Option<u32>,
    pub last_command: Option<CommandRecord>,
    /// Cue from the latest frame of the current exercise
    pub feedback: Option<FormFeedback>,
    pub parts: Option<PartColors>,
}

/// One point of a session's posture timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureSample {
    /// Time since the session started
    pub offset: Duration,
    pub exercise: ExerciseKind,
    pub angle: Option<f64>,
    /// Reps of `exercise` so far
    pub rep_count: u32,
    pub rep_completed: bool,
    /// Time spent on the frame when it was sampled
    pub latency: Duration,
}

/// Result of an angle tick that was not rejected
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No session is Active; the frame was dropped
    Ignored(Lifecycle),
    Observed {
        exercise: ExerciseKind,
        observation: RepObservation,
    },
}

/// Counters of samples that did not make it into the statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub rejected_angle_samples: u64,
    pub rejected_biometric_samples: u64,
    pub frames_dropped_while_paused: u64,
    pub fast_transitions: u64,
}

/// Per-session state, created by `start` and frozen by `stop`
struct ActiveSession {
    exercise: ExerciseKind,
    started_at: DateTime<Utc>,
    started: Instant,
    accumulated: Duration,
    /// Set while Active
    resumed_at: Option<Instant>,
    counters: ExerciseMap<RepCounter>,
    used: ExerciseMap<bool>,
    quality: RollingMean,
    quality_sum: f64,
    quality_count: u64,
    last_feedback: Option<FormFeedback>,
    last_parts: Option<PartColors>,
    timeline: RollingWindow<PostureSample>,
    timeline_interval: Duration,
    last_sampled: Option<Duration>,
}

impl ActiveSession {
    fn new(exercise: ExerciseKind, config: &Config, now: Instant, wall: DateTime<Utc>) -> Self {
        let mut used = ExerciseMap::from_fn(|_| false);
        *used.get_mut(exercise) = true;

        Self {
            exercise,
            started_at: wall,
            started: now,
            accumulated: Duration::ZERO,
            resumed_at: Some(now),
            counters: ExerciseMap::from_fn(|kind| {
                RepCounter::new(kind, config.exercises.thresholds(kind), config.rep_counter.clone())
            }),
            used,
            quality: RollingMean::new(config.session.quality_window),
            quality_sum: 0.0,
            quality_count: 0,
            last_feedback: None,
            last_parts: None,
            timeline: RollingWindow::new(config.session.timeline_window),
            timeline_interval: config.session.timeline_interval(),
            last_sampled: None,
        }
    }

    fn active_duration(&self, now: Instant) -> Duration {
        match self.resumed_at {
            Some(resumed) => self.accumulated + now.saturating_duration_since(resumed),
            None => self.accumulated,
        }
    }

    fn freeze(&mut self, now: Instant) {
        self.accumulated = self.active_duration(now);
        self.resumed_at = None;
    }

    fn rep_breakdown(&self) -> BTreeMap<ExerciseKind, u32> {
        self.counters
            .iter()
            .filter(|(kind, _)| *self.used.get(*kind))
            .map(|(kind, counter)| (kind, counter.count()))
            .collect()
    }

    fn record_quality(&mut self, quality: f64) {
        self.quality.push(quality);
        self.quality_sum += quality;
        self.quality_count += 1;
    }

    fn record_posture(&mut self, observation: &RepObservation, now: Instant, latency: Duration) {
        self.last_feedback = Some(observation.feedback);
        self.last_parts = observation.parts;

        let offset = now.saturating_duration_since(self.started);
        let due = self
            .last_sampled
            .map_or(true, |last| offset.saturating_sub(last) >= self.timeline_interval);
        if due || observation.rep_completed {
            self.timeline.push(PostureSample {
                offset,
                exercise: self.exercise,
                angle: observation.angle,
                rep_count: self.counters.get(self.exercise).count(),
                rep_completed: observation.rep_completed,
                latency,
            });
            self.last_sampled = Some(offset);
        }
    }
}

struct EngineState {
    config: Config,
    lifecycle: Lifecycle,
    session: Option<ActiveSession>,
    heart_rate: HeartRateStats,
    last_sample: Option<BiometricSample>,
    last_command: Option<CommandRecord>,
    summary: Option<SessionSummary>,
    diagnostics: Diagnostics,
}

fn rejected(command: Command, state: Lifecycle) -> EngineError {
    EngineError::InvalidTransition {
        command: command.kind(),
        state,
    }
}

/// Owns all session state behind a single lock.
///
/// Construct one per mirror process and share it by `Arc`.
pub struct SessionEngine {
    state: Mutex<EngineState>,
    clock: Arc<dyn Clock>,
    monitor: PerformanceMonitor,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionEngine {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let monitor = PerformanceMonitor::new(config.latency.window);
        let heart_rate = HeartRateStats::new(config.biometrics.heart_rate_window);

        Self {
            state: Mutex::new(EngineState {
                config,
                lifecycle: Lifecycle::Idle,
                session: None,
                heart_rate,
                last_sample: None,
                last_command: None,
                summary: None,
                diagnostics: Diagnostics::default(),
            }),
            clock,
            monitor,
            store: None,
        }
    }

    /// Hand every finished session to `store`
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn start(&self, exercise: ExerciseKind) -> Result<(), EngineError> {
        self.run_command(Command::Start(exercise), |state, now, wall| {
            if !matches!(state.lifecycle, Lifecycle::Idle | Lifecycle::Stopped) {
                return Err(rejected(Command::Start(exercise), state.lifecycle));
            }
            state.config.validate()?;

            state.session = Some(ActiveSession::new(exercise, &state.config, now, wall));
            state.summary = None;
            state.heart_rate.clear();
            state.diagnostics = Diagnostics::default();
            state.lifecycle = Lifecycle::Active;
            Ok(())
        })
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.run_command(Command::Pause, |state, now, _| match (state.lifecycle, state.session.as_mut()) {
            (Lifecycle::Active, Some(session)) => {
                session.freeze(now);
                state.lifecycle = Lifecycle::Paused;
                Ok(())
            }
            _ => Err(rejected(Command::Pause, state.lifecycle)),
        })
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.run_command(Command::Resume, |state, now, _| match (state.lifecycle, state.session.as_mut()) {
            (Lifecycle::Paused, Some(session)) => {
                session.resumed_at = Some(now);
                state.lifecycle = Lifecycle::Active;
                Ok(())
            }
            _ => Err(rejected(Command::Resume, state.lifecycle)),
        })
    }

    /// Make `exercise` the one angle ticks are counted for.
    ///
    /// The target counter keeps its count but starts over from Up, since the
    /// user is likely in a different posture than when they left it.
    pub fn switch_exercise(&self, exercise: ExerciseKind) -> Result<(), EngineError> {
        let command = Command::SwitchExercise(exercise);
        self.run_command(command, |state, _, _| match (state.lifecycle, state.session.as_mut()) {
            (Lifecycle::Active, Some(session)) => {
                if session.exercise != exercise {
                    session.counters.get_mut(exercise).rearm();
                    *session.used.get_mut(exercise) = true;
                    session.exercise = exercise;
                    session.last_feedback = None;
                    session.last_parts = None;
                }
                Ok(())
            }
            _ => Err(rejected(command, state.lifecycle)),
        })
    }

    /// End the session and hand its summary to the store.
    ///
    /// A store failure is logged and does not undo the stop.
    pub fn stop(&self) -> Result<SessionSummary, EngineError> {
        let summary = self.run_command(Command::Stop, |state, now, wall| {
            if !matches!(state.lifecycle, Lifecycle::Active | Lifecycle::Paused) {
                return Err(rejected(Command::Stop, state.lifecycle));
            }
            let Some(session) = state.session.as_mut() else {
                return Err(rejected(Command::Stop, state.lifecycle));
            };

            session.freeze(now);
            let rep_breakdown = session.rep_breakdown();
            let summary = SessionSummary {
                started_at: session.started_at,
                ended_at: wall,
                total_duration: now.saturating_duration_since(session.started),
                active_duration: session.accumulated,
                total_reps: rep_breakdown.values().sum(),
                rep_breakdown,
                average_quality: if session.quality_count == 0 {
                    0.0
                } else {
                    (session.quality_sum / session.quality_count as f64).clamp(0.0, 1.0)
                },
                average_hr: state.heart_rate.session_average(),
                peak_hr: state.heart_rate.peak(),
                steps: state.heart_rate.steps_taken(),
                final_exercise: session.exercise,
            };

            state.summary = Some(summary.clone());
            state.lifecycle = Lifecycle::Stopped;
            Ok(summary)
        })?;

        log::info!(
            "Session finished: {} reps in {:.0}s active",
            summary.total_reps,
            summary.active_duration.as_secs_f64()
        );

        // Outside the engine lock
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&summary) {
                log::error!("Failed to store session summary: {}", e);
            }
        }

        Ok(summary)
    }

    /// Dispatch a parsed command. Returns the summary for `Stop`.
    pub fn apply(&self, command: Command) -> Result<Option<SessionSummary>, EngineError> {
        match command {
            Command::Start(kind) => self.start(kind).map(|_| None),
            Command::Pause => self.pause().map(|_| None),
            Command::Resume => self.resume().map(|_| None),
            Command::Stop => self.stop().map(Some),
            Command::SwitchExercise(kind) => self.switch_exercise(kind).map(|_| None),
        }
    }

    /// Feed one vision frame to the active exercise's counter.
    ///
    /// Frames arriving while no session is Active are ignored, not errors.
    pub fn on_angle_tick(&self, sample: &AngleSample) -> Result<TickOutcome, EngineError> {
        let timer = Instant::now();
        let outcome = {
            let mut state = self.lock();
            let state = &mut *state;

            match (state.lifecycle, state.session.as_mut()) {
                (Lifecycle::Active, Some(session)) => {
                    let exercise = session.exercise;
                    match session.counters.get_mut(exercise).observe(sample) {
                        Ok(observation) => {
                            if let Some(q) = observation.sample_quality {
                                session.record_quality(q);
                            }
                            session.record_posture(&observation, self.clock.now(), timer.elapsed());
                            if observation.fast_transition {
                                state.diagnostics.fast_transitions += 1;
                            }
                            Ok(TickOutcome::Observed { exercise, observation })
                        }
                        Err(e) => {
                            state.diagnostics.rejected_angle_samples += 1;
                            Err(EngineError::from(e))
                        }
                    }
                }
                (lifecycle, _) => {
                    if lifecycle == Lifecycle::Paused {
                        state.diagnostics.frames_dropped_while_paused += 1;
                    }
                    Ok(TickOutcome::Ignored(lifecycle))
                }
            }
        };
        self.monitor
            .tracker(Channel::Vision)
            .record(self.clock.now(), timer.elapsed());

        match &outcome {
            Ok(TickOutcome::Observed { exercise, observation }) if observation.rep_completed => {
                log::debug!("{} rep completed, quality {:.2}", exercise, observation.quality);
            }
            Err(e) => log::warn!("Discarded angle sample: {}", e),
            _ => {}
        }
        outcome
    }

    /// Record one wearable poll result.
    ///
    /// Accepted in every lifecycle state; heart rate keeps flowing while paused.
    pub fn on_biometric_tick(&self, sample: &BiometricSample) -> Result<BiometricStatus, EngineError> {
        let timer = Instant::now();
        let result = {
            let mut state = self.lock();
            match sample.validated_bpm(&state.config.biometrics) {
                Ok(bpm) => {
                    if let Some(bpm) = bpm {
                        state.heart_rate.record_bpm(bpm);
                    }
                    if let Some(steps) = sample.steps {
                        state.heart_rate.record_steps(steps);
                    }
                    state.last_sample = Some(*sample);
                    Ok(BiometricStatus::derive(
                        sample,
                        self.clock.wall(),
                        &state.config.biometrics,
                        &state.config.heart_rate,
                    ))
                }
                Err(e) => {
                    state.diagnostics.rejected_biometric_samples += 1;
                    Err(EngineError::from(e))
                }
            }
        };
        self.monitor
            .tracker(Channel::Biometrics)
            .record(self.clock.now(), timer.elapsed());

        match &result {
            Ok(status) if sample.transport_error => {
                log::warn!("Wearable transport error, status {}", status.freshness)
            }
            Ok(status) => log::debug!("Heart rate {:?} ({})", status.heart_rate_bpm, status.freshness),
            Err(e) => log::warn!("Discarded biometric sample: {}", e),
        }
        result
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.lock();
        let now = self.clock.now();
        let wall = self.clock.wall();

        let session = state.session.as_ref();
        let reps = session.map(ActiveSession::rep_breakdown).unwrap_or_default();

        SessionStatus {
            lifecycle: state.lifecycle,
            exercise: session.map(|s| s.exercise),
            phase: session.map(|s| s.counters.get(s.exercise).phase()),
            active_duration: session.map(|s| s.active_duration(now)).unwrap_or_default(),
            total_reps: reps.values().sum(),
            reps,
            quality: session
                .and_then(|s| s.quality.mean())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            heart_rate_avg: state.heart_rate.rolling_average(),
            peak_hr: state.heart_rate.peak(),
            biometrics: state.last_sample.as_ref().map(|sample| {
                BiometricStatus::derive(sample, wall, &state.config.biometrics, &state.config.heart_rate)
            }),
            steps: state.heart_rate.latest_steps(),
            last_command: state.last_command,
            feedback: session.and_then(|s| s.last_feedback),
            parts: session.and_then(|s| s.last_parts),
        }
    }

    /// Posture timeline of the current or last stopped session, oldest first
    pub fn timeline(&self) -> Vec<PostureSample> {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.timeline.to_vec())
            .unwrap_or_default()
    }

    /// Summary of the last stopped session, until the next `start`
    pub fn summary(&self) -> Option<SessionSummary> {
        self.lock().summary.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    /// Exercise being counted, while a session is running
    pub fn active_exercise(&self) -> Option<ExerciseKind> {
        let state = self.lock();
        match state.lifecycle {
            Lifecycle::Active | Lifecycle::Paused => state.session.as_ref().map(|s| s.exercise),
            _ => None,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> Config {
        self.lock().config.clone()
    }

    /// Replace the settings between sessions.
    ///
    /// The new settings are not validated here; `start` refuses them if they
    /// are degenerate.
    pub fn reconfigure(&self, config: Config) -> Result<(), EngineError> {
        let mut state = self.lock();
        if matches!(state.lifecycle, Lifecycle::Active | Lifecycle::Paused) {
            return Err(EngineError::SessionRunning(state.lifecycle));
        }
        if let Err(e) = config.validate() {
            log::warn!("New configuration will block sessions until fixed: {}", e);
        }
        state.heart_rate = HeartRateStats::new(config.biometrics.heart_rate_window);
        state.config = config;
        log::info!("Configuration replaced");
        Ok(())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.lock().diagnostics
    }

    pub fn latency(&self) -> PerformanceReport {
        self.monitor.report(self.clock.now())
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Run one command inside the critical section, stamp it on success and
    /// time it afterwards.
    fn run_command<T>(
        &self,
        command: Command,
        apply: impl FnOnce(&mut EngineState, Instant, DateTime<Utc>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let timer = Instant::now();
        let result = {
            let mut state = self.lock();
            let now = self.clock.now();
            let wall = self.clock.wall();
            let result = apply(&mut *state, now, wall);
            if result.is_ok() {
                state.last_command = Some(CommandRecord { command, at: wall });
            }
            result
        };
        self.monitor
            .tracker(Channel::Commands)
            .record(self.clock.now(), timer.elapsed());

        match &result {
            Ok(_) => log::info!("Applied `{}`", command),
            Err(e) => log::warn!("Rejected `{}`: {}", command, e),
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
