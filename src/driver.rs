//! # Mirror Driver Module
//!
//! Wires producers to the engine. Each producer gets its own thread and runs
//! at its own cadence; they share nothing but the `Arc<SessionEngine>`.
//!
//! ## Threads
//! - **vision**: pulls an `AngleSample` every frame interval
//! - **wearable**: polls the biometric source every poll interval; a failed
//!   poll becomes a transport-error sample
//! - **commands**: drains the command queue in arrival order, parsing
//!   utterances against the active exercise
//!
//! All three watch one stop flag. `shutdown` raises it and joins them.

use crate::biometrics::BiometricSample;
use crate::command::{parse_command, Command};
use crate::exercise::ExerciseKind;
use crate::session::{SessionEngine, SessionSummary, TickOutcome};
use crate::sources::{AngleSource, BiometricSource};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Longest time a thread sleeps before rechecking the stop flag
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSettings {
    pub frame_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            // ~15 fps
            frame_interval: Duration::from_millis(66),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Input accepted by the command thread
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    /// Raw text from the voice recognizer or API
    Utterance(String),
    Parsed(Command),
}

/// What the driver reports back to whoever owns it
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    RepCompleted { exercise: ExerciseKind, total: u32 },
    CommandApplied(Command),
    CommandRejected { input: String, reason: String },
    SessionFinished(SessionSummary),
}

pub struct MirrorDriver {
    command_tx: Sender<DriverCommand>,
    events: Receiver<DriverEvent>,
    should_stop: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl MirrorDriver {
    pub fn spawn(
        engine: Arc<SessionEngine>,
        angles: Box<dyn AngleSource>,
        wearable: Box<dyn BiometricSource>,
        settings: DriverSettings,
    ) -> io::Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, events) = unbounded();
        let should_stop = Arc::new(AtomicBool::new(false));

        let mut driver = MirrorDriver {
            command_tx,
            events,
            should_stop: should_stop.clone(),
            threads: Vec::with_capacity(3),
        };

        let spawned = [
            {
                let (engine, stop, events) = (engine.clone(), should_stop.clone(), event_tx.clone());
                thread::Builder::new()
                    .name("vision".into())
                    .spawn(move || vision_loop(engine, angles, events, stop, settings.frame_interval))
            },
            {
                let (engine, stop) = (engine.clone(), should_stop.clone());
                thread::Builder::new()
                    .name("wearable".into())
                    .spawn(move || wearable_loop(engine, wearable, stop, settings.poll_interval))
            },
            {
                let stop = should_stop.clone();
                thread::Builder::new()
                    .name("commands".into())
                    .spawn(move || command_loop(engine, command_rx, event_tx, stop))
            },
        ];

        for handle in spawned {
            match handle {
                Ok(handle) => driver.threads.push(handle),
                Err(e) => {
                    // Dropping the driver stops whatever did start.
                    log::error!("Failed to spawn producer thread: {}", e);
                    return Err(e);
                }
            }
        }

        log::info!("Mirror driver started");
        Ok(driver)
    }

    /// Queue a command. Commands are applied strictly in submission order.
    pub fn submit(&self, command: DriverCommand) {
        if self.command_tx.send(command).is_err() {
            log::warn!("Command thread is gone; command dropped");
        }
    }

    pub fn say(&self, utterance: impl Into<String>) {
        self.submit(DriverCommand::Utterance(utterance.into()));
    }

    pub fn commands(&self) -> Sender<DriverCommand> {
        self.command_tx.clone()
    }

    pub fn events(&self) -> &Receiver<DriverEvent> {
        &self.events
    }

    pub fn shutdown(mut self) {
        self.stop_threads();
        log::info!("Mirror driver stopped");
    }

    fn stop_threads(&mut self) {
        self.should_stop.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("Producer thread panicked");
            }
        }
    }
}

impl Drop for MirrorDriver {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

fn vision_loop(
    engine: Arc<SessionEngine>,
    mut source: Box<dyn AngleSource>,
    events: Sender<DriverEvent>,
    should_stop: Arc<AtomicBool>,
    interval: Duration,
) {
    while !should_stop.load(Ordering::Relaxed) {
        if let Some(exercise) = engine.active_exercise() {
            source.track(exercise);
            if let Some(sample) = source.next() {
                // Rejections are logged and counted by the engine
                if let Ok(TickOutcome::Observed { exercise, observation }) = engine.on_angle_tick(&sample) {
                    if observation.rep_completed {
                        let total = engine.status().reps.get(&exercise).copied().unwrap_or_default();
                        let _ = events.send(DriverEvent::RepCompleted { exercise, total });
                    }
                }
            }
        }
        sleep_unless_stopped(&should_stop, interval);
    }
    log::debug!("Vision thread stopped");
}

fn wearable_loop(
    engine: Arc<SessionEngine>,
    mut source: Box<dyn BiometricSource>,
    should_stop: Arc<AtomicBool>,
    interval: Duration,
) {
    while !should_stop.load(Ordering::Relaxed) {
        let sample = match source.poll() {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("Wearable poll failed: {}", e);
                BiometricSample::transport_error(engine.clock().wall())
            }
        };
        let _ = engine.on_biometric_tick(&sample);
        sleep_unless_stopped(&should_stop, interval);
    }
    log::debug!("Wearable thread stopped");
}

fn command_loop(
    engine: Arc<SessionEngine>,
    commands: Receiver<DriverCommand>,
    events: Sender<DriverEvent>,
    should_stop: Arc<AtomicBool>,
) {
    while !should_stop.load(Ordering::Relaxed) {
        let input = match commands.recv_timeout(STOP_POLL) {
            Ok(input) => input,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let (text, parsed) = match input {
            DriverCommand::Parsed(command) => (command.to_string(), Ok(command)),
            DriverCommand::Utterance(text) => {
                // "next" and a bare "start" resolve against what is on screen
                let current = engine.active_exercise().or_else(|| engine.status().exercise);
                let parsed = parse_command(&text, current);
                (text, parsed)
            }
        };

        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Ignoring `{}`: {}", text, e);
                let _ = events.send(DriverEvent::CommandRejected {
                    input: text,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match engine.apply(command) {
            Ok(summary) => {
                let _ = events.send(DriverEvent::CommandApplied(command));
                if let Some(summary) = summary {
                    let _ = events.send(DriverEvent::SessionFinished(summary));
                }
            }
            Err(e) => {
                let _ = events.send(DriverEvent::CommandRejected {
                    input: text,
                    reason: e.to_string(),
                });
            }
        }
    }
    log::debug!("Command thread stopped");
}

fn sleep_unless_stopped(should_stop: &AtomicBool, total: Duration) {
    let mut remaining = total;
    while !remaining.is_zero() && !should_stop.load(Ordering::Relaxed) {
        let step = remaining.min(STOP_POLL);
        thread::sleep(step);
        remaining -= step;
    }
}
