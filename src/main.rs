use mirror_coach::driver::{DriverEvent, DriverSettings, MirrorDriver};
use mirror_coach::sources::{SimulatedAngleSource, SimulatedBiometricSource};
use mirror_coach::store::{BackgroundStore, JsonlSessionStore, SessionStore};
use mirror_coach::{Config, ExerciseKind, SessionEngine};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Demo workout: what the user says, and how long after the previous line
const SCRIPT: &[(u64, &str)] = &[
    (0, "start squats"),
    (6, "next"),
    (5, "pause"),
    (2, "resume"),
    (4, "cambiar a abdominales"),
    (5, "stop"),
];

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Using default settings: {}", e);
            Config::default()
        }
    };
    if let Err(e) = config.validate() {
        log::warn!("Configuration problem, sessions will be refused: {}", e);
    }

    let summaries_file = config.storage.resolved_summaries_file();
    log::info!("Session history: {}", summaries_file.display());
    let store = Arc::new(BackgroundStore::new(Arc::new(JsonlSessionStore::new(summaries_file))));

    let table = config.exercises.clone();
    let engine = Arc::new(SessionEngine::new(config).with_store(store.clone()));
    let clock = engine.clock().clone();

    let driver = match MirrorDriver::spawn(
        engine.clone(),
        Box::new(SimulatedAngleSource::new(clock.clone(), table, ExerciseKind::Squat)),
        Box::new(SimulatedBiometricSource::new(clock).failing_every(7)),
        DriverSettings {
            frame_interval: Duration::from_millis(20),
            poll_interval: Duration::from_secs(2),
        },
    ) {
        Ok(driver) => driver,
        Err(e) => {
            log::error!("Could not start the mirror: {}", e);
            std::process::exit(1);
        }
    };

    let mut finished = None;
    for (delay, line) in SCRIPT {
        let until = Instant::now() + Duration::from_secs(*delay);
        while let Some(left) = until.checked_duration_since(Instant::now()) {
            match driver.events().recv_timeout(left.min(Duration::from_secs(1))) {
                Ok(DriverEvent::RepCompleted { exercise, total }) => log::info!("{} #{}", exercise, total),
                Ok(DriverEvent::CommandRejected { input, reason }) => log::warn!("`{}` rejected: {}", input, reason),
                Ok(DriverEvent::SessionFinished(summary)) => finished = Some(summary),
                Ok(DriverEvent::CommandApplied(_)) => {}
                Err(_) => {
                    let status = engine.status();
                    log::info!(
                        "{} | {:?} | {} reps | quality {:.2} | {:?} | hr {:?}",
                        status.lifecycle,
                        status.exercise,
                        status.total_reps,
                        status.quality,
                        status.feedback,
                        status.heart_rate_avg.map(|v| v.round())
                    );
                }
            }
        }
        log::info!("User says: \"{}\"", line);
        driver.say(*line);
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while finished.is_none() && Instant::now() < deadline {
        if let Ok(DriverEvent::SessionFinished(summary)) = driver.events().recv_timeout(Duration::from_millis(100)) {
            finished = Some(summary);
        }
    }
    driver.shutdown();

    let latency = engine.latency();
    log::info!(
        "Vision p50 {:?} / p95 {:?}, {} frames/s",
        latency.vision.p50,
        latency.vision.p95,
        latency.vision.throughput
    );

    log::info!("{} posture samples recorded", engine.timeline().len());

    match finished.or_else(|| engine.summary()) {
        Some(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Could not encode summary: {}", e),
        },
        None => log::warn!("Session did not finish"),
    }

    match store.query(5) {
        Ok(history) => log::info!("{} recent sessions on record", history.len()),
        Err(e) => log::error!("Could not read session history: {}", e),
    }
}
