//! # Wearable Biometrics Module
//!
//! Samples arriving from the wearable poller and the running statistics the
//! session keeps about them.
//!
//! ## Key Types
//! - `BiometricSample`: one poll result, possibly without a reading
//! - `HeartRateStats`: rolling average, whole-session average and peak
//! - `BiometricStatus`: what the display shows for the latest sample
//!
//! A sample carrying the transport-error flag, or one that arrives without a
//! heart rate, still refreshes the freshness record. Only plausible bpm
//! readings reach the statistics.

use crate::config::BiometricsConfig;
use crate::error::SampleError;
use crate::timeseries::RollingMean;
use crate::zone::{self, Freshness, HeartRateProfile, StatusColor, ZoneReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricSample {
    pub heart_rate_bpm: Option<u16>,
    /// Cumulative daily step count
    pub steps: Option<u32>,
    pub recorded_at: DateTime<Utc>,
    pub transport_error: bool,
}

impl BiometricSample {
    pub fn reading(heart_rate_bpm: u16, steps: Option<u32>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            heart_rate_bpm: Some(heart_rate_bpm),
            steps,
            recorded_at,
            transport_error: false,
        }
    }

    /// Placeholder for a failed poll, stamped when the failure was seen
    pub fn transport_error(at: DateTime<Utc>) -> Self {
        Self {
            heart_rate_bpm: None,
            steps: None,
            recorded_at: at,
            transport_error: true,
        }
    }

    /// Heart rate checked against physical bounds
    pub fn validated_bpm(&self, config: &BiometricsConfig) -> Result<Option<u16>, SampleError> {
        match self.heart_rate_bpm {
            Some(bpm) if bpm < config.min_valid_bpm || bpm > config.max_valid_bpm => Err(SampleError::OutOfRange {
                field: "heart_rate_bpm",
                value: f64::from(bpm),
                min: f64::from(config.min_valid_bpm),
                max: f64::from(config.max_valid_bpm),
            }),
            other => Ok(other),
        }
    }

    pub fn freshness(&self, now: DateTime<Utc>, config: &BiometricsConfig) -> Freshness {
        if self.transport_error {
            return Freshness::Error;
        }
        zone::freshness(self.recorded_at, now, config.poll_interval())
    }
}

#[derive(Debug, Clone)]
pub struct HeartRateStats {
    rolling: RollingMean,
    sum: f64,
    count: u64,
    peak: Option<u16>,
    first_steps: Option<u32>,
    last_steps: Option<u32>,
    carried_steps: u32,
}

impl HeartRateStats {
    pub fn new(window: usize) -> Self {
        Self {
            rolling: RollingMean::new(window),
            sum: 0.0,
            count: 0,
            peak: None,
            first_steps: None,
            last_steps: None,
            carried_steps: 0,
        }
    }

    pub fn record_bpm(&mut self, bpm: u16) {
        let v = f64::from(bpm);
        self.rolling.push(v);
        self.sum += v;
        self.count += 1;
        self.peak = Some(self.peak.map_or(bpm, |p| p.max(bpm)));
    }

    pub fn record_steps(&mut self, steps: u32) {
        match (self.first_steps, self.last_steps) {
            // Step counters roll over at midnight; bank what was walked so far.
            (Some(first), Some(last)) if steps < last => {
                self.carried_steps = self.carried_steps.saturating_add(last.saturating_sub(first));
                self.first_steps = Some(steps);
            }
            (None, _) => self.first_steps = Some(steps),
            _ => {}
        }
        self.last_steps = Some(steps);
    }

    pub fn rolling_average(&self) -> Option<f64> {
        self.rolling.mean()
    }

    pub fn session_average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn peak(&self) -> Option<u16> {
        self.peak
    }

    pub fn latest_steps(&self) -> Option<u32> {
        self.last_steps
    }

    pub fn steps_taken(&self) -> Option<u32> {
        match (self.first_steps, self.last_steps) {
            (Some(first), Some(last)) => Some(self.carried_steps.saturating_add(last.saturating_sub(first))),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.rolling.clear();
        self.sum = 0.0;
        self.count = 0;
        self.peak = None;
        self.first_steps = None;
        self.last_steps = None;
        self.carried_steps = 0;
    }
}

/// Display status derived from the most recent sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BiometricStatus {
    pub heart_rate_bpm: Option<u16>,
    pub zone: Option<ZoneReading>,
    pub freshness: Freshness,
    pub freshness_color: StatusColor,
    pub staleness_secs: f64,
}

impl BiometricStatus {
    pub fn derive(
        sample: &BiometricSample,
        now: DateTime<Utc>,
        config: &BiometricsConfig,
        profile: &HeartRateProfile,
    ) -> Self {
        let freshness = sample.freshness(now, config);
        let staleness_secs = (now - sample.recorded_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            heart_rate_bpm: sample.heart_rate_bpm,
            zone: sample.heart_rate_bpm.map(|bpm| profile.classify(f64::from(bpm))),
            freshness,
            freshness_color: freshness.color(),
            staleness_secs,
        }
    }
}
