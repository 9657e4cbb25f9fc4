//! # Heart-Rate Zone & Freshness Classification
//!
//! Pure classification of wearable data into what the mirror displays:
//! a Karvonen training zone with a colour tier, and a freshness tier telling
//! whether the wearable link is keeping up with its poll interval.
//!
//! ## Zones (intensity = (hr - resting) / (max - resting), clipped to 0..=1)
//! - `< 0.50` resting, green
//! - `0.50..0.70` fat-burn, green
//! - `0.70..0.85` cardio, yellow
//! - `>= 0.85` peak, red
//!
//! ## Freshness (age = now - sample timestamp)
//! - `age < poll` fresh, green
//! - `poll <= age < 2 * poll` stale, yellow
//! - `age >= 2 * poll` or transport error: error, red

use crate::error::SetupError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for StatusColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusColor::Green => "green",
            StatusColor::Yellow => "yellow",
            StatusColor::Red => "red",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeartRateZone {
    Resting,
    FatBurn,
    Cardio,
    Peak,
    /// Heart-rate profile is degenerate; nothing meaningful to show
    Unknown,
}

impl HeartRateZone {
    pub fn color(&self) -> StatusColor {
        match self {
            HeartRateZone::Resting | HeartRateZone::FatBurn => StatusColor::Green,
            HeartRateZone::Cardio | HeartRateZone::Unknown => StatusColor::Yellow,
            HeartRateZone::Peak => StatusColor::Red,
        }
    }

    fn from_intensity(intensity: f64) -> Self {
        if intensity < 0.5 {
            HeartRateZone::Resting
        } else if intensity < 0.7 {
            HeartRateZone::FatBurn
        } else if intensity < 0.85 {
            HeartRateZone::Cardio
        } else {
            HeartRateZone::Peak
        }
    }
}

impl fmt::Display for HeartRateZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeartRateZone::Resting => "resting",
            HeartRateZone::FatBurn => "fat-burn",
            HeartRateZone::Cardio => "cardio",
            HeartRateZone::Peak => "peak",
            HeartRateZone::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Error,
}

impl Freshness {
    pub fn color(&self) -> StatusColor {
        match self {
            Freshness::Fresh => StatusColor::Green,
            Freshness::Stale => StatusColor::Yellow,
            Freshness::Error => StatusColor::Red,
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneReading {
    pub zone: HeartRateZone,
    pub color: StatusColor,
    /// Clipped Karvonen intensity; absent for `Unknown`
    pub intensity: Option<f64>,
}

/// Karvonen zone for `hr_bpm`.
///
/// A non-positive reserve falls back to `Unknown` and is logged; use
/// `HeartRateProfile::validate` to surface it as an error at setup.
pub fn zone(hr_bpm: f64, resting_hr: f64, max_hr: f64) -> ZoneReading {
    let reserve = max_hr - resting_hr;
    if !(reserve > 0.0) || !hr_bpm.is_finite() {
        log::warn!(
            "Cannot classify heart rate {} with resting {} / max {}",
            hr_bpm,
            resting_hr,
            max_hr
        );
        return ZoneReading {
            zone: HeartRateZone::Unknown,
            color: HeartRateZone::Unknown.color(),
            intensity: None,
        };
    }

    let intensity = ((hr_bpm - resting_hr) / reserve).clamp(0.0, 1.0);
    let zone = HeartRateZone::from_intensity(intensity);
    ZoneReading {
        zone,
        color: zone.color(),
        intensity: Some(intensity),
    }
}

/// Freshness of a sample stamped `sample_at` when observed at `now`.
///
/// Samples stamped in the future count as age zero.
pub fn freshness(sample_at: DateTime<Utc>, now: DateTime<Utc>, poll_interval: Duration) -> Freshness {
    let age = (now - sample_at).to_std().unwrap_or(Duration::ZERO);
    if age < poll_interval {
        Freshness::Fresh
    } else if age < poll_interval * 2 {
        Freshness::Stale
    } else {
        Freshness::Error
    }
}

/// Resting and maximum heart rate used for zone computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateProfile {
    pub resting_hr: f64,
    pub max_hr: Option<f64>,
    /// Used as `220 - age` when `max_hr` is not set
    pub age: Option<u32>,
}

impl Default for HeartRateProfile {
    fn default() -> Self {
        Self {
            resting_hr: 60.0,
            max_hr: Some(190.0),
            age: None,
        }
    }
}

impl HeartRateProfile {
    pub fn effective_max_hr(&self) -> Option<f64> {
        self.max_hr
            .or_else(|| self.age.map(|age| 220.0 - f64::from(age)))
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        let max_hr = self.effective_max_hr().unwrap_or(f64::NAN);
        if !(max_hr > self.resting_hr) || !self.resting_hr.is_finite() {
            return Err(SetupError::DegenerateHeartRateReserve {
                resting_hr: self.resting_hr,
                max_hr,
            });
        }
        Ok(())
    }

    pub fn classify(&self, hr_bpm: f64) -> ZoneReading {
        zone(hr_bpm, self.resting_hr, self.effective_max_hr().unwrap_or(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resting_hr_is_resting_zone() {
        let reading = zone(60.0, 60.0, 190.0);
        assert_eq!(reading.zone, HeartRateZone::Resting);
        assert_eq!(reading.color, StatusColor::Green);
        assert_eq!(reading.intensity, Some(0.0));
    }

    #[test]
    fn test_peak_threshold_from_reserve() {
        // 60 + 0.85 * 130 = 170.5, rounded up to a whole beat
        let reading = zone(171.0, 60.0, 190.0);
        assert_eq!(reading.zone, HeartRateZone::Peak);
        assert_eq!(reading.color, StatusColor::Red);
    }

    #[test]
    fn test_boundaries_belong_to_upper_zone() {
        // reserve 100 makes every boundary an exact bpm
        assert_eq!(zone(109.0, 60.0, 160.0).zone, HeartRateZone::Resting);
        assert_eq!(zone(110.0, 60.0, 160.0).zone, HeartRateZone::FatBurn);
        assert_eq!(zone(129.0, 60.0, 160.0).zone, HeartRateZone::FatBurn);
        assert_eq!(zone(130.0, 60.0, 160.0).zone, HeartRateZone::Cardio);
        assert_eq!(zone(130.0, 60.0, 160.0).color, StatusColor::Yellow);
        assert_eq!(zone(144.0, 60.0, 160.0).zone, HeartRateZone::Cardio);
        assert_eq!(zone(145.0, 60.0, 160.0).zone, HeartRateZone::Peak);
    }

    #[test]
    fn test_intensity_is_clipped() {
        assert_eq!(zone(40.0, 60.0, 160.0).intensity, Some(0.0));
        assert_eq!(zone(220.0, 60.0, 160.0).intensity, Some(1.0));
    }

    #[test]
    fn test_degenerate_reserve_is_unknown() {
        let reading = zone(120.0, 60.0, 60.0);
        assert_eq!(reading.zone, HeartRateZone::Unknown);
        assert_eq!(reading.intensity, None);
        assert_eq!(reading.color, StatusColor::Yellow);
    }

    #[test]
    fn test_freshness_tiers() {
        let now = Utc::now();
        let poll = Duration::from_secs(30);

        assert_eq!(freshness(now - chrono::Duration::seconds(10), now, poll), Freshness::Fresh);
        assert_eq!(freshness(now - chrono::Duration::seconds(30), now, poll), Freshness::Stale);
        assert_eq!(freshness(now - chrono::Duration::seconds(31), now, poll), Freshness::Stale);
        assert_eq!(freshness(now - chrono::Duration::seconds(60), now, poll), Freshness::Error);
        assert_eq!(freshness(now - chrono::Duration::seconds(61), now, poll), Freshness::Error);
    }

    #[test]
    fn test_future_sample_is_fresh() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(5);
        assert_eq!(freshness(later, now, Duration::from_secs(30)), Freshness::Fresh);
    }

    #[test]
    fn test_profile_age_fallback() {
        let profile = HeartRateProfile {
            resting_hr: 60.0,
            max_hr: None,
            age: Some(40),
        };
        assert_eq!(profile.effective_max_hr(), Some(180.0));
        assert!(profile.validate().is_ok());

        let missing = HeartRateProfile {
            resting_hr: 60.0,
            max_hr: None,
            age: None,
        };
        assert!(missing.validate().is_err());
        assert_eq!(missing.classify(120.0).zone, HeartRateZone::Unknown);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&HeartRateZone::FatBurn).unwrap(), "\"fat-burn\"");
        assert_eq!(serde_json::to_string(&Freshness::Stale).unwrap(), "\"stale\"");
        assert_eq!(serde_json::to_string(&StatusColor::Red).unwrap(), "\"red\"");
        assert_eq!(HeartRateZone::FatBurn.to_string(), "fat-burn");
    }
}
