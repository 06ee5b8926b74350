//! Route estimate model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CompanionError;

/// How the user travels
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Walk,
    Transit,
    Drive,
}

impl TravelMode {
    /// Average speed used for estimates, meters per minute
    #[must_use]
    pub fn average_speed_m_per_min(self) -> f64 {
        match self {
            // includes stops and transfers
            TravelMode::Transit => 400.0,
            // city conditions
            TravelMode::Drive => 500.0,
            TravelMode::Walk => 80.0,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Walk => "walk",
            TravelMode::Transit => "transit",
            TravelMode::Drive => "drive",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = CompanionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "walk" | "walking" | "foot" => Ok(TravelMode::Walk),
            "transit" | "train" | "bus" => Ok(TravelMode::Transit),
            "drive" | "driving" | "car" => Ok(TravelMode::Drive),
            other => Err(CompanionError::validation(format!(
                "unknown travel mode '{other}'"
            ))),
        }
    }
}

/// Where a route estimate came from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteSource {
    Live,
    Cache,
    Estimate,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStep {
    pub instruction: String,
    pub distance_meters: f64,
    pub duration_minutes: u32,
}

/// A route between two points.
///
/// A request over a non-zero distance never carries a zero duration; see
/// [`RouteEstimate::clamp_duration`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteEstimate {
    pub steps: Vec<RouteStep>,
    /// Minutes
    pub total_duration: u32,
    /// Meters
    pub total_distance: f64,
    /// Encoded path geometry, empty when unknown
    #[serde(default)]
    pub polyline: String,
    // no skip_serializing_if: estimates round-trip through postcard in the route cache
    #[serde(default)]
    pub last_departure_warning: Option<String>,
    pub source: RouteSource,
}

impl RouteEstimate {
    pub const MIN_DURATION_MINUTES: u32 = 1;

    /// Applies the one-minute floor. The fallback synthesizer clamps every estimate,
    /// live answers are clamped only when they cover some distance.
    pub fn clamp_duration(&mut self) {
        if self.total_distance > 0.0 && self.total_duration < Self::MIN_DURATION_MINUTES {
            self.total_duration = Self::MIN_DURATION_MINUTES;
        }
    }

    #[must_use]
    pub fn is_approximate(&self) -> bool {
        self.source == RouteSource::Estimate
    }

    /// "850 m · 11 min walk", "3.2 km · 9 min drive"
    #[must_use]
    pub fn distance_label(&self, mode: TravelMode) -> String {
        let distance = if self.total_distance < 1000.0 {
            format!("{:.0} m", self.total_distance)
        } else {
            format!("{:.1} km", self.total_distance / 1000.0)
        };
        let prefix = if self.is_approximate() { "~" } else { "" };
        format!("{prefix}{distance} · {} min {mode}", self.total_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn estimate(distance: f64, duration: u32, source: RouteSource) -> RouteEstimate {
        RouteEstimate {
            steps: vec![],
            total_duration: duration,
            total_distance: distance,
            polyline: String::new(),
            last_departure_warning: None,
            source,
        }
    }

    #[rstest]
    #[case("walk", TravelMode::Walk)]
    #[case("Driving", TravelMode::Drive)]
    #[case(" transit ", TravelMode::Transit)]
    #[case("car", TravelMode::Drive)]
    fn test_parse_travel_mode(#[case] input: &str, #[case] expected: TravelMode) {
        assert_eq!(input.parse::<TravelMode>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_travel_mode() {
        assert!("teleport".parse::<TravelMode>().is_err());
    }

    #[test]
    fn test_clamp_duration_only_for_nonzero_distance() {
        let mut moving = estimate(30.0, 0, RouteSource::Live);
        moving.clamp_duration();
        assert_eq!(moving.total_duration, 1);

        let mut standing = estimate(0.0, 0, RouteSource::Live);
        standing.clamp_duration();
        assert_eq!(standing.total_duration, 0);
    }

    #[test]
    fn test_distance_label() {
        assert_eq!(
            estimate(850.0, 11, RouteSource::Live).distance_label(TravelMode::Walk),
            "850 m · 11 min walk"
        );
        assert_eq!(
            estimate(3240.0, 9, RouteSource::Cache).distance_label(TravelMode::Drive),
            "3.2 km · 9 min drive"
        );
        assert_eq!(
            estimate(1560.0, 20, RouteSource::Estimate).distance_label(TravelMode::Walk),
            "~1.6 km · 20 min walk"
        );
    }
}
