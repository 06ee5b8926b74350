//! Geometric route estimate used when no live routing answer is available

use crate::models::{Coordinates, RouteEstimate, RouteSource, RouteStep, TravelMode};

/// Real paths are longer than the straight line between two points
pub const PATH_INFLATION: f64 = 1.3;

/// Pure estimator: haversine distance, inflated, divided by a per-mode speed.
pub struct FallbackRouteSynthesizer;

impl FallbackRouteSynthesizer {
    #[must_use]
    pub fn synthesize(
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
    ) -> RouteEstimate {
        let straight_line = origin.distance_meters(destination);
        let distance = straight_line * PATH_INFLATION;
        // saturating cast; distance is finite and non-negative
        let minutes = (distance / mode.average_speed_m_per_min()).ceil() as u32;
        let total_duration = minutes.max(RouteEstimate::MIN_DURATION_MINUTES);

        RouteEstimate {
            steps: vec![RouteStep {
                instruction: format!(
                    "Estimated {mode} route, about {:.0} m (no live route available)",
                    distance
                ),
                distance_meters: distance,
                duration_minutes: total_duration,
            }],
            total_duration,
            total_distance: distance,
            polyline: String::new(),
            last_departure_warning: None,
            source: RouteSource::Estimate,
        }
    }
}
