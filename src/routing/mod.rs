//! Route lookup with graceful degradation
//!
//! Live routing oracle first; when offline, or when the oracle fails, times out or
//! answers with no route, the route cache and then the geometric synthesizer answer
//! instead. Connectivity loss and oracle failure are handled identically.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::models::{Coordinates, RouteEstimate, RouteSource, TravelMode};
use crate::offline::OfflineGate;
use crate::oracles::{RawRoute, RouteRequest, RoutingOracle, with_timeout};
use crate::{CompanionError, Result};

pub mod duration;
pub mod fallback;
pub mod graphhopper;

pub use fallback::FallbackRouteSynthesizer;
pub use graphhopper::GraphHopperClient;

pub struct RoutingOracleAdapter {
    oracle: Arc<dyn RoutingOracle>,
    gate: Arc<dyn OfflineGate>,
    timeout: Duration,
}

impl RoutingOracleAdapter {
    pub fn new(oracle: Arc<dyn RoutingOracle>, gate: Arc<dyn OfflineGate>, timeout: Duration) -> Self {
        Self {
            oracle,
            gate,
            timeout,
        }
    }

    /// Route between two points. Always produces an estimate.
    #[instrument(skip(self))]
    pub async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        mode: TravelMode,
    ) -> RouteEstimate {
        if !self.gate.is_online() {
            debug!("Offline, skipping live routing");
            return self.fallback(&origin, &destination, mode).await;
        }

        match self.live_route(&origin, &destination, mode).await {
            Ok(estimate) => {
                self.gate
                    .cache_route(&origin, &destination, mode, &estimate)
                    .await;
                estimate
            }
            Err(e) => {
                warn!("Live routing failed, falling back: {}", e);
                self.fallback(&origin, &destination, mode).await
            }
        }
    }

    /// Multi-stop query against the live oracle only. Used by the waypoint
    /// sequencer, which has its own fallback chain.
    pub async fn live_multi_stop(&self, request: &RouteRequest) -> Result<RawRoute> {
        if !self.gate.is_online() {
            return Err(CompanionError::oracle("offline"));
        }
        with_timeout("routing oracle", self.timeout, self.oracle.route(request))
            .await?
            .ok_or_else(|| CompanionError::oracle("routing oracle returned no route"))
    }

    /// Extra minutes for inserting `stop` into a route in progress at `current`.
    ///
    /// Approximated as out-and-back to the stop (twice the one-way duration), not a
    /// recomputed multi-leg route.
    pub async fn estimate_added_detour(
        &self,
        current: Coordinates,
        stop: Coordinates,
        mode: TravelMode,
    ) -> u32 {
        let one_way = self.route(current, stop, mode).await;
        one_way.total_duration.saturating_mul(2)
    }

    async fn live_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
    ) -> Result<RouteEstimate> {
        let request = RouteRequest::direct(*origin, *destination, mode);
        let raw = with_timeout("routing oracle", self.timeout, self.oracle.route(&request))
            .await?
            .ok_or_else(|| CompanionError::oracle("routing oracle returned no route"))?;

        Ok(into_estimate(raw, origin, destination, RouteSource::Live))
    }

    async fn fallback(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
    ) -> RouteEstimate {
        if let Some(mut cached) = self.gate.get_cached_route(origin, destination, mode).await {
            info!("Serving route from cache");
            cached.source = RouteSource::Cache;
            return cached;
        }
        info!("No cached route, synthesizing an estimate");
        FallbackRouteSynthesizer::synthesize(origin, destination, mode)
    }
}

/// Decodes a raw oracle route. A request between distinct points never ends up
/// with a zero duration.
pub(crate) fn into_estimate(
    raw: RawRoute,
    origin: &Coordinates,
    destination: &Coordinates,
    source: RouteSource,
) -> RouteEstimate {
    let mut estimate = RouteEstimate {
        total_duration: raw.duration.minutes(),
        total_distance: raw.distance_meters.max(0.0),
        steps: raw.steps.into_iter().map(|s| s.into_step()).collect(),
        polyline: raw.polyline,
        last_departure_warning: raw.last_departure_warning,
        source,
    };
    estimate.clamp_duration();
    if origin != destination && estimate.total_duration == 0 {
        estimate.total_duration = RouteEstimate::MIN_DURATION_MINUTES;
    }
    estimate
}
