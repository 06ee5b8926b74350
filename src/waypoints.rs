//! Multi-stop route ordering
//!
//! Origin and destination are fixed; only the intermediate stops are reordered.
//! The live oracle's optimisation is preferred, then a direct multi-stop query in
//! input order, then per-leg routes through the adapter's own fallback chain.
//! Losing optimisation never fails the call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::models::{Coordinates, RouteSource, TravelMode};
use crate::oracles::{RawRoute, RouteRequest};
use crate::routing::RoutingOracleAdapter;
use crate::routing::duration::seconds_to_minutes;
use crate::{CompanionError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    pub from: Coordinates,
    pub to: Coordinates,
    pub distance_meters: f64,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedRoute {
    /// Visiting order of the intermediate stops, as indices into the caller's
    /// waypoint list. Never contains the origin or destination.
    pub order: Vec<usize>,
    pub legs: Vec<RouteLeg>,
    pub total_distance: f64,
    pub total_duration: u32,
    pub polyline: String,
    /// Whether the order came from the oracle's optimisation
    pub optimized: bool,
    pub source: RouteSource,
}

/// Resolved endpoints plus the caller indices of the intermediate stops
#[derive(Debug, Clone, PartialEq)]
struct WaypointPlan {
    origin: Coordinates,
    destination: Coordinates,
    intermediates: Vec<usize>,
}

impl WaypointPlan {
    /// Origin is the explicit one, else the first waypoint. Destination is the
    /// explicit one, else the last remaining waypoint, else the origin on a round
    /// trip. Waypoints used as endpoints are not intermediates.
    fn resolve(
        waypoints: &[Coordinates],
        origin: Option<Coordinates>,
        destination: Option<Coordinates>,
        round_trip: bool,
    ) -> Result<Self> {
        let mut intermediates: Vec<usize> = (0..waypoints.len()).collect();

        let origin = match origin {
            Some(origin) => origin,
            None => {
                if intermediates.is_empty() {
                    return Err(CompanionError::validation("a route needs an origin"));
                }
                waypoints[intermediates.remove(0)]
            }
        };

        let destination = match destination {
            Some(destination) => destination,
            None => match intermediates.pop() {
                Some(last) => waypoints[last],
                None if round_trip => origin,
                None => return Err(CompanionError::validation("a route needs a destination")),
            },
        };

        Ok(Self {
            origin,
            destination,
            intermediates,
        })
    }

    fn stops(&self, waypoints: &[Coordinates], order: &[usize]) -> Vec<Coordinates> {
        let mut stops = Vec::with_capacity(order.len() + 2);
        stops.push(self.origin);
        stops.extend(order.iter().map(|&i| waypoints[i]));
        stops.push(self.destination);
        stops
    }
}

pub struct WaypointSequencer {
    routing: Arc<RoutingOracleAdapter>,
}

impl WaypointSequencer {
    pub fn new(routing: Arc<RoutingOracleAdapter>) -> Self {
        Self { routing }
    }

    /// Only fails on input that cannot form a route (no origin or destination, or
    /// an invalid coordinate).
    #[instrument(skip(self, waypoints), fields(waypoints = waypoints.len()))]
    pub async fn optimize(
        &self,
        waypoints: &[Coordinates],
        origin: Option<Coordinates>,
        destination: Option<Coordinates>,
        round_trip: bool,
        mode: TravelMode,
    ) -> Result<OptimizedRoute> {
        if let Some(bad) = waypoints
            .iter()
            .chain(origin.iter())
            .chain(destination.iter())
            .find(|c| !c.is_valid())
        {
            return Err(CompanionError::validation(format!("invalid coordinates {bad}")));
        }

        let plan = WaypointPlan::resolve(waypoints, origin, destination, round_trip)?;
        let intermediates: Vec<Coordinates> =
            plan.intermediates.iter().map(|&i| waypoints[i]).collect();
        debug!("Sequencing {} intermediate stops", intermediates.len());

        if intermediates.len() > 1 {
            let request = RouteRequest {
                origin: plan.origin,
                destination: plan.destination,
                mode,
                waypoints: intermediates.clone(),
                optimize: true,
            };
            match self.routing.live_multi_stop(&request).await {
                Ok(raw) => match optimized_order(&raw, &plan.intermediates) {
                    Some(order) => {
                        if let Some(route) = assemble(&plan, waypoints, order, raw, true) {
                            info!("Using optimised order {:?}", route.order);
                            return Ok(route);
                        }
                        warn!("Optimised route has mismatched legs, using input order");
                    }
                    None => warn!("Oracle returned no valid permutation, using input order"),
                },
                Err(e) => info!("Optimisation unavailable ({}), using input order", e),
            }
        }

        let order = plan.intermediates.clone();
        let request = RouteRequest {
            origin: plan.origin,
            destination: plan.destination,
            mode,
            waypoints: intermediates,
            optimize: false,
        };
        match self.routing.live_multi_stop(&request).await {
            Ok(raw) => {
                if let Some(route) = assemble(&plan, waypoints, order.clone(), raw, false) {
                    return Ok(route);
                }
                warn!("Multi-stop route has mismatched legs, routing leg by leg");
            }
            Err(e) => info!("Multi-stop route unavailable ({}), routing leg by leg", e),
        }

        Ok(self.leg_by_leg(&plan, waypoints, order, mode).await)
    }

    async fn leg_by_leg(
        &self,
        plan: &WaypointPlan,
        waypoints: &[Coordinates],
        order: Vec<usize>,
        mode: TravelMode,
    ) -> OptimizedRoute {
        let stops = plan.stops(waypoints, &order);
        let mut legs = Vec::with_capacity(stops.len() - 1);
        let mut source = RouteSource::Live;

        for pair in stops.windows(2) {
            let estimate = self.routing.route(pair[0], pair[1], mode).await;
            source = weakest(source, estimate.source);
            legs.push(RouteLeg {
                from: pair[0],
                to: pair[1],
                distance_meters: estimate.total_distance,
                duration_minutes: estimate.total_duration,
            });
        }

        OptimizedRoute {
            total_distance: legs.iter().map(|l| l.distance_meters).sum(),
            total_duration: legs.iter().map(|l| l.duration_minutes).sum(),
            order,
            legs,
            polyline: String::new(),
            optimized: false,
            source,
        }
    }
}

/// Maps the oracle's permutation over the submitted intermediates back to caller
/// indices. Anything that is not a permutation is rejected.
fn optimized_order(raw: &RawRoute, intermediates: &[usize]) -> Option<Vec<usize>> {
    let permutation = raw.optimized_order.as_ref()?;
    if permutation.len() != intermediates.len() {
        return None;
    }
    let mut seen = vec![false; intermediates.len()];
    for &i in permutation {
        if i >= seen.len() || seen[i] {
            return None;
        }
        seen[i] = true;
    }
    Some(permutation.iter().map(|&i| intermediates[i]).collect())
}

/// Builds the result from a live multi-stop answer; `None` when its legs do not
/// match the stops.
fn assemble(
    plan: &WaypointPlan,
    waypoints: &[Coordinates],
    order: Vec<usize>,
    raw: RawRoute,
    optimized: bool,
) -> Option<OptimizedRoute> {
    let stops = plan.stops(waypoints, &order);
    if raw.legs.len() != stops.len() - 1 {
        return None;
    }

    let legs: Vec<RouteLeg> = stops
        .windows(2)
        .zip(&raw.legs)
        .map(|(pair, leg)| {
            let mut minutes = leg.duration.minutes();
            if pair[0] != pair[1] && minutes == 0 {
                minutes = 1;
            }
            RouteLeg {
                from: pair[0],
                to: pair[1],
                distance_meters: leg.distance_meters.max(0.0),
                duration_minutes: minutes,
            }
        })
        .collect();

    let leg_minutes: u32 = legs.iter().map(|l| l.duration_minutes).sum();
    let total_duration = seconds_to_minutes(raw.duration.seconds()).max(leg_minutes);

    Some(OptimizedRoute {
        order,
        total_distance: raw.distance_meters.max(0.0),
        total_duration,
        polyline: raw.polyline,
        legs,
        optimized,
        source: RouteSource::Live,
    })
}

fn weakest(a: RouteSource, b: RouteSource) -> RouteSource {
    match (a, b) {
        (RouteSource::Estimate, _) | (_, RouteSource::Estimate) => RouteSource::Estimate,
        (RouteSource::Cache, _) | (_, RouteSource::Cache) => RouteSource::Cache,
        _ => RouteSource::Live,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracles::testing::{FakeRouter, MemoryGate};
    use std::time::Duration;

    fn stops() -> Vec<Coordinates> {
        vec![
            Coordinates::new(35.6595, 139.7004),
            Coordinates::new(35.6586, 139.7454),
            Coordinates::new(35.7148, 139.7967),
            Coordinates::new(35.6764, 139.6993),
        ]
    }

    fn sequencer(router: Arc<FakeRouter>, gate: Arc<MemoryGate>) -> WaypointSequencer {
        WaypointSequencer::new(Arc::new(RoutingOracleAdapter::new(
            router,
            gate,
            Duration::from_secs(2),
        )))
    }

    #[tokio::test]
    async fn test_round_trip_orders_only_intermediates() {
        let router = Arc::new(FakeRouter::multi_stop(Some(vec![1, 0])));
        let waypoints = stops();

        let route = sequencer(router.clone(), Arc::new(MemoryGate::online()))
            .optimize(&waypoints, None, None, true, TravelMode::Walk)
            .await
            .unwrap();

        assert_eq!(route.order, vec![2, 1]);
        assert!(route.optimized);
        assert_eq!(route.legs.len(), 3);
        assert_eq!(route.legs[0].from, waypoints[0]);
        assert_eq!(route.legs[0].to, waypoints[2]);
        assert_eq!(route.legs[2].to, waypoints[3]);
        assert_eq!(route.total_duration, 30);

        let request = &router.requests()[0];
        assert_eq!(request.origin, waypoints[0]);
        assert_eq!(request.destination, waypoints[3]);
        assert_eq!(request.waypoints.len(), 2);
    }

    #[tokio::test]
    async fn test_fixed_origin_round_trip_orders_three_intermediates() {
        let router = Arc::new(FakeRouter::multi_stop(Some(vec![2, 0, 1])));
        let waypoints = stops();
        let hotel = Coordinates::new(35.6812, 139.7671);

        let route = sequencer(router.clone(), Arc::new(MemoryGate::online()))
            .optimize(&waypoints, Some(hotel), None, true, TravelMode::Walk)
            .await
            .unwrap();

        assert_eq!(route.order, vec![2, 0, 1]);
        assert!(!route.order.contains(&3));
        assert!(route.optimized);
        assert_eq!(route.legs.len(), 4);
        assert_eq!(route.legs[0].from, hotel);
        assert_eq!(route.legs[3].to, waypoints[3]);

        let request = &router.requests()[0];
        assert_eq!(request.origin, hotel);
        assert_eq!(request.destination, waypoints[3]);
        assert_eq!(request.waypoints, waypoints[..3].to_vec());
    }

    #[tokio::test]
    async fn test_fixed_origin_round_trip_falls_back_to_three_intermediates() {
        let router = Arc::new(FakeRouter::multi_stop(None));
        let waypoints = stops();
        let hotel = Coordinates::new(35.6812, 139.7671);

        let route = sequencer(router, Arc::new(MemoryGate::online()))
            .optimize(&waypoints, Some(hotel), None, true, TravelMode::Walk)
            .await
            .unwrap();

        assert_eq!(route.order, vec![0, 1, 2]);
        assert!(!route.optimized);
        assert_eq!(route.legs.len(), 4);
    }

    #[tokio::test]
    async fn test_unsupported_optimisation_keeps_input_order() {
        let router = Arc::new(FakeRouter::multi_stop(None));
        let waypoints = stops();

        let route = sequencer(router.clone(), Arc::new(MemoryGate::online()))
            .optimize(&waypoints, None, None, false, TravelMode::Drive)
            .await
            .unwrap();

        assert_eq!(route.order, vec![1, 2]);
        assert!(!route.optimized);
        assert_eq!(route.legs.len(), 3);
        assert_eq!(route.total_distance, 3000.0);
        assert_eq!(route.source, RouteSource::Live);
        assert_eq!(router.calls(), 2);
        assert!(!router.requests()[1].optimize);
    }

    #[tokio::test]
    async fn test_invalid_permutation_is_ignored() {
        let router = Arc::new(FakeRouter::multi_stop(Some(vec![0, 0])));
        let waypoints = stops();

        let route = sequencer(router, Arc::new(MemoryGate::online()))
            .optimize(&waypoints, None, None, true, TravelMode::Walk)
            .await
            .unwrap();

        assert_eq!(route.order, vec![1, 2]);
        assert!(!route.optimized);
    }

    #[tokio::test]
    async fn test_offline_routes_leg_by_leg() {
        let router = Arc::new(FakeRouter::multi_stop(Some(vec![1, 0])));
        let waypoints = stops();

        let route = sequencer(router.clone(), Arc::new(MemoryGate::offline()))
            .optimize(&waypoints, None, None, false, TravelMode::Walk)
            .await
            .unwrap();

        assert_eq!(router.calls(), 0);
        assert_eq!(route.order, vec![1, 2]);
        assert_eq!(route.legs.len(), 3);
        assert_eq!(route.source, RouteSource::Estimate);
        assert!(route.legs.iter().all(|l| l.duration_minutes >= 1));
        assert_eq!(
            route.total_duration,
            route.legs.iter().map(|l| l.duration_minutes).sum::<u32>()
        );
    }

    #[tokio::test]
    async fn test_explicit_endpoints_keep_every_waypoint() {
        let router = Arc::new(FakeRouter::multi_stop(Some(vec![3, 2, 1, 0])));
        let waypoints = stops();
        let hotel = Coordinates::new(35.6812, 139.7671);

        let route = sequencer(router, Arc::new(MemoryGate::online()))
            .optimize(&waypoints, Some(hotel), Some(hotel), false, TravelMode::Transit)
            .await
            .unwrap();

        assert_eq!(route.order, vec![3, 2, 1, 0]);
        assert_eq!(route.legs.first().unwrap().from, hotel);
        assert_eq!(route.legs.last().unwrap().to, hotel);
    }

    #[tokio::test]
    async fn test_single_waypoint_skips_optimisation() {
        let router = Arc::new(FakeRouter::multi_stop(Some(vec![0])));
        let waypoints = vec![Coordinates::new(35.6586, 139.7454)];
        let origin = Coordinates::new(35.6595, 139.7004);

        let route = sequencer(router.clone(), Arc::new(MemoryGate::online()))
            .optimize(&waypoints, Some(origin), None, true, TravelMode::Walk)
            .await
            .unwrap();

        assert!(route.order.is_empty());
        assert_eq!(route.legs.len(), 1);
        assert_eq!(route.legs[0].to, waypoints[0]);
        assert!(!router.requests()[0].optimize);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let router = Arc::new(FakeRouter::multi_stop(None));
        let result = sequencer(router, Arc::new(MemoryGate::online()))
            .optimize(&[], None, None, true, TravelMode::Walk)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_plan() {
        let waypoints = stops();

        let open = WaypointPlan::resolve(&waypoints, None, None, false).unwrap();
        assert_eq!(open.origin, waypoints[0]);
        assert_eq!(open.destination, waypoints[3]);
        assert_eq!(open.intermediates, vec![1, 2]);

        let round = WaypointPlan::resolve(&waypoints, None, None, true).unwrap();
        assert_eq!(round.destination, waypoints[3]);
        assert_eq!(round.intermediates, vec![1, 2]);

        let hotel = Coordinates::new(35.6812, 139.7671);
        let fixed = WaypointPlan::resolve(&waypoints, Some(hotel), None, true).unwrap();
        assert_eq!(fixed.origin, hotel);
        assert_eq!(fixed.destination, waypoints[3]);
        assert_eq!(fixed.intermediates, vec![0, 1, 2]);

        let back_home = WaypointPlan::resolve(&waypoints[..1], None, None, true).unwrap();
        assert_eq!(back_home.destination, waypoints[0]);
        assert!(back_home.intermediates.is_empty());

        let single = WaypointPlan::resolve(&waypoints[..1], None, None, false);
        assert!(single.is_err());
    }
}
