//! GraphHopper routing API client

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::RoutingConfig;
use crate::models::TravelMode;
use crate::oracles::{
    RawLeg, RawRoute, RawStep, RouteRequest, RoutingOracle, check_status, http_client, require_key,
};
use crate::routing::duration::RawDuration;
use crate::{CompanionError, Result};

/// Instruction signs that end a leg
const SIGN_FINISH: i32 = 4;
const SIGN_VIA_REACHED: i32 = 5;

pub struct GraphHopperClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
}

impl GraphHopperClient {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        let api_key = require_key(config.api_key.as_deref(), "routing.api_key")?;
        Ok(Self {
            client: http_client(config.timeout(), config.max_retries)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn route_url(&self, request: &RouteRequest) -> Result<String> {
        let profile = profile(request.mode)?;
        let points = std::iter::once(&request.origin)
            .chain(&request.waypoints)
            .chain(std::iter::once(&request.destination))
            .map(|p| format!("point={}", urlencoding::encode(&p.to_string())))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "{}/route?{}&profile={}&points_encoded=true&instructions=true&locale=en&key={}",
            self.base_url,
            points,
            profile,
            urlencoding::encode(&self.api_key)
        ))
    }
}

fn profile(mode: TravelMode) -> Result<&'static str> {
    match mode {
        TravelMode::Walk => Ok("foot"),
        TravelMode::Drive => Ok("car"),
        TravelMode::Transit => Err(CompanionError::unsupported(
            "GraphHopper has no public transit profile",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    paths: Vec<PathResponse>,
}

#[derive(Debug, Deserialize)]
struct PathResponse {
    distance: f64,
    /// Milliseconds
    time: u64,
    #[serde(default)]
    points: Option<serde_json::Value>,
    #[serde(default)]
    instructions: Vec<InstructionResponse>,
}

#[derive(Debug, Deserialize)]
struct InstructionResponse {
    text: String,
    distance: f64,
    time: u64,
    sign: i32,
}

fn millis(ms: u64) -> RawDuration {
    RawDuration::Seconds(ms as f64 / 1000.0)
}

/// Splits the instruction list into one leg per hop at via/finish markers
fn into_raw_route(path: PathResponse) -> RawRoute {
    let mut legs = Vec::new();
    let (mut leg_distance, mut leg_time) = (0.0, 0_u64);

    let steps = path
        .instructions
        .into_iter()
        .map(|instruction| {
            leg_distance += instruction.distance;
            leg_time += instruction.time;
            if instruction.sign == SIGN_VIA_REACHED || instruction.sign == SIGN_FINISH {
                legs.push(RawLeg {
                    distance_meters: leg_distance,
                    duration: millis(leg_time),
                });
                leg_distance = 0.0;
                leg_time = 0;
            }
            RawStep {
                instruction: instruction.text,
                distance_meters: instruction.distance,
                duration: millis(instruction.time),
            }
        })
        .collect();

    let polyline = match path.points {
        Some(serde_json::Value::String(encoded)) => encoded,
        _ => String::new(),
    };

    RawRoute {
        steps,
        legs,
        duration: millis(path.time),
        distance_meters: path.distance,
        polyline,
        optimized_order: None,
        last_departure_warning: None,
    }
}

#[async_trait]
impl RoutingOracle for GraphHopperClient {
    #[instrument(skip(self, request), fields(mode = %request.mode, stops = request.waypoints.len()))]
    async fn route(&self, request: &RouteRequest) -> Result<Option<RawRoute>> {
        if request.optimize {
            return Err(CompanionError::unsupported(
                "GraphHopper routing does not reorder waypoints",
            ));
        }

        let url = self.route_url(request)?;
        debug!("Calling the routing API");
        let response = self.client.get(url).send().await?;
        let response = check_status(response, "GraphHopper").await?;
        let body: ApiResponse = response.json().await?;

        Ok(body.paths.into_iter().next().map(into_raw_route))
    }
}
