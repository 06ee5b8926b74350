//! External oracles consumed by the pipeline
//!
//! The conversational AI, the place-lookup service and the routing service are
//! black boxes behind the traits in this module. HTTP implementations live in the
//! sub-modules; tests substitute in-memory fakes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Attachment, ChatMessage, Coordinates, PriceLevel, RouteStep, TravelMode};
use crate::routing::duration::RawDuration;
use crate::{CompanionError, Result};

pub mod chat;
pub mod places;

#[cfg(test)]
pub mod testing;

pub use chat::ChatCompletionsClient;
pub use places::PlacesClient;

const USER_AGENT: &str = concat!("TravelCompanion/", env!("CARGO_PKG_VERSION"));

/// Everything the AI oracle sees for one call
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub instructions: String,
    /// Already truncated, oldest first
    pub history: Vec<ChatMessage>,
    pub message: String,
    pub attachment: Option<Attachment>,
}

impl ChatRequest {
    /// Same request with an extra instruction appended
    #[must_use]
    pub fn with_instruction(&self, extra: &str) -> Self {
        let mut request = self.clone();
        request.instructions.push_str("\n\n");
        request.instructions.push_str(extra);
        request
    }
}

#[async_trait]
pub trait ConversationOracle: Send + Sync {
    /// The oracle answers with bare JSON, never wrapped in markdown fences
    fn structured_output(&self) -> bool;

    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Best match returned by the place-lookup oracle
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceMatch {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub open_now: Option<bool>,
    pub rating: Option<f32>,
    pub price_level: Option<PriceLevel>,
    pub hours: Option<String>,
}

#[async_trait]
pub trait PlaceLookupOracle: Send + Sync {
    /// `Ok(None)` is the oracle's explicit not-found answer
    async fn find_place(
        &self,
        name: &str,
        bias: Option<Coordinates>,
        radius_m: f64,
    ) -> Result<Option<PlaceMatch>>;

    /// Photo references, at most `limit`
    async fn photos(&self, place_id: &str, limit: usize) -> Result<Vec<String>>;

    async fn review_count(&self, place_id: &str) -> Result<u32>;
}

/// Routing oracle request; `waypoints` are the intermediate stops
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub mode: TravelMode,
    pub waypoints: Vec<Coordinates>,
    pub optimize: bool,
}

impl RouteRequest {
    #[must_use]
    pub fn direct(origin: Coordinates, destination: Coordinates, mode: TravelMode) -> Self {
        Self {
            origin,
            destination,
            mode,
            waypoints: Vec::new(),
            optimize: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLeg {
    pub distance_meters: f64,
    pub duration: RawDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStep {
    pub instruction: String,
    pub distance_meters: f64,
    pub duration: RawDuration,
}

impl RawStep {
    #[must_use]
    pub fn into_step(self) -> RouteStep {
        RouteStep {
            instruction: self.instruction,
            distance_meters: self.distance_meters,
            duration_minutes: self.duration.minutes(),
        }
    }
}

/// Routing oracle answer, before duration decoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRoute {
    #[serde(default)]
    pub steps: Vec<RawStep>,
    #[serde(default)]
    pub legs: Vec<RawLeg>,
    pub duration: RawDuration,
    pub distance_meters: f64,
    #[serde(default)]
    pub polyline: String,
    /// Permutation over the request's `waypoints`, when optimisation ran
    #[serde(default)]
    pub optimized_order: Option<Vec<usize>>,
    #[serde(default)]
    pub last_departure_warning: Option<String>,
}

#[async_trait]
pub trait RoutingOracle: Send + Sync {
    /// `Ok(None)` means the oracle answered with no route.
    /// Fails with [`CompanionError::Unsupported`] when `optimize` cannot be honoured.
    async fn route(&self, request: &RouteRequest) -> Result<Option<RawRoute>>;
}

/// Runs an oracle call under a client-side timeout. An elapsed timeout is an error
/// like any other network failure.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} timed out after {:?}", operation, limit);
            Err(CompanionError::timeout(operation, limit.as_secs()))
        }
    }
}

/// HTTP client shared by the oracle implementations: request timeout plus
/// exponential-backoff retries on transient failures.
pub fn http_client(timeout: Duration, max_retries: u32) -> Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CompanionError::config(format!("Failed to create HTTP client: {e}")))?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Missing credentials are a hard configuration error
pub(crate) fn require_key(key: Option<&str>, setting: &str) -> Result<String> {
    match key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(CompanionError::config(format!("{setting} is not set"))),
    }
}

/// Maps a non-success HTTP status to an error
pub(crate) async fn check_status(
    response: reqwest::Response,
    service: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(CompanionError::config(format!(
            "{service} rejected the API key ({status})"
        ))),
        _ => Err(CompanionError::oracle(format!(
            "{service} error {status}: {error_text}"
        ))),
    }
}
