//! JSON API handlers
//!
//! Every handler is stateless per request. Turns of one conversation must be sent
//! one at a time by the caller, since message order shapes the AI's context.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::CompanionError;
use crate::app::App;
use crate::companion::ChatTurn;
use crate::models::{Coordinates, RouteEstimate, TravelMode, TurnResult};
use crate::offline::OfflineGate;
use crate::waypoints::OptimizedRoute;

pub type AppState = Arc<App>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBody {
    pub origin: Coordinates,
    pub destination: Coordinates,
    #[serde(default)]
    pub mode: TravelMode,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeBody {
    pub waypoints: Vec<Coordinates>,
    #[serde(default)]
    pub origin: Option<Coordinates>,
    #[serde(default)]
    pub destination: Option<Coordinates>,
    #[serde(default)]
    pub round_trip: bool,
    #[serde(default)]
    pub mode: TravelMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectivityBody {
    pub online: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub online: bool,
    pub pending_messages: usize,
    pub version: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps a pipeline error onto a status code and a user-facing message
pub struct ApiError(CompanionError);

impl From<CompanionError> for ApiError {
    fn from(err: CompanionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CompanionError::Validation { .. } => StatusCode::BAD_REQUEST,
            CompanionError::NotFound { .. } => StatusCode::NOT_FOUND,
            CompanionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CompanionError::Oracle { .. } | CompanionError::Unsupported { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/route", post(route))
        .route("/optimize", post(optimize))
        .route("/status", get(status))
        .route("/connectivity", post(set_connectivity))
        .with_state(state)
}

fn ensure_valid(points: &[Coordinates]) -> Result<(), ApiError> {
    match points.iter().find(|c| !c.is_valid()) {
        Some(bad) => Err(CompanionError::validation(format!("invalid coordinates {bad}")).into()),
        None => Ok(()),
    }
}

async fn chat(
    State(app): State<AppState>,
    Json(turn): Json<ChatTurn>,
) -> Result<Json<TurnResult>, ApiError> {
    Ok(Json(detached_turn(app, turn).await?))
}

/// Runs the turn on its own task. Dropping the returned future (client gone)
/// cancels the token, so the task stops re-querying the AI and winds down.
async fn detached_turn(app: AppState, turn: ChatTurn) -> Result<TurnResult, CompanionError> {
    let cancel = CancellationToken::new();
    let _abandoned = cancel.clone().drop_guard();
    let task = tokio::spawn(async move { app.companion.chat(&turn, &cancel).await });
    task.await
        .map_err(|e| CompanionError::general(format!("Chat turn failed: {e}")))
}

async fn route(
    State(app): State<AppState>,
    Json(body): Json<RouteBody>,
) -> Result<Json<RouteEstimate>, ApiError> {
    ensure_valid(&[body.origin, body.destination])?;
    debug!("Route request {} -> {} ({})", body.origin, body.destination, body.mode);
    Ok(Json(
        app.routing
            .route(body.origin, body.destination, body.mode)
            .await,
    ))
}

async fn optimize(
    State(app): State<AppState>,
    Json(body): Json<OptimizeBody>,
) -> Result<Json<OptimizedRoute>, ApiError> {
    let route = app
        .sequencer
        .optimize(
            &body.waypoints,
            body.origin,
            body.destination,
            body.round_trip,
            body.mode,
        )
        .await?;
    Ok(Json(route))
}

async fn status(State(app): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        online: app.gate.is_online(),
        pending_messages: app.gate.pending_count(),
        version: crate::VERSION.to_string(),
    })
}

/// Lets the host report connectivity changes
async fn set_connectivity(
    State(app): State<AppState>,
    Json(body): Json<ConnectivityBody>,
) -> Json<StatusBody> {
    app.gate.set_online(body.online);
    status(State(app)).await
}
