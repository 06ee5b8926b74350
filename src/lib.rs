//! `travel-companion` - conversational travel assistant pipeline
//!
//! Takes the raw answer of a conversational AI, verifies the place it recommends
//! against a place-lookup service, retries with exclusions when the venue is closed,
//! enriches the result with photos and distance, and routes between stops with an
//! offline-aware fallback.

pub mod api;
pub mod app;
pub mod cache;
pub mod companion;
pub mod config;
pub mod error;
pub mod instructions;
pub mod models;
pub mod offline;
pub mod oracles;
pub mod parser;
pub mod routing;
pub mod telemetry;
pub mod verifier;
pub mod waypoints;
pub mod web;

// Re-export core types for public API
pub use app::App;
pub use cache::RouteCache;
pub use companion::{ChatTurn, CompanionSettings, TravelCompanion};
pub use config::CompanionConfig;
pub use error::CompanionError;
pub use models::{
    Coordinates, ParsedTurn, RecommendationCard, RouteEstimate, RouteSource, TravelMode,
    TurnResult, UserContext,
};
pub use offline::{LocalOfflineGate, OfflineGate};
pub use oracles::{
    ChatRequest, ConversationOracle, PlaceLookupOracle, PlaceMatch, RawRoute, RouteRequest,
    RoutingOracle,
};
pub use parser::ResponseParser;
pub use routing::{FallbackRouteSynthesizer, RoutingOracleAdapter};
pub use verifier::{
    Enrichment, EnrichmentReport, ExclusionSet, RecommendationVerifier, RetryState,
    Verification, VerificationState, VerifierSettings,
};
pub use waypoints::{OptimizedRoute, RouteLeg, WaypointSequencer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, CompanionError>;
