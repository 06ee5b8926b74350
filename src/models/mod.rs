//! Data models for the travel companion
//!
//! This module contains the core domain models organized by concern:
//! - Location: coordinates and distance helpers
//! - Card: the recommendation card shown to the user
//! - Route: route estimates and travel modes
//! - Turn: conversation inputs and the caller-facing turn result

pub mod card;
pub mod location;
pub mod route;
pub mod turn;

// Re-export all public types for convenient access
pub use card::{PriceLevel, RecommendationCard};
pub use location::Coordinates;
pub use route::{RouteEstimate, RouteSource, RouteStep, TravelMode};
pub use turn::{
    Action, Attachment, ChatMessage, MapMarker, MapRequest, ParsedTurn, Role, TurnResult,
    UserContext,
};
