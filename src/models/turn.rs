//! Conversation turn inputs and results

use serde::{Deserialize, Serialize};

use super::{Coordinates, RecommendationCard, TravelMode};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of conversation history, oldest first
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Image attached to a user turn
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

/// What the pipeline knows about the user for this turn
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub travel_mode: TravelMode,
}

impl UserContext {
    #[must_use]
    pub fn at(location: Coordinates) -> Self {
        Self {
            location: Some(location),
            travel_mode: TravelMode::default(),
        }
    }
}

/// Follow-up action suggested by the assistant
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MapMarker {
    pub label: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MapRequest {
    pub center: Coordinates,
    pub markers: Vec<MapMarker>,
}

/// Decoded AI output before verification
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTurn {
    pub content: String,
    pub card: Option<RecommendationCard>,
    pub map_requested: bool,
    pub actions: Vec<Action>,
}

impl ParsedTurn {
    /// Plain-text turn, used whenever decoding fails
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// What the caller receives for one conversation turn
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<RecommendationCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_request: Option<MapRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    /// Set when the message was queued instead of sent
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub offline: bool,
}

impl TurnResult {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}
