//! One conversation turn end to end
//!
//! Offline check, AI call, parse, verify and enrich, then the caller-facing result.
//! Only total AI unavailability is visible to the user as a failure.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::CompanionConfig;
use crate::instructions::{system_instructions, truncate_history};
use crate::models::{Attachment, ChatMessage, MapMarker, MapRequest, TurnResult, UserContext};
use crate::offline::OfflineGate;
use crate::oracles::{ChatRequest, ConversationOracle, with_timeout};
use crate::parser::ResponseParser;
use crate::verifier::{RecommendationVerifier, VerifierSettings};

pub const OFFLINE_ACKNOWLEDGEMENT: &str = "You're offline right now. I've saved your message and will send it as soon as you're back online.";

pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, I can't reach the assistant right now. Please try again in a moment.";

/// One user turn as the caller sends it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub message: String,
    /// Full history, oldest first; truncated before it reaches the AI
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub context: UserContext,
}

#[derive(Debug, Clone)]
pub struct CompanionSettings {
    pub history_limit: usize,
    pub chat_timeout: Duration,
    pub verifier: VerifierSettings,
}

impl CompanionSettings {
    #[must_use]
    pub fn from_config(config: &CompanionConfig) -> Self {
        Self {
            history_limit: config.chat.history_limit,
            chat_timeout: config.chat.timeout(),
            verifier: VerifierSettings {
                max_retries: config.verification.max_retries,
                places_timeout: config.places.timeout(),
                chat_timeout: config.chat.timeout(),
                photo_limit: config.places.photo_limit,
                search_radius_m: config.places.search_radius_m,
            },
        }
    }
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            history_limit: 10,
            chat_timeout: Duration::from_secs(30),
            verifier: VerifierSettings::default(),
        }
    }
}

pub struct TravelCompanion {
    chat: Arc<dyn ConversationOracle>,
    gate: Arc<dyn OfflineGate>,
    verifier: RecommendationVerifier,
    parser: ResponseParser,
    history_limit: usize,
    chat_timeout: Duration,
}

impl TravelCompanion {
    pub fn new(
        chat: Arc<dyn ConversationOracle>,
        gate: Arc<dyn OfflineGate>,
        verifier: RecommendationVerifier,
        history_limit: usize,
        chat_timeout: Duration,
    ) -> Self {
        let parser = ResponseParser::new(chat.structured_output());
        Self {
            chat,
            gate,
            verifier,
            parser,
            history_limit,
            chat_timeout,
        }
    }

    #[instrument(skip_all, fields(history = turn.history.len(), attachment = turn.attachment.is_some()))]
    pub async fn chat(&self, turn: &ChatTurn, cancel: &CancellationToken) -> TurnResult {
        if !self.gate.is_online() {
            info!("Offline, queueing message");
            self.gate
                .queue_message(&turn.message, turn.attachment.as_ref())
                .await;
            return TurnResult {
                offline: true,
                ..TurnResult::text(OFFLINE_ACKNOWLEDGEMENT)
            };
        }

        let request = ChatRequest {
            instructions: system_instructions(&turn.context),
            history: truncate_history(&turn.history, self.history_limit),
            message: turn.message.clone(),
            attachment: turn.attachment.clone(),
        };

        let raw = match with_timeout(
            "conversation oracle",
            self.chat_timeout,
            self.chat.complete(&request),
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) if e.is_config() => {
                error!("Chat oracle is misconfigured: {}", e);
                return TurnResult::text(e.user_message());
            }
            Err(e) => {
                warn!("Chat oracle unavailable: {}", e);
                return TurnResult::text(UNAVAILABLE_MESSAGE);
            }
        };

        let parsed = self.parser.parse(&raw);
        let verification = self
            .verifier
            .verify(parsed, &turn.context, &request, cancel)
            .await;
        info!(
            "Turn finished: {} after {} retries",
            verification.state, verification.retries
        );

        let turn_result = verification.turn;
        let map_request = match (&turn_result.card, turn_result.map_requested) {
            (Some(card), true) => card.coordinates.map(|center| {
                let mut markers = Vec::with_capacity(2);
                if let Some(user) = turn.context.location {
                    markers.push(MapMarker {
                        label: "You".to_string(),
                        coordinates: user,
                    });
                }
                markers.push(MapMarker {
                    label: card.name.clone(),
                    coordinates: center,
                });
                MapRequest { center, markers }
            }),
            _ => None,
        };

        TurnResult {
            content: turn_result.content,
            card: turn_result.card,
            map_request,
            actions: turn_result.actions,
            offline: false,
        }
    }
}
