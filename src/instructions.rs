//! Instructions sent to the conversational AI

use crate::models::{ChatMessage, UserContext};
use crate::verifier::ExclusionSet;

const BASE_INSTRUCTIONS: &str = "You are a local travel companion. Answer briefly and concretely.\n\
Always reply with a single JSON object and nothing else:\n\
{\"text\": string, \"recommendation\": {\"name\", \"address\", \"lat\", \"lng\", \"rating\", \"priceLevel\", \"openNow\", \"hours\", \"estimatedCost\"} | null, \"showMap\": bool, \"actions\": [{\"label\", \"kind\", \"value\"}]}\n\
Recommend at most one place per answer, and only places that exist. Set showMap when a map would help.";

/// System instructions for one turn
#[must_use]
pub fn system_instructions(context: &UserContext) -> String {
    let mut instructions = BASE_INSTRUCTIONS.to_string();
    match context.location {
        Some(location) => instructions.push_str(&format!(
            "\nThe user is at {} and travels by {}. Prefer places within reach.",
            location.format_coordinates(),
            context.travel_mode
        )),
        None => instructions.push_str(&format!(
            "\nThe user's location is unknown. They travel by {}.",
            context.travel_mode
        )),
    }
    instructions
}

/// Instruction appended on a re-query after a closed venue
#[must_use]
pub fn exclusion_instruction(exclusions: &ExclusionSet) -> String {
    format!(
        "The following places are closed right now. Do not recommend any of them again, suggest a different place instead: {}.",
        exclusions.names().join(", ")
    )
}

/// Keeps the most recent `limit` messages, oldest first
#[must_use]
pub fn truncate_history(history: &[ChatMessage], limit: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(limit);
    history[start..].to_vec()
}
