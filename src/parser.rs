//! Decoding of raw conversational-AI output into a structured turn
//!
//! The AI is asked to answer with `{text, recommendation?, showMap?, actions?}`.
//! Anything that does not decode is shown to the user verbatim; parsing never fails.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::{Action, Coordinates, ParsedTurn, PriceLevel, RecommendationCard};

/// Wire shape of an AI answer
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiResponse {
    #[serde(alias = "content", alias = "message")]
    text: String,
    #[serde(default)]
    recommendation: Option<AiRecommendation>,
    #[serde(default)]
    show_map: Option<bool>,
    #[serde(default)]
    actions: Vec<Value>,
}

/// Wire shape of a recommendation. Numbers are kept as raw values so that a
/// badly typed field only loses that field, not the whole answer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiRecommendation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, alias = "latitude")]
    lat: Option<Value>,
    #[serde(default, alias = "longitude", alias = "lon")]
    lng: Option<Value>,
    #[serde(default)]
    rating: Option<Value>,
    #[serde(default)]
    price_level: Option<Value>,
    #[serde(default)]
    open_now: Option<bool>,
    #[serde(default)]
    hours: Option<String>,
    #[serde(default)]
    estimated_cost: Option<String>,
}

/// Parser for the AI oracle's raw text
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser {
    /// The oracle guarantees bare JSON (no markdown fences)
    structured_output: bool,
}

impl ResponseParser {
    #[must_use]
    pub fn new(structured_output: bool) -> Self {
        Self { structured_output }
    }

    /// Decode `raw` into a turn. Falls back to `{content: raw}` on any failure.
    #[must_use]
    pub fn parse(&self, raw: &str) -> ParsedTurn {
        let payload = if self.structured_output {
            raw.trim()
        } else {
            strip_fences(raw)
        };

        let response: AiResponse = match serde_json::from_str(payload) {
            Ok(response) => response,
            Err(e) => {
                debug!("AI output is not structured ({}), using raw text", e);
                return ParsedTurn::text(raw);
            }
        };

        let card = response.recommendation.and_then(into_card);
        let map_requested = response.show_map.unwrap_or(false)
            && card.as_ref().is_some_and(|c| c.coordinates.is_some());
        let actions = response
            .actions
            .into_iter()
            .filter_map(|value| serde_json::from_value::<Action>(value).ok())
            .filter(|action| !action.label.trim().is_empty())
            .collect();

        ParsedTurn {
            content: response.text,
            card,
            map_requested,
            actions,
        }
    }
}

/// Removes a surrounding ``` / ```json fence, if present
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag, on its own line or in front of a one-line body
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => strip_json_tag(rest),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn strip_json_tag(rest: &str) -> &str {
    match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    }
}

fn into_card(rec: AiRecommendation) -> Option<RecommendationCard> {
    let name = rec.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;

    let coordinates = match (
        rec.lat.as_ref().and_then(lenient_number),
        rec.lng.as_ref().and_then(lenient_number),
    ) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)).filter(Coordinates::is_valid),
        _ => None,
    };

    let price_level = rec
        .price_level
        .as_ref()
        .and_then(|value| match value {
            // "$$" style
            Value::String(s) if !s.is_empty() && s.chars().all(|c| c == '$') => {
                u8::try_from(s.len()).ok()
            }
            other => lenient_number(other).and_then(|n| {
                (n.fract() == 0.0 && (0.0..=255.0).contains(&n)).then_some(n as u8)
            }),
        })
        .and_then(PriceLevel::new);

    Some(RecommendationCard {
        name,
        address: rec.address.unwrap_or_default(),
        coordinates,
        rating: rec
            .rating
            .as_ref()
            .and_then(lenient_number)
            .map(|r| r as f32),
        price_level,
        open_now: rec.open_now,
        hours: rec.hours.filter(|h| !h.trim().is_empty()),
        estimated_cost: rec.estimated_cost.filter(|c| !c.trim().is_empty()),
        ..RecommendationCard::default()
    })
}

/// Numbers, or numeric strings. Anything else is treated as absent.
fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}
