//! Recommendation verification
//!
//! Reconciles the AI's recommended place against the place-lookup oracle:
//!
//! ```text
//! Pending -> Verifying -> (Retrying -> Verifying)* -> Resolved | Degraded
//! ```
//!
//! A successful lookup always overwrites the AI's coordinates, address and open
//! status. A venue reported closed is excluded and the AI is asked again, at most
//! `max_retries` times; if every attempt is closed the card is dropped and only the
//! text is returned. Lookup failures never fail the turn, the AI's card is kept as a
//! best effort. Enrichment (photos, review count, distance) runs concurrently and
//! each part may fail on its own without affecting the rest.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::instructions::exclusion_instruction;
use crate::models::{ParsedTurn, RecommendationCard, RouteSource, UserContext};
use crate::oracles::{
    ChatRequest, ConversationOracle, PlaceLookupOracle, PlaceMatch, with_timeout,
};
use crate::parser::ResponseParser;
use crate::routing::RoutingOracleAdapter;

/// Default cap on re-queries after a closed venue
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Pending,
    Verifying { attempt: u32 },
    Retrying { attempt: u32 },
    Resolved,
    Degraded,
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationState::Pending => f.write_str("pending"),
            VerificationState::Verifying { attempt } => write!(f, "verifying (attempt {attempt})"),
            VerificationState::Retrying { attempt } => write!(f, "retrying (attempt {attempt})"),
            VerificationState::Resolved => f.write_str("resolved"),
            VerificationState::Degraded => f.write_str("degraded"),
        }
    }
}

/// Names to avoid on re-query. Insertion-ordered, case-insensitive, only grows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionSet {
    names: Vec<String>,
}

impl ExclusionSet {
    /// Returns false when the name was already excluded
    pub fn insert(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Attempt counter; `attempt <= max` always holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max: u32,
}

impl RetryState {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self { attempt: 0, max }
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max
    }

    /// Moves to the next attempt; false once the cap is reached
    pub fn advance(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.attempt += 1;
        true
    }
}

/// Outcome of one best-effort enrichment step
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    Filled(T),
    /// Attempted and failed; the field stays absent
    Absent(String),
    /// Not attempted (missing place id or user location)
    Skipped,
}

impl<T> Enrichment<T> {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(self, Enrichment::Filled(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentReport {
    /// Number of photos attached
    pub photos: Enrichment<usize>,
    pub review_count: Enrichment<u32>,
    /// Where the distance came from
    pub route: Enrichment<RouteSource>,
}

impl EnrichmentReport {
    fn skipped() -> Self {
        Self {
            photos: Enrichment::Skipped,
            review_count: Enrichment::Skipped,
            route: Enrichment::Skipped,
        }
    }
}

/// How the place lookup for one attempt went
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(PlaceMatch),
    Missing,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Verification {
    /// Final turn: card reconciled and enriched, or dropped when degraded
    pub turn: ParsedTurn,
    /// `Resolved` or `Degraded`
    pub state: VerificationState,
    /// Retries performed (AI re-queries)
    pub retries: u32,
    /// Names excluded during the loop
    pub excluded: Vec<String>,
    /// Lookup result for the final card, if a card was verified
    pub lookup: Option<LookupOutcome>,
    pub enrichment: EnrichmentReport,
}

#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub max_retries: u32,
    pub places_timeout: Duration,
    pub chat_timeout: Duration,
    pub photo_limit: usize,
    pub search_radius_m: f64,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            places_timeout: Duration::from_secs(10),
            chat_timeout: Duration::from_secs(30),
            photo_limit: 3,
            search_radius_m: 2000.0,
        }
    }
}

pub struct RecommendationVerifier {
    places: Arc<dyn PlaceLookupOracle>,
    chat: Arc<dyn ConversationOracle>,
    routing: Arc<RoutingOracleAdapter>,
    parser: ResponseParser,
    settings: VerifierSettings,
}

impl RecommendationVerifier {
    pub fn new(
        places: Arc<dyn PlaceLookupOracle>,
        chat: Arc<dyn ConversationOracle>,
        routing: Arc<RoutingOracleAdapter>,
        settings: VerifierSettings,
    ) -> Self {
        let parser = ResponseParser::new(chat.structured_output());
        Self {
            places,
            chat,
            routing,
            parser,
            settings,
        }
    }

    /// Verify the recommendation in `turn`. `request` is the AI request that produced
    /// it, reused with an exclusion instruction when a retry is needed.
    ///
    /// Cancellation is checked between attempts; a cancelled loop stops re-querying
    /// and drops a closed card exactly like an exhausted one.
    #[instrument(skip_all, fields(card = turn.card.as_ref().map(|c| c.name.as_str()).unwrap_or("")))]
    pub async fn verify(
        &self,
        mut turn: ParsedTurn,
        context: &UserContext,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Verification {
        let mut exclusions = ExclusionSet::default();
        let mut retry = RetryState::new(self.settings.max_retries);
        let mut state = VerificationState::Pending;
        debug!("Verification {}", state);

        loop {
            let Some(mut card) = turn.card.take() else {
                debug!("No recommendation to verify");
                turn.map_requested = false;
                return Verification {
                    turn,
                    state: VerificationState::Resolved,
                    retries: retry.attempt(),
                    excluded: exclusions.names().to_vec(),
                    lookup: None,
                    enrichment: EnrichmentReport::skipped(),
                };
            };

            state = VerificationState::Verifying {
                attempt: retry.attempt(),
            };
            debug!("Verification {} for '{}'", state, card.name);

            let lookup = self.lookup(&card, context).await;
            let place = match &lookup {
                LookupOutcome::Found(place) => {
                    reconcile(&mut card, place);
                    Some(place.clone())
                }
                LookupOutcome::Missing => {
                    info!("'{}' not found, keeping the AI's card", card.name);
                    None
                }
                LookupOutcome::Failed(reason) => {
                    warn!("Lookup for '{}' failed ({}), keeping the AI's card", card.name, reason);
                    None
                }
            };

            let closed = place.is_some() && card.is_known_closed();
            if !closed {
                let enrichment = self.enrich(&mut card, place.as_ref(), context).await;
                if card.coordinates.is_none() {
                    turn.map_requested = false;
                }
                turn.card = Some(card);
                state = VerificationState::Resolved;
                info!("Verification {} after {} retries", state, retry.attempt());
                return Verification {
                    turn,
                    state,
                    retries: retry.attempt(),
                    excluded: exclusions.names().to_vec(),
                    lookup: Some(lookup),
                    enrichment,
                };
            }

            info!("'{}' is closed", card.name);
            exclusions.insert(&card.name);

            if retry.exhausted() || cancel.is_cancelled() {
                if cancel.is_cancelled() {
                    info!("Turn cancelled, not retrying");
                }
                return self.degraded(turn, retry, &exclusions, lookup);
            }

            retry.advance();
            state = VerificationState::Retrying {
                attempt: retry.attempt(),
            };
            debug!("Verification {}, excluding {:?}", state, exclusions.names());

            let retry_request = request.with_instruction(&exclusion_instruction(&exclusions));
            match with_timeout(
                "conversation oracle",
                self.settings.chat_timeout,
                self.chat.complete(&retry_request),
            )
            .await
            {
                Ok(raw) => turn = self.parser.parse(&raw),
                Err(e) => {
                    warn!("Re-query after closed venue failed: {}", e);
                    return self.degraded(turn, retry, &exclusions, lookup);
                }
            }
        }
    }

    /// Text only: the user is never pointed at a closed venue
    fn degraded(
        &self,
        mut turn: ParsedTurn,
        retry: RetryState,
        exclusions: &ExclusionSet,
        lookup: LookupOutcome,
    ) -> Verification {
        turn.card = None;
        turn.map_requested = false;
        let state = VerificationState::Degraded;
        info!("Verification {} after {} retries", state, retry.attempt());
        Verification {
            turn,
            state,
            retries: retry.attempt(),
            excluded: exclusions.names().to_vec(),
            lookup: Some(lookup),
            enrichment: EnrichmentReport::skipped(),
        }
    }

    async fn lookup(&self, card: &RecommendationCard, context: &UserContext) -> LookupOutcome {
        let call = self
            .places
            .find_place(&card.name, context.location, self.settings.search_radius_m);
        match with_timeout("place lookup", self.settings.places_timeout, call).await {
            Ok(Some(place)) => LookupOutcome::Found(place),
            Ok(None) => LookupOutcome::Missing,
            Err(e) => LookupOutcome::Failed(e.to_string()),
        }
    }

    /// Photos, review count and distance, fetched concurrently
    async fn enrich(
        &self,
        card: &mut RecommendationCard,
        place: Option<&PlaceMatch>,
        context: &UserContext,
    ) -> EnrichmentReport {
        let place_id = place.map(|p| p.place_id.clone());
        let timeout = self.settings.places_timeout;
        let limit = self.settings.photo_limit;

        let photos = async {
            let Some(id) = place_id.as_deref() else {
                return Enrichment::Skipped;
            };
            match with_timeout("photo fetch", timeout, self.places.photos(id, limit)).await {
                Ok(photos) => Enrichment::Filled(photos),
                Err(e) => Enrichment::Absent(e.to_string()),
            }
        };

        let reviews = async {
            let Some(id) = place_id.as_deref() else {
                return Enrichment::Skipped;
            };
            match with_timeout("review count", timeout, self.places.review_count(id)).await {
                Ok(count) => Enrichment::Filled(count),
                Err(e) => Enrichment::Absent(e.to_string()),
            }
        };

        let mode = context.travel_mode;
        let destination = card.coordinates;
        let route = async {
            match (context.location, destination) {
                (Some(from), Some(to)) => Enrichment::Filled(self.routing.route(from, to, mode).await),
                _ => Enrichment::Skipped,
            }
        };

        let (photos, reviews, route) = futures::join!(photos, reviews, route);

        let photos = match photos {
            Enrichment::Filled(photos) => {
                let count = photos.len();
                card.photos = photos;
                Enrichment::Filled(count)
            }
            Enrichment::Absent(reason) => Enrichment::Absent(reason),
            Enrichment::Skipped => Enrichment::Skipped,
        };

        if let Enrichment::Filled(count) = &reviews {
            card.review_count = Some(*count);
        }

        let route = match route {
            Enrichment::Filled(estimate) => {
                card.distance_meters = Some(estimate.total_distance);
                card.duration_minutes = Some(estimate.total_duration);
                card.distance_label = Some(estimate.distance_label(mode));
                Enrichment::Filled(estimate.source)
            }
            Enrichment::Absent(reason) => Enrichment::Absent(reason),
            Enrichment::Skipped => Enrichment::Skipped,
        };

        EnrichmentReport {
            photos,
            review_count: reviews,
            route,
        }
    }
}

/// Ground truth overwrites the AI's guesses
fn reconcile(card: &mut RecommendationCard, place: &PlaceMatch) {
    if card.coordinates != Some(place.coordinates) {
        debug!(
            "Correcting coordinates for '{}': {:?} -> {}",
            card.name, card.coordinates, place.coordinates
        );
    }
    card.coordinates = Some(place.coordinates);
    if !place.address.trim().is_empty() {
        card.address = place.address.clone();
    }
    card.open_now = place.open_now;
    if place.rating.is_some() {
        card.rating = place.rating;
    }
    if place.price_level.is_some() {
        card.price_level = place.price_level;
    }
    if place.hours.is_some() {
        card.hours = place.hours.clone();
    }
    // AI-guessed distance is never kept; enrichment recomputes it
    card.distance_label = None;
    card.distance_meters = None;
    card.duration_minutes = None;
}
