//! End-to-end conversation turns through the public API, with scripted oracles

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use travel_companion::models::Attachment;
use travel_companion::oracles::RawRoute;
use travel_companion::routing::duration::RawDuration;
use travel_companion::{
    ChatRequest, ChatTurn, CompanionError, ConversationOracle, Coordinates, OfflineGate,
    PlaceLookupOracle, PlaceMatch, RecommendationVerifier, RouteEstimate, RouteRequest,
    RouteSource, RoutingOracle, RoutingOracleAdapter, TravelCompanion, TravelMode, UserContext,
    VerifierSettings, WaypointSequencer,
};

const SHIBUYA: Coordinates = Coordinates {
    latitude: 35.6595,
    longitude: 139.7004,
};
const CAFE_X: Coordinates = Coordinates {
    latitude: 35.6581,
    longitude: 139.6983,
};
const CAFE_Y: Coordinates = Coordinates {
    latitude: 35.6617,
    longitude: 139.7041,
};

struct Conversation {
    answers: Vec<String>,
    calls: AtomicUsize,
    instructions: Mutex<Vec<String>>,
}

impl Conversation {
    fn new(answers: Vec<String>) -> Self {
        Self {
            answers,
            calls: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConversationOracle for Conversation {
    fn structured_output(&self) -> bool {
        false
    }

    async fn complete(&self, request: &ChatRequest) -> travel_companion::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions
            .lock()
            .unwrap()
            .push(request.instructions.clone());
        self.answers
            .get(call.min(self.answers.len().saturating_sub(1)))
            .cloned()
            .ok_or_else(|| CompanionError::oracle("no answer"))
    }
}

struct Directory {
    places: HashMap<&'static str, PlaceMatch>,
}

impl Directory {
    fn shibuya() -> Self {
        let entry = |name: &'static str, coordinates, open_now| {
            (
                name,
                PlaceMatch {
                    place_id: format!("place-{}", name.to_lowercase().replace(' ', "-")),
                    name: name.to_string(),
                    address: format!("{name}, Shibuya, Tokyo"),
                    coordinates,
                    open_now: Some(open_now),
                    rating: Some(4.5),
                    price_level: None,
                    hours: None,
                },
            )
        };
        Self {
            places: HashMap::from([entry("Cafe X", CAFE_X, false), entry("Cafe Y", CAFE_Y, true)]),
        }
    }
}

#[async_trait]
impl PlaceLookupOracle for Directory {
    async fn find_place(
        &self,
        name: &str,
        _bias: Option<Coordinates>,
        _radius_m: f64,
    ) -> travel_companion::Result<Option<PlaceMatch>> {
        Ok(self.places.get(name).cloned())
    }

    async fn photos(&self, place_id: &str, limit: usize) -> travel_companion::Result<Vec<String>> {
        Ok((0..limit).map(|i| format!("{place_id}/photo-{i}")).collect())
    }

    async fn review_count(&self, _place_id: &str) -> travel_companion::Result<u32> {
        Ok(87)
    }
}

/// Answers 420 m / 6 min for every request
struct Streets {
    calls: AtomicUsize,
}

#[async_trait]
impl RoutingOracle for Streets {
    async fn route(&self, request: &RouteRequest) -> travel_companion::Result<Option<RawRoute>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.optimize {
            return Err(CompanionError::unsupported("no optimisation"));
        }
        Ok(Some(RawRoute {
            steps: vec![],
            legs: vec![],
            duration: RawDuration::Text("PT6M".to_string()),
            distance_meters: 420.0,
            polyline: "encoded".to_string(),
            optimized_order: None,
            last_departure_warning: None,
        }))
    }
}

struct Connectivity {
    online: AtomicBool,
    queued: Mutex<Vec<String>>,
    routes: Mutex<HashMap<String, RouteEstimate>>,
}

impl Connectivity {
    fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            queued: Mutex::new(Vec::new()),
            routes: Mutex::new(HashMap::new()),
        }
    }

    fn key(origin: &Coordinates, destination: &Coordinates, mode: TravelMode) -> String {
        format!("{}|{}|{}", origin.to_key(4), destination.to_key(4), mode)
    }
}

#[async_trait]
impl OfflineGate for Connectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn queue_message(&self, text: &str, _attachment: Option<&Attachment>) {
        self.queued.lock().unwrap().push(text.to_string());
    }

    async fn get_cached_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
    ) -> Option<RouteEstimate> {
        self.routes
            .lock()
            .unwrap()
            .get(&Self::key(origin, destination, mode))
            .cloned()
    }

    async fn cache_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
        estimate: &RouteEstimate,
    ) {
        self.routes
            .lock()
            .unwrap()
            .insert(Self::key(origin, destination, mode), estimate.clone());
    }
}

fn answer(text: &str, name: &str, lat: f64, lng: f64) -> String {
    format!(
        "```json\n{}\n```",
        serde_json::json!({
            "text": text,
            "recommendation": {"name": name, "address": "somewhere", "lat": lat, "lng": lng, "rating": 3.9},
            "showMap": true,
            "actions": [{"label": "Directions", "kind": "navigate"}]
        })
    )
}

struct Harness {
    companion: TravelCompanion,
    chat: Arc<Conversation>,
    streets: Arc<Streets>,
    gate: Arc<Connectivity>,
    routing: Arc<RoutingOracleAdapter>,
}

fn harness(answers: Vec<String>, online: bool) -> Harness {
    let chat = Arc::new(Conversation::new(answers));
    let streets = Arc::new(Streets {
        calls: AtomicUsize::new(0),
    });
    let gate = Arc::new(Connectivity::new(online));
    let routing = Arc::new(RoutingOracleAdapter::new(
        streets.clone(),
        gate.clone(),
        Duration::from_secs(2),
    ));
    let verifier = RecommendationVerifier::new(
        Arc::new(Directory::shibuya()),
        chat.clone(),
        routing.clone(),
        VerifierSettings::default(),
    );
    let companion = TravelCompanion::new(
        chat.clone(),
        gate.clone(),
        verifier,
        10,
        Duration::from_secs(2),
    );
    Harness {
        companion,
        chat,
        streets,
        gate,
        routing,
    }
}

fn coffee() -> ChatTurn {
    ChatTurn {
        message: "Where can I get coffee nearby?".to_string(),
        context: UserContext::at(SHIBUYA),
        ..ChatTurn::default()
    }
}

#[tokio::test]
async fn test_closed_cafe_is_replaced_by_verified_open_one() {
    let h = harness(
        vec![
            answer("Cafe X has great pour-over.", "Cafe X", 35.70, 139.75),
            answer("Cafe Y is open now.", "Cafe Y", 35.71, 139.76),
        ],
        true,
    );

    let result = h.companion.chat(&coffee(), &CancellationToken::new()).await;

    assert_eq!(h.chat.calls.load(Ordering::SeqCst), 2);
    assert!(h.chat.instructions.lock().unwrap()[1].contains("Cafe X"));

    assert_eq!(result.content, "Cafe Y is open now.");
    let card = result.card.expect("verified card");
    assert_eq!(card.name, "Cafe Y");
    assert_eq!(card.coordinates, Some(CAFE_Y));
    assert_eq!(card.address, "Cafe Y, Shibuya, Tokyo");
    assert_eq!(card.open_now, Some(true));
    assert_eq!(card.rating, Some(4.5));
    assert_eq!(card.distance_meters, Some(420.0));
    assert_eq!(card.duration_minutes, Some(6));
    assert_eq!(card.distance_label.as_deref(), Some("420 m · 6 min walk"));
    assert_eq!(card.review_count, Some(87));
    assert_eq!(card.photos.len(), 3);

    let map = result.map_request.expect("map request");
    assert_eq!(map.center, CAFE_Y);
    assert_eq!(result.actions.len(), 1);

    assert_eq!(h.streets.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_offline_turn_is_queued_once_and_acknowledged() {
    let h = harness(vec![answer("unused", "Cafe Y", 0.0, 0.0)], false);

    let result = h.companion.chat(&coffee(), &CancellationToken::new()).await;

    assert!(result.offline);
    assert!(result.card.is_none());
    assert_eq!(h.gate.queued.lock().unwrap().len(), 1);
    assert_eq!(h.chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_routes_learned_online_are_served_offline() {
    let h = harness(vec![], true);

    let live = h.routing.route(SHIBUYA, CAFE_Y, TravelMode::Walk).await;
    assert_eq!(live.source, RouteSource::Live);

    h.gate.online.store(false, Ordering::SeqCst);
    let cached = h.routing.route(SHIBUYA, CAFE_Y, TravelMode::Walk).await;
    let estimated = h.routing.route(SHIBUYA, CAFE_X, TravelMode::Walk).await;

    assert_eq!(cached.source, RouteSource::Cache);
    assert_eq!(cached.total_duration, live.total_duration);
    assert_eq!(estimated.source, RouteSource::Estimate);
    assert!(estimated.total_duration >= 1);
    assert_eq!(h.streets.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_round_trip_from_fixed_origin_without_optimisation_support() {
    let h = harness(vec![], true);
    let sequencer = WaypointSequencer::new(h.routing.clone());
    let stops = [
        CAFE_X,
        CAFE_Y,
        Coordinates::new(35.6764, 139.6993),
        Coordinates::new(35.6702, 139.7027),
    ];

    let route = sequencer
        .optimize(&stops, Some(SHIBUYA), None, true, TravelMode::Walk)
        .await
        .unwrap();

    let mut order = route.order.clone();
    order.sort_unstable();
    assert_eq!(order, vec![0, 1, 2]);
    assert!(!route.optimized);
    assert_eq!(route.legs.len(), 4);
    assert_eq!(route.legs.first().unwrap().from, SHIBUYA);
    assert_eq!(route.legs.last().unwrap().to, stops[3]);
}
