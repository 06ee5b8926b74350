//! In-memory oracles and gate for unit tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ChatRequest, ConversationOracle, PlaceLookupOracle, PlaceMatch, RawLeg, RawRoute,
    RouteRequest, RoutingOracle,
};
use crate::models::{Attachment, Coordinates, RouteEstimate, TravelMode};
use crate::cache::route_key;
use crate::offline::OfflineGate;
use crate::routing::duration::RawDuration;
use crate::{CompanionError, Result};

/// Answers with the scripted responses in order, repeating the last one
pub struct ScriptedChat {
    responses: Vec<String>,
    fail: bool,
    structured: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            fail: false,
            structured: true,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationOracle for ScriptedChat {
    fn structured_output(&self) -> bool {
        self.structured
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail || self.responses.is_empty() {
            return Err(CompanionError::oracle("chat unavailable"));
        }
        let index = call.min(self.responses.len() - 1);
        Ok(self.responses[index].clone())
    }
}

/// Recommendation JSON as the AI would send it
pub fn ai_answer(text: &str, name: &str, lat: f64, lng: f64) -> String {
    serde_json::json!({
        "text": text,
        "recommendation": {"name": name, "address": "guessed address", "lat": lat, "lng": lng},
        "showMap": true,
    })
    .to_string()
}

pub fn place(name: &str, coordinates: Coordinates, open_now: Option<bool>) -> PlaceMatch {
    PlaceMatch {
        place_id: format!("id-{name}"),
        name: name.to_string(),
        address: format!("{name} verified address"),
        coordinates,
        open_now,
        rating: Some(4.2),
        price_level: None,
        hours: None,
    }
}

#[derive(Default)]
pub struct FakePlaces {
    places: HashMap<String, PlaceMatch>,
    fail_lookup: bool,
    fail_photos: bool,
    fail_reviews: bool,
    lookups: AtomicUsize,
    looked_up: Mutex<Vec<String>>,
}

impl FakePlaces {
    pub fn with(places: impl IntoIterator<Item = PlaceMatch>) -> Self {
        Self {
            places: places.into_iter().map(|p| (p.name.clone(), p)).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_lookup: true,
            ..Self::default()
        }
    }

    pub fn photos_fail(mut self) -> Self {
        self.fail_photos = true;
        self
    }

    pub fn reviews_fail(mut self) -> Self {
        self.fail_reviews = true;
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn looked_up(&self) -> Vec<String> {
        self.looked_up.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaceLookupOracle for FakePlaces {
    async fn find_place(
        &self,
        name: &str,
        _bias: Option<Coordinates>,
        _radius_m: f64,
    ) -> Result<Option<PlaceMatch>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.looked_up.lock().unwrap().push(name.to_string());
        if self.fail_lookup {
            return Err(CompanionError::oracle("places unavailable"));
        }
        Ok(self.places.get(name).cloned())
    }

    async fn photos(&self, place_id: &str, limit: usize) -> Result<Vec<String>> {
        if self.fail_photos {
            return Err(CompanionError::oracle("photos unavailable"));
        }
        Ok((0..limit).map(|i| format!("{place_id}/photos/{i}")).collect())
    }

    async fn review_count(&self, _place_id: &str) -> Result<u32> {
        if self.fail_reviews {
            return Err(CompanionError::oracle("reviews unavailable"));
        }
        Ok(321)
    }
}

pub fn raw_route(distance_meters: f64, duration: RawDuration) -> RawRoute {
    RawRoute {
        steps: vec![],
        legs: vec![],
        duration,
        distance_meters,
        polyline: "_p~iF~ps|U".to_string(),
        optimized_order: None,
        last_departure_warning: None,
    }
}

enum RouterBehaviour {
    Answer(RawRoute),
    Fail,
    Empty,
    /// One 1000 m / 10 min leg per hop; `order` answers optimize requests
    MultiStop { order: Option<Vec<usize>> },
}

pub struct FakeRouter {
    behaviour: RouterBehaviour,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RouteRequest>>,
}

impl FakeRouter {
    fn with_behaviour(behaviour: RouterBehaviour) -> Self {
        Self {
            behaviour,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(route: RawRoute) -> Self {
        Self::with_behaviour(RouterBehaviour::Answer(route))
    }

    pub fn failing() -> Self {
        Self::with_behaviour(RouterBehaviour::Fail)
    }

    pub fn empty() -> Self {
        Self::with_behaviour(RouterBehaviour::Empty)
    }

    pub fn multi_stop(order: Option<Vec<usize>>) -> Self {
        Self::with_behaviour(RouterBehaviour::MultiStop { order })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RouteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoutingOracle for FakeRouter {
    async fn route(&self, request: &RouteRequest) -> Result<Option<RawRoute>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behaviour {
            RouterBehaviour::Answer(route) => Ok(Some(route.clone())),
            RouterBehaviour::Fail => Err(CompanionError::oracle("routing unavailable")),
            RouterBehaviour::Empty => Ok(None),
            RouterBehaviour::MultiStop { order } => {
                if request.optimize && order.is_none() {
                    return Err(CompanionError::unsupported("no optimisation"));
                }
                let hops = request.waypoints.len() + 1;
                let legs = vec![
                    RawLeg {
                        distance_meters: 1000.0,
                        duration: RawDuration::Seconds(600.0),
                    };
                    hops
                ];
                Ok(Some(RawRoute {
                    legs,
                    duration: RawDuration::Seconds(600.0 * hops as f64),
                    distance_meters: 1000.0 * hops as f64,
                    optimized_order: if request.optimize { order.clone() } else { None },
                    ..raw_route(0.0, RawDuration::Seconds(0.0))
                }))
            }
        }
    }
}

pub struct MemoryGate {
    online: AtomicBool,
    queued: Mutex<Vec<String>>,
    routes: Mutex<HashMap<String, RouteEstimate>>,
}

impl MemoryGate {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            queued: Mutex::new(Vec::new()),
            routes: Mutex::new(HashMap::new()),
        }
    }

    pub fn offline() -> Self {
        let gate = Self::online();
        gate.set_online(false);
        gate
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn queued(&self) -> Vec<String> {
        self.queued.lock().unwrap().clone()
    }

    pub fn cached_routes(&self) -> usize {
        self.routes.lock().unwrap().len()
    }
}

#[async_trait]
impl OfflineGate for MemoryGate {
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
        let key = route_key(origin, destination, mode, 4);
        self.routes.lock().unwrap().get(&key).cloned()
    }

    async fn cache_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
        estimate: &RouteEstimate,
    ) {
        let key = route_key(origin, destination, mode, 4);
        self.routes.lock().unwrap().insert(key, estimate.clone());
    }
}
