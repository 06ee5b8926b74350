//! Connectivity, pending-message queue and route cache
//!
//! The pipeline only depends on the [`OfflineGate`] trait. [`LocalOfflineGate`] is the
//! implementation used by the binary: the host flips the online flag, queued messages
//! stay in memory until drained, routes persist in the [`RouteCache`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::RouteCache;
use crate::models::{Attachment, Coordinates, RouteEstimate, TravelMode};

#[async_trait]
pub trait OfflineGate: Send + Sync {
    fn is_online(&self) -> bool;

    async fn queue_message(&self, text: &str, attachment: Option<&Attachment>);

    async fn get_cached_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
    ) -> Option<RouteEstimate>;

    /// Remember a live answer for later offline use
    async fn cache_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
        estimate: &RouteEstimate,
    );
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub text: String,
    pub attachment: Option<Attachment>,
    pub queued_at: DateTime<Utc>,
}

pub struct LocalOfflineGate {
    online: AtomicBool,
    queue: Mutex<VecDeque<QueuedMessage>>,
    routes: RouteCache,
    route_ttl: Duration,
}

impl LocalOfflineGate {
    pub fn new(routes: RouteCache, route_ttl: Duration) -> Self {
        Self {
            online: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::new()),
            routes,
            route_ttl,
        }
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Takes every queued message, oldest first
    pub fn drain_queue(&self) -> Vec<QueuedMessage> {
        match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// TTL with ±10% jitter so cached routes do not all expire together
    fn jittered_ttl(&self) -> Duration {
        let jitter: f64 = rand::rng().random_range(0.9..1.1);
        self.route_ttl.mul_f64(jitter)
    }
}

#[async_trait]
impl OfflineGate for LocalOfflineGate {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn queue_message(&self, text: &str, attachment: Option<&Attachment>) {
        let message = QueuedMessage {
            text: text.to_string(),
            attachment: attachment.cloned(),
            queued_at: Utc::now(),
        };
        match self.queue.lock() {
            Ok(mut queue) => {
                queue.push_back(message);
                debug!("Queued message while offline ({} pending)", queue.len());
            }
            Err(_) => warn!("Message queue poisoned, dropping message"),
        }
    }

    async fn get_cached_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
    ) -> Option<RouteEstimate> {
        match self.routes.get(origin, destination, mode).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Route cache read failed for {} -> {}: {:#}", origin, destination, e);
                None
            }
        }
    }

    async fn cache_route(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
        estimate: &RouteEstimate,
    ) {
        let ttl = self.jittered_ttl();
        if let Err(e) = self.routes.put(origin, destination, mode, estimate, ttl).await {
            warn!("Route cache write failed for {} -> {}: {:#}", origin, destination, e);
        }
    }
}
