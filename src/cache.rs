//! Persistent route cache
//!
//! Route estimates are stored in a fjall keyspace as postcard records that carry
//! their own expiry. Keys round both endpoints to a fixed number of decimals, so
//! requests a few metres apart share an entry.

use anyhow::{Context, Result, anyhow};
use fjall::Keyspace;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task;

use crate::models::{Coordinates, RouteEstimate, TravelMode};

/// Cache key for a route at a fixed coordinate precision
#[must_use]
pub fn route_key(
    origin: &Coordinates,
    destination: &Coordinates,
    mode: TravelMode,
    precision: u32,
) -> String {
    format!(
        "route:{}-{}:{}",
        origin.to_key(precision),
        destination.to_key(precision),
        mode
    )
}

#[derive(Serialize, Deserialize)]
struct CachedRoute {
    estimate: RouteEstimate,
    expires_at: u64, // Unix timestamp (seconds)
}

fn unix_now() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Cloning is cheap and every clone sees the same store.
#[derive(Clone)]
pub struct RouteCache {
    store: Keyspace,
    precision: u32,
}

impl RouteCache {
    /// Opens (or creates) the store under `path`
    pub fn open(path: impl AsRef<Path>, precision: u32) -> Result<Self> {
        let path = path.as_ref();
        let db = fjall::Database::builder(path)
            .open()
            .with_context(|| format!("Failed to open route cache at {}", path.display()))?;
        let store = db.keyspace("routes", fjall::KeyspaceCreateOptions::default)?;
        Ok(Self { store, precision })
    }

    #[tracing::instrument(name = "put_route", level = "debug", skip(self, estimate))]
    pub async fn put(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
        estimate: &RouteEstimate,
        ttl: Duration,
    ) -> Result<()> {
        let key = route_key(origin, destination, mode, self.precision);
        let expires_at = unix_now()?
            .checked_add(ttl.as_secs())
            .ok_or(anyhow!("TTL overflow"))?;
        let record = CachedRoute {
            estimate: estimate.clone(),
            expires_at,
        };
        let bytes = postcard::to_stdvec(&record)?;

        let store = self.store.clone();
        task::spawn_blocking(move || store.insert(key, bytes)).await??;
        Ok(())
    }

    /// `None` for misses and for expired entries, which are removed on the way
    #[tracing::instrument(name = "query_route", level = "debug", skip(self))]
    pub async fn get(
        &self,
        origin: &Coordinates,
        destination: &Coordinates,
        mode: TravelMode,
    ) -> Result<Option<RouteEstimate>> {
        let key = route_key(origin, destination, mode, self.precision);
        let store = self.store.clone();
        let lookup = key.clone();
        let bytes = task::spawn_blocking(move || {
            store.get(lookup).map(|hit| hit.map(|v| v.to_vec()))
        })
        .await??;

        let Some(bytes) = bytes else {
            tracing::debug!("Route not cached");
            return Ok(None);
        };

        let record: CachedRoute = postcard::from_bytes(&bytes)?;
        if unix_now()? < record.expires_at {
            Ok(Some(record.estimate))
        } else {
            tracing::debug!("Cached route expired");
            let store = self.store.clone();
            task::spawn_blocking(move || store.remove(key)).await??;
            Ok(None)
        }
    }
}
