//! crates/listings_core/src/cache.rs
//!
//! Read-through cache for the public (approved-only) flat listing of a home.
//!
//! There is no invalidation call. The key embeds the home's generation marker,
//! and every flat mutation advances that marker in the same transaction, so a
//! reader after the mutation derives a new key and never addresses the old
//! entry again. Old entries age out under the TTL.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::deadline::within;
use crate::domain::{Flat, GenerationMarker};
use crate::ports::{KeyValueStore, PortError, PortResult};

#[derive(Clone)]
pub struct ListingCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    deadline: Duration,
}

impl ListingCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration, deadline: Duration) -> Self {
        Self {
            store,
            ttl,
            deadline,
        }
    }

    /// Derives the cache key for one generation of one home's listing.
    pub fn key(home_id: i64, marker: GenerationMarker) -> String {
        format!("flats:{home_id}:{marker}")
    }

    /// A miss is `Ok(None)`. An entry that no longer decodes is treated as a miss.
    pub async fn get(&self, home_id: i64, marker: GenerationMarker) -> PortResult<Option<Vec<Flat>>> {
        let key = Self::key(home_id, marker);
        let Some(raw) = within(self.deadline, "listing cache get", self.store.get(&key)).await?
        else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(flats) => Ok(Some(flats)),
            Err(e) => {
                warn!(%key, error = %e, "undecodable listing cache entry, treating as miss");
                Ok(None)
            }
        }
    }

    pub async fn put(&self, home_id: i64, marker: GenerationMarker, flats: &[Flat]) -> PortResult<()> {
        let key = Self::key(home_id, marker);
        let body = serde_json::to_vec(flats)
            .map_err(|e| PortError::Unexpected(format!("failed to encode listing: {e}")))?;
        within(
            self.deadline,
            "listing cache put",
            self.store.set(&key, &body, self.ttl),
        )
        .await
    }
}
