//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use listings_core::{
    DatabaseService, KeyValueStore, ListingCache, ListingService, SessionStore,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub listings: ListingService,
}

impl AppState {
    /// Wires the core services over the given persistence and key-value backends.
    pub fn new(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let sessions = SessionStore::new(kv.clone(), config.session_ttl, config.cache_timeout);
        let cache = ListingCache::new(kv, config.flat_cache_ttl, config.cache_timeout);
        let listings = ListingService::new(db.clone(), cache, config.db_timeout);
        Self {
            db,
            config,
            sessions,
            listings,
        }
    }
}
