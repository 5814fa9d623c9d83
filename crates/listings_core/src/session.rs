//! crates/listings_core/src/session.rs
//!
//! Issues and resolves opaque session tokens backed by the key-value store.
//!
//! A lookup that finds nothing is `Ok(None)`; only a backend failure is an
//! error. The HTTP layer maps the first to 401 and the second to 500.
//!
//! Records live under `session:{token}` so a token can never address a key
//! written by another user of the same store, such as the listing cache.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::deadline::within;
use crate::domain::{Session, SessionClaims};
use crate::ports::{KeyValueStore, PortError, PortResult};

type TokenGenerator = dyn Fn() -> String + Send + Sync;

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    deadline: Duration,
    generate_token: Arc<TokenGenerator>,
}

impl SessionStore {
    /// Creates a store that issues UUIDv4 tokens living for `ttl`. Each backend
    /// call is bounded by `deadline`.
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration, deadline: Duration) -> Self {
        Self {
            store,
            ttl,
            deadline,
            generate_token: Arc::new(|| Uuid::new_v4().to_string()),
        }
    }

    /// Replaces the token generator.
    pub fn with_token_generator<G>(mut self, generate: G) -> Self
    where
        G: Fn() -> String + Send + Sync + 'static,
    {
        self.generate_token = Arc::new(generate);
        self
    }

    /// Store key of a session record.
    pub fn key(token_id: &str) -> String {
        format!("session:{token_id}")
    }

    pub async fn create_session(&self, user_id: &str, is_admin: bool) -> PortResult<Session> {
        // Retry until the point lookup reports a free key. Each probe has its own
        // deadline, so a dead backend ends the loop with an error.
        let token_id = loop {
            let candidate = (self.generate_token)();
            let key = Self::key(&candidate);
            let existing = within(self.deadline, "session lookup", self.store.get(&key)).await?;
            if existing.is_none() {
                break candidate;
            }
            debug!("session token collision, regenerating");
        };

        let claims = SessionClaims {
            user_id: user_id.to_string(),
            is_admin,
        };
        let body = serde_json::to_vec(&claims)
            .map_err(|e| PortError::Unexpected(format!("failed to encode session: {e}")))?;
        within(
            self.deadline,
            "session write",
            self.store.set(&Self::key(&token_id), &body, self.ttl),
        )
        .await?;

        info!(admin = is_admin, "session issued");
        Ok(Session { token_id, claims })
    }

    /// Resolves a token. Expired and never-issued tokens are both `Ok(None)`.
    pub async fn get_session(&self, token_id: &str) -> PortResult<Option<SessionClaims>> {
        let key = Self::key(token_id);
        let Some(raw) = within(self.deadline, "session lookup", self.store.get(&key)).await? else {
            return Ok(None);
        };
        let claims = serde_json::from_slice(&raw)
            .map_err(|e| PortError::Unexpected(format!("corrupt session record: {e}")))?;
        Ok(Some(claims))
    }
}
