//! crates/listings_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete PostgreSQL and Redis implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::{
    DrainReport, Flat, FlatUpdate, Home, NewFlat, NewHome, NewUser, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (database, cache).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    Conflict(String),
    /// The backend could not be reached or did not answer within its deadline.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Transactional persistence for users, homes and flats.
///
/// Every method that mutates flats must advance the owning home's `updated_at`
/// in the same transaction as the flat write.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users ---
    /// Inserts a user under a freshly generated id. Duplicate email is `Conflict`.
    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    // --- Homes ---
    async fn create_home(&self, home: NewHome) -> PortResult<Home>;

    async fn get_home(&self, home_id: i64) -> PortResult<Home>;

    /// The home's current `updated_at`. Unknown home is `NotFound`.
    async fn home_generation(&self, home_id: i64) -> PortResult<DateTime<Utc>>;

    // --- Flats ---
    /// Unknown home is `NotFound`, an existing `(home_id, number)` is `Conflict`.
    async fn create_flat(&self, flat: NewFlat) -> PortResult<Flat>;

    /// Unknown home or flat is `NotFound`.
    async fn update_flat(&self, update: FlatUpdate) -> PortResult<Flat>;

    /// Moves every `created` flat of the home to `on_moderation`, then returns all
    /// of the home's flats, in one transaction. The marker advances only when at
    /// least one flat changed.
    async fn drain_and_list_flats(&self, home_id: i64) -> PortResult<DrainReport>;

    /// Approved flats of the home, ordered by number. Never mutates.
    async fn list_approved_flats(&self, home_id: i64) -> PortResult<Vec<Flat>>;
}

/// A key-value store with per-entry expiry (Redis in production).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when the key was never written or has expired.
    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> PortResult<()>;
}
