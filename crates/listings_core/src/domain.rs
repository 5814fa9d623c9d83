//! crates/listings_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A residential building. Owns a set of flats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Home {
    pub id: i64,
    pub address: String,
    pub year: i32,
    pub developer: String,
    /// User id of the moderator that registered the home and reviews its flats.
    pub reviewer_id: String,
    pub created_at: DateTime<Utc>,
    /// Advanced on every mutation of the home's flats; see [`GenerationMarker`].
    pub updated_at: DateTime<Utc>,
}

impl Home {
    pub fn generation(&self) -> GenerationMarker {
        GenerationMarker::from(self.updated_at)
    }
}

/// A single unit inside a home. `(home_id, number)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flat {
    pub number: i32,
    pub home_id: i64,
    pub price: i64,
    pub rooms: i32,
    pub status: ModerationStatus,
}

/// Moderation state of a flat. Transitions live in [`crate::moderation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Created,
    OnModeration,
    Approved,
    Declined,
}

/// The integer rendering of a home's `updated_at`, embedded into cache keys.
///
/// Microsecond resolution, matching what PostgreSQL stores for `timestamptz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationMarker(i64);

impl GenerationMarker {
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<DateTime<Utc>> for GenerationMarker {
    fn from(ts: DateTime<Utc>) -> Self {
        Self(ts.timestamp_micros())
    }
}

impl fmt::Display for GenerationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a session token resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Empty for anonymous demo sessions.
    #[serde(rename = "uid")]
    pub user_id: String,
    #[serde(rename = "admin")]
    pub is_admin: bool,
}

/// An issued session: the opaque token plus the claims stored behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token_id: String,
    pub claims: SessionClaims,
}

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Input for [`crate::ports::DatabaseService::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Input for [`crate::ports::DatabaseService::create_home`].
#[derive(Debug, Clone)]
pub struct NewHome {
    pub address: String,
    pub year: i32,
    pub developer: String,
    pub reviewer_id: String,
}

/// Input for [`crate::ports::DatabaseService::create_flat`].
#[derive(Debug, Clone, Copy)]
pub struct NewFlat {
    pub home_id: i64,
    pub number: i32,
    pub price: i64,
    pub rooms: i32,
}

/// Input for [`crate::ports::DatabaseService::update_flat`].
#[derive(Debug, Clone, Copy)]
pub struct FlatUpdate {
    pub home_id: i64,
    pub number: i32,
    pub price: i64,
    pub rooms: i32,
    pub status: ModerationStatus,
}

/// Result of a moderation listing: the drained count and the post-drain flats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub drained: u64,
    pub flats: Vec<Flat>,
}
