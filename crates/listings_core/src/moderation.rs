//! crates/listings_core/src/moderation.rs
//!
//! The moderation state machine for flats.
//!
//! ```text
//! created --drain--> on_moderation --update--> approved | declined
//! ```
//!
//! `created` is only ever assigned at insertion. The `created -> on_moderation`
//! edge is taken by the drain that runs as part of a moderator's listing read;
//! a moderator's explicit update may then set any status directly.

use std::fmt;
use std::str::FromStr;

use crate::domain::{Flat, ModerationStatus};
use crate::error::ServiceError;

impl ModerationStatus {
    /// The status every new flat starts in.
    pub const INITIAL: ModerationStatus = ModerationStatus::Created;

    /// The status after a moderator drain. Anything but `Created` is unchanged,
    /// so draining twice is the same as draining once.
    pub fn drained(self) -> Self {
        match self {
            ModerationStatus::Created => ModerationStatus::OnModeration,
            other => other,
        }
    }

    /// Whether clients (non-moderators) may see a flat in this status.
    pub fn is_publicly_visible(self) -> bool {
        matches!(self, ModerationStatus::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModerationStatus::Created => "created",
            ModerationStatus::OnModeration => "on_moderation",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ModerationStatus::Created),
            "on_moderation" => Ok(ModerationStatus::OnModeration),
            "approved" => Ok(ModerationStatus::Approved),
            "declined" => Ok(ModerationStatus::Declined),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown moderation status '{other}'"
            ))),
        }
    }
}

/// Applies the drain to a set of flats in place and returns how many changed.
pub fn drain(flats: &mut [Flat]) -> usize {
    let mut changed = 0;
    for flat in flats.iter_mut() {
        let next = flat.status.drained();
        if next != flat.status {
            flat.status = next;
            changed += 1;
        }
    }
    changed
}
