//! Circle relationship records.
//!
//! A circle is visible from the individual addressbook in two places: a
//! hidden representative contact carrying the relationship state as an
//! annotation, and an inverse connection record carrying the owner's role
//! inside the circle. The merge engine reconciles both views.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::AbId;

/// Relationship state of the owner to a circle, string-encoded on the wire.
///
/// `Rejected` is not terminal: a circle the owner left can re-invite, which
/// recreates the local circle from scratch. A circle the owner permanently
/// left is absent from all maps, not tombstoned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipState {
    #[default]
    None,
    WaitingResponse,
    Accepted,
    Rejected,
}

/// The owner's role within a circle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircleRole {
    Admin,
    AssistantAdmin,
    Member,
    /// An invitation is pending the owner's response.
    #[serde(rename = "StatePendingOutbound")]
    PendingOutbound,
}

/// Inverse connection record: the circle-side view of the relationship.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleInverseInfo {
    pub ab_id: AbId,
    pub role: CircleRole,
    pub state: RelationshipState,
    /// Domain hosting the circle (e.g. `live.com`).
    pub hosted_domain: String,
    pub last_changed: u64,
}

/// A materialized circle, derived from its inverse info and its own
/// addressbook page. Rebuilt on initialize, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleRecord {
    pub ab_id: AbId,
    pub display_name: String,
    pub hosted_domain: String,
    /// The owner's role, taken from the page's `Me` contact.
    pub role: CircleRole,
    /// Lowercased accounts of the current members.
    pub members: BTreeSet<String>,
}

impl CircleRecord {
    /// The circle's own account form, `<ab-id>@<hosted-domain>`.
    pub fn account(&self) -> String {
        format!("{}@{}", self.ab_id.as_str(), self.hosted_domain.to_lowercase())
    }
}
