//! Notification bus.
//!
//! Every externally visible mutation of the roster models is announced as
//! a [`RosterEvent`] on a broadcast channel. Collaborators (presence
//! handling, UI state, the conversation layer) subscribe; the merge engine
//! never calls into them directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use waxwing_types::contact::ServiceKind;
use waxwing_types::member::MembershipRole;
use waxwing_types::AbId;

/// A change notification from the merge engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RosterEvent {
    /// An account joined a privacy list (Allow, Block, or Pending).
    ListMemberAdded {
        service: ServiceKind,
        role: MembershipRole,
        account: String,
    },
    /// An account left a privacy list.
    ListMemberRemoved {
        service: ServiceKind,
        role: MembershipRole,
        account: String,
    },
    /// Someone added the owner to their own contact list.
    ReverseAdded { account: String },
    ReverseRemoved { account: String },
    /// A contact record appeared in an addressbook page.
    ContactAdded {
        ab_id: AbId,
        guid: String,
        account: String,
    },
    ContactRemoved {
        ab_id: AbId,
        guid: String,
        account: String,
    },
    GroupAdded { guid: String, name: String },
    GroupRemoved { guid: String },
    /// A member appeared in a circle's page.
    CircleMemberJoined { ab_id: AbId, account: String },
    CircleMemberLeft { ab_id: AbId, account: String },
    /// An invitation to join a circle arrived and awaits a response.
    CircleInvitationReceived { ab_id: AbId, name: String },
    /// A circle was materialized locally (its page and relationship record
    /// were reconciled for the first time).
    CircleCreated { ab_id: AbId, name: String },
    /// The owner left, rejected, or was removed from a circle.
    CircleExited { ab_id: AbId },
}

/// Broadcast bus for roster events.
#[derive(Clone)]
pub struct RosterEvents {
    sender: broadcast::Sender<RosterEvent>,
    sequence: Arc<AtomicU64>,
}

impl RosterEvents {
    /// Create a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers. Lagging or absent subscribers are
    /// not an error.
    pub fn emit(&self, event: RosterEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(?event, "roster event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.sender.subscribe()
    }

    /// Total number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for RosterEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Drain everything currently buffered on a subscription.
pub fn drain(rx: &mut broadcast::Receiver<RosterEvent>) -> Vec<RosterEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
