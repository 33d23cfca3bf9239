//! Circle lifecycle: inverse connection merge, page merge, and
//! materialization.
//!
//! The relationship state machine per circle: `None -> WaitingResponse`
//! on an invitation, `WaitingResponse -> Accepted` on accept,
//! `WaitingResponse | Accepted -> Rejected` or outright deletion on
//! reject/leave/remove, and `Rejected -> WaitingResponse` when re-invited.
//! Re-entry always builds a fresh circle; a permanently departed circle is
//! absent from every map rather than tombstoned.

use std::collections::BTreeSet;

use waxwing_types::circle::{CircleInverseInfo, CircleRole, RelationshipState};
use waxwing_types::contact::ContactKind;
use waxwing_types::wire::{AbPageDelta, CircleInverseDelta};
use waxwing_types::AbId;

use crate::addressbook::AddressBook;
use crate::events::{RosterEvent, RosterEvents};

impl AddressBook {
    /// Merge one inverse connection record from the individual page.
    pub(crate) fn apply_circle_inverse(
        &mut self,
        inverse: &CircleInverseDelta,
        events: &RosterEvents,
    ) {
        let ab_id = inverse.ab_id.clone();

        if inverse.deleted {
            if self.circle_inverse_mut().remove(&ab_id).is_some() {
                let was_materialized = self.circles_mut().remove(&ab_id).is_some();
                self.pending_circles_mut().remove(&ab_id);
                // Confirmed removal: page, inverse info, and metadata go
                // together so a later re-invite starts clean.
                self.purge_page(&ab_id);
                if was_materialized {
                    events.emit(RosterEvent::CircleExited { ab_id: ab_id.clone() });
                }
                tracing::info!(%ab_id, "circle connection removed");
            }
            return;
        }

        let Some(ts) = inverse.last_changed else {
            tracing::warn!(%ab_id, "circle connection without change stamp, skipped");
            return;
        };
        let previous_state = self.circle_inverse().get(&ab_id).map(|i| i.state);
        if let Some(existing) = self.circle_inverse().get(&ab_id) {
            if ts <= existing.last_changed {
                return;
            }
        }

        self.circle_inverse_mut().insert(
            ab_id.clone(),
            CircleInverseInfo {
                ab_id: ab_id.clone(),
                role: inverse.role,
                state: inverse.state,
                hosted_domain: inverse.hosted_domain.to_lowercase(),
                last_changed: ts,
            },
        );

        match inverse.state {
            RelationshipState::Accepted => {
                // Confirmation of a circle we created locally, or an accept
                // of an invitation. Either way the page fetch materializes
                // it; see `circles_needing_page`.
                self.pending_circles_mut().remove(&ab_id);
            }
            RelationshipState::WaitingResponse => {
                if inverse.role == CircleRole::PendingOutbound
                    && previous_state != Some(RelationshipState::WaitingResponse)
                {
                    let name = self.circle_display_name(&ab_id, &inverse.hosted_domain);
                    events.emit(RosterEvent::CircleInvitationReceived {
                        ab_id: ab_id.clone(),
                        name,
                    });
                }
            }
            RelationshipState::Rejected => {
                // The owner said no (or left); drop the materialized circle
                // but keep the inverse record until the server deletes it.
                if self.circles_mut().remove(&ab_id).is_some() {
                    events.emit(RosterEvent::CircleExited { ab_id: ab_id.clone() });
                }
            }
            RelationshipState::None => {}
        }
    }

    /// Merge a circle's own addressbook page and reconcile the circle.
    ///
    /// The page is always stored; materialization additionally needs the
    /// inverse connection in `Accepted` state and a `Me` contact in the
    /// page. When either is missing this logs and leaves the stored page
    /// and metadata in place for a later retry.
    pub fn merge_group(&mut self, page: &AbPageDelta, events: &RosterEvents) -> &mut Self {
        let ab_id = page.ab_id.clone();
        let Some(page_ts) = page.last_change else {
            tracing::warn!(%ab_id, "circle page without change stamp, aborted");
            return self;
        };
        if let Some(info) = self.ab_info(&ab_id) {
            if page_ts <= info.last_change {
                tracing::debug!(%ab_id, page_ts, "stale circle page, skipped");
                return self;
            }
        }

        let old_members = self.page_member_accounts(&ab_id);
        for contact in &page.contacts {
            // Per-contact add/remove on circle pages surfaces as the
            // joined/left diff below, not as contact events.
            let _ = self.merge_page_contact(&ab_id, contact);
        }
        self.store_ab_info(&ab_id, page_ts, page.name.clone());

        match self.circle_inverse().get(&ab_id) {
            None => {
                tracing::warn!(%ab_id, "circle page without inverse connection, not materialized");
                return self;
            }
            Some(inverse) if inverse.state != RelationshipState::Accepted => {
                tracing::debug!(%ab_id, state = ?inverse.state, "relationship not accepted, not materialized");
                return self;
            }
            Some(_) => {}
        }

        let Some(circle) = self.build_circle(&ab_id) else {
            tracing::warn!(%ab_id, "circle page without me contact, not materialized");
            return self;
        };

        let first_materialization = !self.circles().contains_key(&ab_id);
        let new_members = circle.members.clone();
        let name = circle.display_name.clone();
        self.circles_mut().insert(ab_id.clone(), circle);

        if first_materialization {
            events.emit(RosterEvent::CircleCreated {
                ab_id: ab_id.clone(),
                name,
            });
        }
        for account in new_members.difference(&old_members) {
            events.emit(RosterEvent::CircleMemberJoined {
                ab_id: ab_id.clone(),
                account: account.clone(),
            });
        }
        for account in old_members.difference(&new_members) {
            events.emit(RosterEvent::CircleMemberLeft {
                ab_id: ab_id.clone(),
                account: account.clone(),
            });
        }
        self
    }

    /// Accounts of the regular members currently stored in a page.
    fn page_member_accounts(&self, ab_id: &AbId) -> BTreeSet<String> {
        self.contacts(ab_id)
            .map(|page| {
                page.values()
                    .filter(|c| c.kind == ContactKind::Regular)
                    .map(|c| c.account.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Best display name for a circle before its page has been fetched:
    /// page metadata, then the hidden representative in the individual
    /// page, then the circle's account form.
    fn circle_display_name(&self, ab_id: &AbId, hosted_domain: &str) -> String {
        if let Some(name) = self.ab_info(ab_id).and_then(|info| info.name.clone()) {
            return name;
        }
        let account = format!("{}@{}", ab_id.as_str(), hosted_domain.to_lowercase());
        if let Some(representative) = self
            .contacts(&AbId::individual())
            .and_then(|page| {
                page.values()
                    .find(|c| c.kind == ContactKind::Circle && c.account == account)
            })
        {
            return representative.display_name.clone();
        }
        account
    }
}
