//! Membership (privacy list) delta merge.

use waxwing_types::member::{MemberRecord, MembershipRole};
use waxwing_types::wire::MembershipDelta;

use crate::addressbook::{AddressBook, ServiceMembership};
use crate::events::{RosterEvent, RosterEvents};

impl AddressBook {
    /// Fold a membership delta into the stored lists.
    ///
    /// Freshness is checked at two levels with the same rule — an incoming
    /// record must be strictly newer than the stored one, ties lose:
    /// services first (a stale service skips wholesale), then individual
    /// members. A service marked deleted drops its whole membership map.
    pub fn merge_membership(
        &mut self,
        delta: &MembershipDelta,
        events: &RosterEvents,
    ) -> &mut Self {
        for svc in &delta.services {
            let Some(service_ts) = svc.last_change else {
                tracing::warn!(kind = ?svc.kind, "service delta without change stamp, skipped");
                continue;
            };
            if let Some(stored) = self.membership().get(&svc.kind) {
                if service_ts <= stored.service.last_change {
                    tracing::debug!(kind = ?svc.kind, "stale service delta, skipped");
                    continue;
                }
            }
            if svc.deleted {
                if self.membership_mut().remove(&svc.kind).is_some() {
                    tracing::info!(kind = ?svc.kind, "service removed, membership dropped");
                }
                continue;
            }

            let kind = svc.kind;
            let entry = self
                .membership_mut()
                .entry(kind)
                .or_insert_with(|| ServiceMembership::new(kind, service_ts));
            entry.service.last_change = service_ts;

            for role_members in &svc.memberships {
                let role = role_members.role;
                for member in &role_members.members {
                    let Some(id) = member.resolve() else {
                        tracing::warn!(
                            ?role,
                            "member delta without exactly one addressing field, skipped"
                        );
                        continue;
                    };
                    let Some(member_ts) = member.last_changed else {
                        tracing::warn!(account = %id.account(), "member delta without change stamp, skipped");
                        continue;
                    };
                    let key = id.key();
                    let account = id.account();

                    if let Some(existing) =
                        entry.roles.get(&role).and_then(|members| members.get(&key))
                    {
                        if member_ts <= existing.last_changed {
                            continue;
                        }
                    }

                    if member.deleted {
                        let removed = entry
                            .roles
                            .get_mut(&role)
                            .map(|members| members.remove(&key).is_some())
                            .unwrap_or(false);
                        if removed {
                            events.emit(match role {
                                MembershipRole::Reverse => RosterEvent::ReverseRemoved {
                                    account: account.clone(),
                                },
                                _ => RosterEvent::ListMemberRemoved {
                                    service: kind,
                                    role,
                                    account: account.clone(),
                                },
                            });
                        }
                        continue;
                    }

                    // Allow and Block are mutually exclusive per account.
                    let opposite = match role {
                        MembershipRole::Allow => Some(MembershipRole::Block),
                        MembershipRole::Block => Some(MembershipRole::Allow),
                        _ => None,
                    };
                    if let Some(opposite) = opposite {
                        let displaced = entry
                            .roles
                            .get_mut(&opposite)
                            .map(|members| members.remove(&key).is_some())
                            .unwrap_or(false);
                        if displaced {
                            events.emit(RosterEvent::ListMemberRemoved {
                                service: kind,
                                role: opposite,
                                account: account.clone(),
                            });
                        }
                    }

                    let newly_added = entry
                        .roles
                        .entry(role)
                        .or_default()
                        .insert(
                            key,
                            MemberRecord {
                                id,
                                last_changed: member_ts,
                            },
                        )
                        .is_none();
                    if newly_added {
                        events.emit(match role {
                            MembershipRole::Reverse => RosterEvent::ReverseAdded { account },
                            _ => RosterEvent::ListMemberAdded {
                                service: kind,
                                role,
                                account,
                            },
                        });
                    }
                }
            }
        }
        self
    }
}
