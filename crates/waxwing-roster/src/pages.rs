//! Addressbook page merge for the individual (default) page.
//!
//! Order inside a page matters: groups are merged before contacts (contact
//! records reference group guids), and circle inverse connections come
//! last (circle handling references contacts). Circle pages go through
//! [`crate::circles`] instead.

use waxwing_types::contact::{AbInfo, ContactKind, ContactRecord, GroupRecord};
use waxwing_types::wire::{AbPageDelta, ContactDelta};
use waxwing_types::{normalize_account, AbId, Cid};

use crate::addressbook::{AddressBook, ContactAddress};
use crate::events::{RosterEvent, RosterEvents};

/// What merging one contact delta did to the page.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ContactChange {
    Added { guid: String, account: String },
    Updated,
    Removed { guid: String, account: String },
    Skipped,
}

impl AddressBook {
    /// Merge a fetched addressbook page, dispatching on which page it is.
    pub fn merge_addressbook(&mut self, page: &AbPageDelta, events: &RosterEvents) -> &mut Self {
        if page.ab_id.is_individual() {
            self.merge_individual(page, events)
        } else {
            self.merge_group(page, events)
        }
    }

    /// Merge the individual page: groups, then contacts, then circle
    /// inverse connections.
    pub fn merge_individual(&mut self, page: &AbPageDelta, events: &RosterEvents) -> &mut Self {
        let ab_id = AbId::individual();
        let Some(page_ts) = page.last_change else {
            tracing::warn!("individual page without change stamp, aborted");
            return self;
        };
        if let Some(info) = self.ab_info(&ab_id) {
            if page_ts <= info.last_change {
                tracing::debug!(page_ts, "stale individual page, skipped");
                return self;
            }
        }

        for group in &page.groups {
            let guid = group.guid.to_lowercase();
            let Some(group_ts) = group.last_changed else {
                tracing::warn!(%guid, "group delta without change stamp, skipped");
                continue;
            };
            if group.deleted {
                if self.groups_mut().remove(&guid).is_some() {
                    events.emit(RosterEvent::GroupRemoved { guid });
                }
                continue;
            }
            if let Some(existing) = self.groups().get(&guid) {
                if group_ts <= existing.last_changed {
                    continue;
                }
            }
            let newly_added = self
                .groups_mut()
                .insert(
                    guid.clone(),
                    GroupRecord {
                        guid: guid.clone(),
                        name: group.name.clone(),
                        is_favorite: group.is_favorite,
                        last_changed: group_ts,
                    },
                )
                .is_none();
            if newly_added {
                events.emit(RosterEvent::GroupAdded {
                    guid,
                    name: group.name.clone(),
                });
            }
        }

        for contact in &page.contacts {
            match self.merge_page_contact(&ab_id, contact) {
                ContactChange::Added { guid, account } => {
                    // Hidden circle representatives are bookkeeping, not
                    // contacts anyone should be told about.
                    if contact.kind == ContactKind::Regular {
                        events.emit(RosterEvent::ContactAdded {
                            ab_id: ab_id.clone(),
                            guid,
                            account,
                        });
                    }
                }
                ContactChange::Removed { guid, account } => {
                    if contact.kind == ContactKind::Regular {
                        events.emit(RosterEvent::ContactRemoved {
                            ab_id: ab_id.clone(),
                            guid,
                            account,
                        });
                    }
                }
                ContactChange::Updated | ContactChange::Skipped => {}
            }
        }

        for inverse in &page.circles {
            self.apply_circle_inverse(inverse, events);
        }

        self.store_ab_info(&ab_id, page_ts, page.name.clone());
        self
    }

    /// Merge one contact delta into a page, maintaining the CID table.
    pub(crate) fn merge_page_contact(
        &mut self,
        ab_id: &AbId,
        contact: &ContactDelta,
    ) -> ContactChange {
        let guid = contact.guid.to_lowercase();
        let Some(contact_ts) = contact.last_changed else {
            tracing::warn!(%guid, "contact delta without change stamp, skipped");
            return ContactChange::Skipped;
        };

        if contact.deleted {
            let removed = self
                .ab_contacts_mut()
                .get_mut(ab_id)
                .and_then(|page| page.remove(&guid));
            return match removed {
                Some(old) => {
                    self.remove_cid_if_here(old.cid, ab_id, &guid);
                    ContactChange::Removed {
                        guid,
                        account: old.account,
                    }
                }
                None => ContactChange::Skipped,
            };
        }

        let record = ContactRecord {
            guid: guid.clone(),
            cid: contact.cid,
            account: normalize_account(&contact.account),
            kind: contact.kind,
            client: contact.client,
            display_name: contact.display_name.clone(),
            is_messenger_user: contact.is_messenger_user,
            groups: contact.groups.iter().map(|g| g.to_lowercase()).collect(),
            relationship_state: contact.relationship_state,
            circle_role: contact.circle_role,
            last_changed: contact_ts,
        };

        let page = self.ab_contacts_mut().entry(ab_id.clone()).or_default();
        if let Some(existing) = page.get(&guid) {
            if contact_ts <= existing.last_changed {
                return ContactChange::Skipped;
            }
        }
        let account = record.account.clone();
        let cid = record.cid;
        let replaced = page.insert(guid.clone(), record).is_some();
        self.contact_table_mut().insert(
            cid,
            ContactAddress {
                ab_id: ab_id.clone(),
                guid: guid.clone(),
            },
        );
        if replaced {
            ContactChange::Updated
        } else {
            ContactChange::Added { guid, account }
        }
    }

    /// Drop a CID table entry, but only if it still points at this page
    /// slot (the contact may have moved pages since).
    pub(crate) fn remove_cid_if_here(&mut self, cid: Cid, ab_id: &AbId, guid: &str) {
        let table = self.contact_table_mut();
        if table
            .get(&cid)
            .is_some_and(|address| address.ab_id == *ab_id && address.guid == guid)
        {
            table.remove(&cid);
        }
    }

    /// Purge a whole page and its CID entries (circle removal cleanup).
    pub(crate) fn purge_page(&mut self, ab_id: &AbId) {
        self.ab_contacts_mut().remove(ab_id);
        self.contact_table_mut()
            .retain(|_, address| address.ab_id != *ab_id);
        self.ab_infos_mut().remove(ab_id);
    }

    pub(crate) fn store_ab_info(&mut self, ab_id: &AbId, last_change: u64, name: Option<String>) {
        let previous_name = self.ab_info(ab_id).and_then(|info| info.name.clone());
        self.ab_infos_mut().insert(
            ab_id.clone(),
            AbInfo {
                last_change,
                name: name.or(previous_name),
            },
        );
    }
}
