//! The persisted directory model and its derived indices.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use waxwing_mcl::serializer::Persistable;
use waxwing_types::circle::{CircleInverseInfo, CircleRecord, RelationshipState};
use waxwing_types::contact::{AbInfo, ContactKind, ContactRecord, GroupRecord, ServiceInfo, ServiceKind};
use waxwing_types::member::{MemberRecord, MembershipRole};
use waxwing_types::{AbId, Cid};

/// One service's membership lists: metadata plus role-keyed member maps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceMembership {
    pub service: ServiceInfo,
    /// Role to member-key to record.
    pub roles: BTreeMap<MembershipRole, HashMap<String, MemberRecord>>,
}

impl ServiceMembership {
    pub fn new(kind: ServiceKind, last_change: u64) -> Self {
        Self {
            service: ServiceInfo { kind, last_change },
            roles: BTreeMap::new(),
        }
    }
}

/// Where a contact lives: page plus per-page surrogate key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactAddress {
    pub ab_id: AbId,
    pub guid: String,
}

/// The local mirror of the user's directory.
///
/// Persisted fields mirror the server: membership lists, addressbook pages,
/// groups, circle inverse connections, page metadata, and circles created
/// locally that await server confirmation. The CID table and circle list
/// are derived; [`AddressBook::initialize`] rebuilds them after a load.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddressBook {
    version: String,
    membership: BTreeMap<ServiceKind, ServiceMembership>,
    /// Addressbook id to (contact guid to record).
    ab_contacts: HashMap<AbId, HashMap<String, ContactRecord>>,
    groups: HashMap<String, GroupRecord>,
    /// Inverse connection records, the circle-side relationship view.
    circle_inverse: HashMap<AbId, CircleInverseInfo>,
    ab_infos: HashMap<AbId, AbInfo>,
    /// Circle id to display name, for circles created locally and not yet
    /// confirmed by the server.
    pending_circles: HashMap<AbId, String>,

    /// CID to contact location, rebuilt from `ab_contacts`.
    #[serde(skip)]
    contact_table: HashMap<Cid, ContactAddress>,
    /// Materialized circles, rebuilt from inverse infos and pages.
    #[serde(skip)]
    circles: HashMap<AbId, CircleRecord>,
    #[serde(skip)]
    initialized: bool,
}

impl Default for AddressBook {
    fn default() -> Self {
        Self {
            version: Self::MODEL_VERSION.to_string(),
            membership: BTreeMap::new(),
            ab_contacts: HashMap::new(),
            groups: HashMap::new(),
            circle_inverse: HashMap::new(),
            ab_infos: HashMap::new(),
            pending_circles: HashMap::new(),
            contact_table: HashMap::new(),
            circles: HashMap::new(),
            initialized: false,
        }
    }
}

impl Persistable for AddressBook {
    const MODEL_VERSION: &'static str = "2";

    fn version(&self) -> &str {
        &self.version
    }
}

impl AddressBook {
    /// Rebuild the derived indices after deserialization.
    ///
    /// One-time: repeat calls are no-ops (the merge operations keep the
    /// indices current afterwards). Must run before any merge.
    pub fn initialize(&mut self) -> &mut Self {
        if self.initialized {
            return self;
        }
        self.initialized = true;

        self.contact_table.clear();
        for (ab_id, page) in &self.ab_contacts {
            for (guid, record) in page {
                self.contact_table.insert(
                    record.cid,
                    ContactAddress {
                        ab_id: ab_id.clone(),
                        guid: guid.clone(),
                    },
                );
            }
        }

        self.circles.clear();
        let accepted: Vec<AbId> = self
            .circle_inverse
            .iter()
            .filter(|(_, inverse)| inverse.state == RelationshipState::Accepted)
            .map(|(ab_id, _)| ab_id.clone())
            .collect();
        for ab_id in accepted {
            // Pages not yet fetched simply stay unmaterialized; the
            // orchestrator asks for them via `circles_needing_page`.
            if let Some(circle) = self.build_circle(&ab_id) {
                self.circles.insert(ab_id, circle);
            }
        }

        tracing::info!(
            contacts = self.contact_table.len(),
            circles = self.circles.len(),
            "addressbook indices rebuilt"
        );
        self
    }

    /// Discard all state, keeping only the current schema version. Used by
    /// the full-resync path; the next merges repopulate everything.
    pub fn reset(&mut self) {
        *self = Self::default();
        self.initialized = true;
    }

    /// Accepted circles whose page has not produced a materialized circle
    /// yet. The orchestrator fetches these pages next.
    pub fn circles_needing_page(&self) -> Vec<AbId> {
        let mut ids: Vec<AbId> = self
            .circle_inverse
            .iter()
            .filter(|(ab_id, inverse)| {
                inverse.state == RelationshipState::Accepted && !self.circles.contains_key(ab_id)
            })
            .map(|(ab_id, _)| ab_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Derive a circle record from its inverse info and stored page.
    ///
    /// Returns `None` when the inverse info or the page's `Me` contact is
    /// missing; both are recoverable (the page stays cached for a retry).
    pub(crate) fn build_circle(&self, ab_id: &AbId) -> Option<CircleRecord> {
        let inverse = self.circle_inverse.get(ab_id)?;
        let page = self.ab_contacts.get(ab_id)?;
        let me = page.values().find(|c| c.kind == ContactKind::Me)?;
        let display_name = self
            .ab_infos
            .get(ab_id)
            .and_then(|info| info.name.clone())
            .unwrap_or_default();
        Some(CircleRecord {
            ab_id: ab_id.clone(),
            display_name,
            hosted_domain: inverse.hosted_domain.clone(),
            role: me.circle_role.unwrap_or(inverse.role),
            members: page
                .values()
                .filter(|c| c.kind == ContactKind::Regular)
                .map(|c| c.account.clone())
                .collect(),
        })
    }

    /// Track a circle created locally until the server confirms it.
    pub fn add_pending_circle(&mut self, ab_id: AbId, display_name: impl Into<String>) {
        self.pending_circles.insert(ab_id, display_name.into());
    }

    // Accessors used by the merge modules and by callers inspecting state.

    pub fn membership(&self) -> &BTreeMap<ServiceKind, ServiceMembership> {
        &self.membership
    }

    pub(crate) fn membership_mut(&mut self) -> &mut BTreeMap<ServiceKind, ServiceMembership> {
        &mut self.membership
    }

    /// Member records for one role of one service.
    pub fn role_members(
        &self,
        kind: ServiceKind,
        role: MembershipRole,
    ) -> Option<&HashMap<String, MemberRecord>> {
        self.membership.get(&kind)?.roles.get(&role)
    }

    pub fn contacts(&self, ab_id: &AbId) -> Option<&HashMap<String, ContactRecord>> {
        self.ab_contacts.get(ab_id)
    }

    pub(crate) fn ab_contacts_mut(
        &mut self,
    ) -> &mut HashMap<AbId, HashMap<String, ContactRecord>> {
        &mut self.ab_contacts
    }

    pub fn groups(&self) -> &HashMap<String, GroupRecord> {
        &self.groups
    }

    pub(crate) fn groups_mut(&mut self) -> &mut HashMap<String, GroupRecord> {
        &mut self.groups
    }

    pub fn circle_inverse(&self) -> &HashMap<AbId, CircleInverseInfo> {
        &self.circle_inverse
    }

    pub(crate) fn circle_inverse_mut(&mut self) -> &mut HashMap<AbId, CircleInverseInfo> {
        &mut self.circle_inverse
    }

    pub fn ab_info(&self, ab_id: &AbId) -> Option<&AbInfo> {
        self.ab_infos.get(ab_id)
    }

    pub(crate) fn ab_infos_mut(&mut self) -> &mut HashMap<AbId, AbInfo> {
        &mut self.ab_infos
    }

    pub fn circles(&self) -> &HashMap<AbId, CircleRecord> {
        &self.circles
    }

    pub(crate) fn circles_mut(&mut self) -> &mut HashMap<AbId, CircleRecord> {
        &mut self.circles
    }

    pub(crate) fn pending_circles_mut(&mut self) -> &mut HashMap<AbId, String> {
        &mut self.pending_circles
    }

    pub fn contact_by_cid(&self, cid: Cid) -> Option<&ContactRecord> {
        let address = self.contact_table.get(&cid)?;
        self.ab_contacts.get(&address.ab_id)?.get(&address.guid)
    }

    pub(crate) fn contact_table_mut(&mut self) -> &mut HashMap<Cid, ContactAddress> {
        &mut self.contact_table
    }

    pub fn contact_count(&self) -> usize {
        self.contact_table.len()
    }
}
