//! Delta shapes handed to the merge engine by the directory services.
//!
//! These are the already-parsed forms of membership and addressbook
//! responses. Timestamps are Unix epoch seconds; a delta whose timestamp
//! failed to parse upstream arrives as `None` and the affected entity is
//! skipped rather than merged with a guessed time.

use serde::{Deserialize, Serialize};

use crate::circle::{CircleRole, RelationshipState};
use crate::contact::{ContactKind, ServiceKind};
use crate::member::{ClientKind, MemberId, MembershipRole};
use crate::{AbId, Cid};

/// A membership ("sharing") delta: one entry per service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MembershipDelta {
    pub services: Vec<ServiceDelta>,
    /// Continuation key to hand back on the next fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceDelta {
    pub kind: ServiceKind,
    pub last_change: Option<u64>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub memberships: Vec<RoleMembers>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleMembers {
    pub role: MembershipRole,
    pub members: Vec<MemberDelta>,
}

/// A polymorphic member entry: exactly one addressing field is populated.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemberDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Circle id plus hosted domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle: Option<(AbId, String)>,
    #[serde(default)]
    pub deleted: bool,
    pub last_changed: Option<u64>,
}

impl MemberDelta {
    /// Resolve the addressing form, requiring exactly one populated field.
    pub fn resolve(&self) -> Option<MemberId> {
        match (&self.passport, &self.email, &self.phone, &self.circle) {
            (Some(a), None, None, None) => Some(MemberId::Passport(a.clone())),
            (None, Some(a), None, None) => Some(MemberId::Email(a.clone())),
            (None, None, Some(a), None) => Some(MemberId::Phone(a.clone())),
            (None, None, None, Some((ab_id, domain))) => Some(MemberId::Circle {
                ab_id: ab_id.clone(),
                domain: domain.clone(),
            }),
            _ => None,
        }
    }
}

/// One addressbook page fetch result, individual or circle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbPageDelta {
    pub ab_id: AbId,
    /// Page-level change stamp; gates the whole page against the cached one.
    pub last_change: Option<u64>,
    /// Display name of the addressbook (circle name for circle pages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub groups: Vec<GroupDelta>,
    #[serde(default)]
    pub contacts: Vec<ContactDelta>,
    /// Inverse connection records; only present on the individual page.
    #[serde(default)]
    pub circles: Vec<CircleInverseDelta>,
    /// Continuation key to hand back on the next fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupDelta {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub deleted: bool,
    pub last_changed: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactDelta {
    pub guid: String,
    pub cid: Cid,
    pub account: String,
    pub kind: ContactKind,
    pub client: ClientKind,
    pub display_name: String,
    #[serde(default)]
    pub is_messenger_user: bool,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_state: Option<RelationshipState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle_role: Option<CircleRole>,
    #[serde(default)]
    pub deleted: bool,
    pub last_changed: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircleInverseDelta {
    pub ab_id: AbId,
    pub role: CircleRole,
    pub state: RelationshipState,
    pub hosted_domain: String,
    #[serde(default)]
    pub deleted: bool,
    pub last_changed: Option<u64>,
}
