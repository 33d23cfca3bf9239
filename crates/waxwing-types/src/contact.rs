//! Addressbook contact, group, and service records.

use serde::{Deserialize, Serialize};

use crate::circle::{CircleRole, RelationshipState};
use crate::member::ClientKind;
use crate::Cid;

/// The directory services a membership list is kept for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceKind {
    Messenger,
    Invitation,
    SocialNetwork,
    Space,
    Profile,
}

/// Service metadata attached to a membership list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub kind: ServiceKind,
    /// Unix epoch seconds of the last service-side change.
    pub last_change: u64,
}

/// What a contact record in a page stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    /// An ordinary contact.
    Regular,
    /// The owner's own record inside a page; carries the circle role on
    /// circle pages.
    Me,
    /// A hidden representative standing in for a circle in the individual
    /// addressbook.
    Circle,
}

/// A contact record belonging to one addressbook page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Per-page surrogate key (lowercase GUID). Not stable across pages.
    pub guid: String,
    /// Stable cross-page contact id.
    pub cid: Cid,
    /// Lowercased account name.
    pub account: String,
    pub kind: ContactKind,
    pub client: ClientKind,
    pub display_name: String,
    pub is_messenger_user: bool,
    /// Guids of the groups this contact belongs to (individual page only).
    #[serde(default)]
    pub groups: Vec<String>,
    /// Relationship-state annotation; set on hidden representatives to
    /// encode the circle's invite/accept/reject transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_state: Option<RelationshipState>,
    /// The owner's role, set on `Me` records inside circle pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle_role: Option<CircleRole>,
    pub last_changed: u64,
}

/// A contact group in the individual addressbook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub guid: String,
    pub name: String,
    pub is_favorite: bool,
    pub last_changed: u64,
}

/// Per-addressbook metadata used for page freshness decisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbInfo {
    /// Unix epoch seconds of the last page change the server reported.
    pub last_change: u64,
    /// Display name of the addressbook (circle name for circle pages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Snapshot of the owner's storage-service profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub display_name: String,
    pub personal_message: String,
    /// Storage resource id of the profile document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<ProfilePhoto>,
    pub date_modified: u64,
}

/// The owner's display picture as stored by the storage service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePhoto {
    pub resource_id: String,
    /// Content hash of the image, key into the user-tile cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_auth_url: Option<String>,
}
