//! Membership list identities and roles.

use serde::{Deserialize, Serialize};

use crate::{normalize_account, AbId};

/// Privacy-list classification of a relationship to a service.
///
/// `Allow` and `Block` are mutually exclusive for the same account on the
/// same service; the merge engine enforces this on every insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MembershipRole {
    Allow,
    Block,
    Reverse,
    Pending,
}

impl MembershipRole {
    pub const ALL: [MembershipRole; 4] = [
        MembershipRole::Allow,
        MembershipRole::Block,
        MembershipRole::Reverse,
        MembershipRole::Pending,
    ];

    /// The wire name used by the sharing service.
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Allow => "Allow",
            MembershipRole::Block => "Block",
            MembershipRole::Reverse => "Reverse",
            MembershipRole::Pending => "Pending",
        }
    }
}

/// The network a member is addressed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Passport,
    Email,
    Phone,
    Circle,
}

/// A member identity: exactly one of the four addressing forms.
///
/// Service responses carry members as polymorphic records where one of
/// passport name, email, phone number, or circle id is populated. Modeling
/// them as a closed sum keeps account resolution a single exhaustive match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberId {
    /// A passport (Messenger) account name.
    Passport(String),
    /// A plain email contact from another network.
    Email(String),
    /// A mobile phone contact, account is the number.
    Phone(String),
    /// A circle, addressed as `<ab-id>@<hosted-domain>`.
    Circle { ab_id: AbId, domain: String },
}

impl MemberId {
    /// The lowercased account string for this member.
    pub fn account(&self) -> String {
        match self {
            MemberId::Passport(a) | MemberId::Email(a) | MemberId::Phone(a) => {
                normalize_account(a)
            }
            MemberId::Circle { ab_id, domain } => {
                format!("{}@{}", ab_id.as_str(), domain.to_lowercase())
            }
        }
    }

    pub fn kind(&self) -> ClientKind {
        match self {
            MemberId::Passport(_) => ClientKind::Passport,
            MemberId::Email(_) => ClientKind::Email,
            MemberId::Phone(_) => ClientKind::Phone,
            MemberId::Circle { .. } => ClientKind::Circle,
        }
    }

    /// Stable map key for this member within a membership role.
    ///
    /// `BLAKE3::derive_key("Waxwing v1 member-key", "<kind>:<account>")`,
    /// hex-encoded. Two members with the same account but different
    /// addressing forms hash to different keys.
    pub fn key(&self) -> String {
        let input = format!("{:?}:{}", self.kind(), self.account());
        let hash = blake3::derive_key("Waxwing v1 member-key", input.as_bytes());
        hex::encode(hash)
    }
}

/// A stored membership entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: MemberId,
    /// Unix epoch seconds of the service-side last change.
    pub last_changed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_lowercased() {
        let id = MemberId::Passport("Alice@Hotmail.com".into());
        assert_eq!(id.account(), "alice@hotmail.com");
    }

    #[test]
    fn test_circle_account_form() {
        let id = MemberId::Circle {
            ab_id: AbId::new("AABBCCDD-0000-0000-0000-000000000001"),
            domain: "Live.com".into(),
        };
        assert_eq!(
            id.account(),
            "aabbccdd-0000-0000-0000-000000000001@live.com"
        );
        assert_eq!(id.kind(), ClientKind::Circle);
    }

    #[test]
    fn test_key_distinguishes_kinds() {
        let passport = MemberId::Passport("someone@example.com".into());
        let email = MemberId::Email("someone@example.com".into());
        assert_ne!(passport.key(), email.key());
    }

    #[test]
    fn test_key_case_insensitive() {
        let a = MemberId::Passport("Bob@Example.com".into());
        let b = MemberId::Passport("bob@example.com".into());
        assert_eq!(a.key(), b.key());
    }
}
