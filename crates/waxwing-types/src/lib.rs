//! # waxwing-types
//!
//! Shared domain types for the Waxwing contact-directory engine: membership
//! roles, member identities, contact and group records, circle relationship
//! state, and the delta shapes the directory services hand to the merge
//! engine.

pub mod circle;
pub mod contact;
pub mod member;
pub mod wire;

use serde::{Deserialize, Serialize};

/// Stable 64-bit contact identifier, shared across addressbook pages.
pub type Cid = u64;

/// The addressbook identifier of the owner's individual (default) page.
pub const INDIVIDUAL_AB_ID: &str = "00000000-0000-0000-0000-000000000000";

/// An addressbook identifier, normalized to lowercase.
///
/// The individual addressbook uses the all-zero GUID; every circle owns one
/// page under its own id. Lowercasing at construction keeps map lookups
/// consistent regardless of how a service response cased the id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbId(String);

impl AbId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    /// The owner's individual (default) addressbook id.
    pub fn individual() -> Self {
        Self(INDIVIDUAL_AB_ID.to_string())
    }

    pub fn is_individual(&self) -> bool {
        self.0 == INDIVIDUAL_AB_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase an account name for use as a map key.
pub fn normalize_account(account: &str) -> String {
    account.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ab_id_lowercases() {
        let id = AbId::new("1A2B3C4D-0000-0000-0000-00000000ABCD");
        assert_eq!(id.as_str(), "1a2b3c4d-0000-0000-0000-00000000abcd");
    }

    #[test]
    fn test_individual_ab_id() {
        assert!(AbId::individual().is_individual());
        assert!(!AbId::new("deadbeef-0000-0000-0000-000000000000").is_individual());
    }

    #[test]
    fn test_normalize_account() {
        assert_eq!(normalize_account("  Alice@Example.COM "), "alice@example.com");
    }
}
