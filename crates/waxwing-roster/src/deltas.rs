//! The deltas store: transient synchronization aids persisted between
//! sessions.
//!
//! Holds per-service cache keys, preferred redirect hosts, a bounded cache
//! of display-image blobs keyed by content hash, and the owner's profile
//! snapshot. Distinct from the addressbook model: truncating it after a
//! full addressbook save sheds sync state without touching the directory.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use waxwing_mcl::serializer::Persistable;
use waxwing_types::contact::OwnerProfile;
use waxwing_types::normalize_account;

/// Maximum number of cached display images.
pub const USER_TILE_CAPACITY: usize = 1000;

/// Which service a stored cache key belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKeyKind {
    Sharing,
    AddressBook,
    Storage,
}

/// Persisted synchronization aids.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deltas {
    version: String,
    /// Opaque continuation keys handed back by each service.
    cache_keys: HashMap<CacheKeyKind, String>,
    /// Service-method key to redirect hostname.
    preferred_hosts: HashMap<String, String>,
    /// Display-image blobs keyed by content hash.
    user_tile_slots: HashMap<String, Vec<u8>>,
    /// Access counters, parallel to `user_tile_slots`.
    visit_count: HashMap<String, u64>,
    /// Lowercased account to the content hash of its display image.
    image_relationships: HashMap<String, String>,
    pub profile: OwnerProfile,
}

impl Default for Deltas {
    fn default() -> Self {
        Self {
            version: Self::MODEL_VERSION.to_string(),
            cache_keys: HashMap::new(),
            preferred_hosts: HashMap::new(),
            user_tile_slots: HashMap::new(),
            visit_count: HashMap::new(),
            image_relationships: HashMap::new(),
            profile: OwnerProfile::default(),
        }
    }
}

impl Persistable for Deltas {
    const MODEL_VERSION: &'static str = "2";

    fn version(&self) -> &str {
        &self.version
    }
}

impl Deltas {
    pub fn cache_key(&self, kind: CacheKeyKind) -> Option<&str> {
        self.cache_keys.get(&kind).map(String::as_str)
    }

    pub fn set_cache_key(&mut self, kind: CacheKeyKind, key: impl Into<String>) {
        self.cache_keys.insert(kind, key.into());
    }

    pub fn preferred_host(&self, method: &str) -> Option<&str> {
        self.preferred_hosts.get(method).map(String::as_str)
    }

    pub fn set_preferred_host(&mut self, method: impl Into<String>, host: impl Into<String>) {
        self.preferred_hosts.insert(method.into(), host.into());
    }

    pub fn set_profile(&mut self, profile: OwnerProfile) {
        self.profile = profile;
    }

    /// Store a display image for an account.
    ///
    /// When the cache is full, the image with the minimum visit count is
    /// evicted first; the tie-break among equally cold entries is
    /// arbitrary. Returns `false` if the cache is full and no eviction
    /// candidate exists.
    pub fn save_image(&mut self, account: &str, content_hash: &str, image: &[u8]) -> bool {
        let account = normalize_account(account);

        if self.user_tile_slots.contains_key(content_hash) {
            self.image_relationships
                .insert(account, content_hash.to_string());
            return true;
        }

        if self.user_tile_slots.len() >= USER_TILE_CAPACITY && !self.evict_coldest() {
            tracing::warn!(content_hash, "image cache full, nothing evictable");
            return false;
        }

        self.user_tile_slots
            .insert(content_hash.to_string(), image.to_vec());
        self.visit_count.insert(content_hash.to_string(), 0);
        self.image_relationships
            .insert(account, content_hash.to_string());
        true
    }

    /// Fetch the display image stored for an account, counting the visit.
    ///
    /// A relationship pointing at a hash that is no longer cached is stale
    /// and dropped.
    pub fn get_image(&mut self, account: &str) -> Option<Vec<u8>> {
        let account = normalize_account(account);
        let hash = self.image_relationships.get(&account)?.clone();
        if !self.user_tile_slots.contains_key(&hash) {
            self.image_relationships.remove(&account);
            return None;
        }
        self.touch(&hash);
        self.user_tile_slots.get(&hash).cloned()
    }

    /// Number of cached images.
    pub fn image_count(&self) -> usize {
        self.user_tile_slots.len()
    }

    #[doc(hidden)]
    pub fn visit_count_of(&self, content_hash: &str) -> Option<u64> {
        self.visit_count.get(content_hash).copied()
    }

    /// Empty the store, keeping only the schema version. Callers persist
    /// the truncated store immediately (forced, no debounce).
    pub fn truncate(&mut self) {
        let version = self.version.clone();
        *self = Self::default();
        self.version = version;
    }

    /// Remove the image with the minimum visit count along with its
    /// counter and every relationship pointing to it.
    fn evict_coldest(&mut self) -> bool {
        let Some(victim) = self
            .visit_count
            .iter()
            .min_by_key(|(_, count)| **count)
            .map(|(hash, _)| hash.clone())
        else {
            return false;
        };
        self.user_tile_slots.remove(&victim);
        self.visit_count.remove(&victim);
        self.image_relationships.retain(|_, hash| *hash != victim);
        tracing::debug!(content_hash = %victim, "evicted coldest display image");
        true
    }

    /// Count a visit, rescaling all counters when one would overflow.
    ///
    /// The rescale sets every counter to the current mean so relative cold
    /// entries stay cold; it exists to keep long-running sessions from
    /// saturating, not as an aging policy.
    fn touch(&mut self, content_hash: &str) {
        let current = self.visit_count.get(content_hash).copied().unwrap_or(0);
        if current == u64::MAX {
            self.rescale_visits();
        }
        if let Some(count) = self.visit_count.get_mut(content_hash) {
            *count = count.saturating_add(1);
        }
    }

    fn rescale_visits(&mut self) {
        if self.visit_count.is_empty() {
            return;
        }
        let sum: u128 = self.visit_count.values().map(|c| *c as u128).sum();
        let mean = sum / self.visit_count.len() as u128;
        let mean = u64::try_from(mean).unwrap_or(0);
        for count in self.visit_count.values_mut() {
            *count = mean;
        }
        tracing::debug!(mean, "rescaled image visit counters");
    }
}
