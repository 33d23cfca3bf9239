//! # waxwing-sync
//!
//! The synchronization orchestrator: sequences load-from-disk, membership
//! delta fetch, individual addressbook fetch, per-circle page fetches, and
//! the final save. The directory services themselves are a trait the host
//! implements over its transport; this crate only owns the control flow
//! and the lock discipline around the models.
//!
//! A server-signaled "full sync required" (or a schema version mismatch at
//! load) restarts the whole sequence once from a clean slate; a guard
//! keeps a misbehaving server from looping the restart forever.

pub mod config;

use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use waxwing_mcl::serializer::{self, LoadOutcome, Persistable, RecoverReason, SaveOutcome};
use waxwing_mcl::store::MclRegistry;
use waxwing_roster::deltas::CacheKeyKind;
use waxwing_roster::{AddressBook, Deltas, RosterEvents};
use waxwing_types::wire::{AbPageDelta, MembershipDelta};
use waxwing_types::AbId;

pub use config::SyncConfig;

/// Error types for directory service calls.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The server demands a full re-synchronization from scratch.
    #[error("full sync required")]
    FullSyncRequired,

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Error types for a synchronization run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The server kept demanding full syncs after a clean-slate retry.
    #[error("full sync loop: server demanded another resync after a clean retry")]
    ResyncLoop,

    #[error("service unavailable: {0}")]
    Service(String),
}

/// The fetch half of the addressbook and sharing services.
///
/// Implementations run each call over their own transport; completions may
/// arrive on any task. The synchronizer serializes merges itself, so
/// implementations need no locking of their own.
pub trait DirectoryService {
    /// Fetch the membership delta since the given continuation key.
    fn fetch_membership(
        &mut self,
        cache_key: Option<&str>,
    ) -> impl std::future::Future<Output = Result<MembershipDelta, ServiceError>> + Send;

    /// Fetch an addressbook page, incrementally when `since` is given.
    fn fetch_addressbook(
        &mut self,
        ab_id: &AbId,
        since: Option<u64>,
    ) -> impl std::future::Future<Output = Result<AbPageDelta, ServiceError>> + Send;
}

/// What loading the persisted models found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub addressbook_recovered: Option<RecoverReason>,
    pub deltas_recovered: Option<RecoverReason>,
    /// A stored model carried an incompatible schema version and was
    /// replaced with an empty one (forcing a de-facto full sync).
    pub version_reset: bool,
}

/// Summary of one synchronization run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// The run restarted from a clean slate at least once.
    pub resynced: bool,
    /// Circle pages fetched and merged this run.
    pub circle_pages: usize,
}

/// Owns the roster models, their persistence, and the sync sequence.
///
/// Both models live behind one reader/writer lock each, held for the
/// duration of every merge or save call; service completions may run on
/// any thread.
pub struct Synchronizer {
    config: SyncConfig,
    account: String,
    registry: MclRegistry,
    events: RosterEvents,
    addressbook: RwLock<AddressBook>,
    deltas: RwLock<Deltas>,
    loaded: Mutex<bool>,
}

impl Synchronizer {
    pub fn new(config: SyncConfig, account: impl Into<String>, events: RosterEvents) -> Self {
        Self {
            config,
            account: account.into(),
            registry: MclRegistry::new(),
            events,
            addressbook: RwLock::new(AddressBook::default()),
            deltas: RwLock::new(Deltas::default()),
            loaded: Mutex::new(false),
        }
    }

    pub fn events(&self) -> &RosterEvents {
        &self.events
    }

    pub fn addressbook(&self) -> &RwLock<AddressBook> {
        &self.addressbook
    }

    pub fn deltas(&self) -> &RwLock<Deltas> {
        &self.deltas
    }

    /// Hydrate both models from disk. One-time; later calls are no-ops.
    ///
    /// Missing or unreadable files recover to empty models (first run and
    /// corruption look the same downstream, the report says which). A
    /// version tag other than the current one discards the stored model.
    pub fn load(&self) -> LoadReport {
        let mut loaded = lock(&self.loaded);
        if *loaded {
            return LoadReport::default();
        }
        *loaded = true;

        let mut report = LoadReport::default();
        let options = self.config.store_options();

        let outcome: LoadOutcome<AddressBook> = serializer::load(
            &self.registry,
            &self.config.addressbook_path(&self.account),
            options.clone(),
        );
        report.addressbook_recovered = outcome.recover_reason();
        let mut book = outcome.model();
        if book.version() != AddressBook::MODEL_VERSION {
            tracing::warn!(
                found = book.version(),
                expected = AddressBook::MODEL_VERSION,
                "addressbook schema version mismatch, starting empty"
            );
            book = AddressBook::default();
            report.version_reset = true;
        }
        book.initialize();
        *write(&self.addressbook) = book;

        let outcome: LoadOutcome<Deltas> = serializer::load(
            &self.registry,
            &self.config.deltas_path(&self.account),
            options,
        );
        report.deltas_recovered = outcome.recover_reason();
        let mut deltas = outcome.model();
        if deltas.version() != Deltas::MODEL_VERSION {
            tracing::warn!(
                found = deltas.version(),
                expected = Deltas::MODEL_VERSION,
                "deltas schema version mismatch, starting empty"
            );
            deltas = Deltas::default();
            report.version_reset = true;
        }
        *write(&self.deltas) = deltas;

        report
    }

    /// Run one full synchronization pass.
    ///
    /// Sequence: membership delta, individual addressbook page, one page
    /// per circle that needs materializing, then persist. On a
    /// [`ServiceError::FullSyncRequired`] the models are discarded and the
    /// sequence reruns once.
    pub async fn synchronize<S: DirectoryService>(
        &self,
        service: &mut S,
    ) -> Result<SyncReport, SyncError> {
        self.load();

        let mut resynced = false;
        for attempt in 0..2 {
            match self.run_cycle(service).await {
                Ok(circle_pages) => {
                    self.save_addressbook(true);
                    write(&self.deltas).truncate();
                    self.save_deltas(true);
                    return Ok(SyncReport {
                        resynced,
                        circle_pages,
                    });
                }
                Err(ServiceError::FullSyncRequired) if attempt == 0 => {
                    tracing::warn!("server demanded a full sync, restarting from a clean slate");
                    write(&self.addressbook).reset();
                    write(&self.deltas).truncate();
                    resynced = true;
                }
                Err(ServiceError::FullSyncRequired) => return Err(SyncError::ResyncLoop),
                Err(ServiceError::Unavailable(message)) => {
                    return Err(SyncError::Service(message))
                }
            }
        }
        Err(SyncError::ResyncLoop)
    }

    async fn run_cycle<S: DirectoryService>(&self, service: &mut S) -> Result<usize, ServiceError> {
        let sharing_key = read(&self.deltas)
            .cache_key(CacheKeyKind::Sharing)
            .map(str::to_string);
        let membership = service.fetch_membership(sharing_key.as_deref()).await?;
        write(&self.addressbook).merge_membership(&membership, &self.events);
        if let Some(key) = membership.cache_key {
            write(&self.deltas).set_cache_key(CacheKeyKind::Sharing, key);
        }

        let individual = AbId::individual();
        let since = read(&self.addressbook)
            .ab_info(&individual)
            .map(|info| info.last_change);
        let page = service.fetch_addressbook(&individual, since).await?;
        write(&self.addressbook).merge_individual(&page, &self.events);
        if let Some(key) = page.cache_key {
            write(&self.deltas).set_cache_key(CacheKeyKind::AddressBook, key);
        }

        let needed = read(&self.addressbook).circles_needing_page();
        let mut circle_pages = 0;
        for ab_id in needed {
            let since = read(&self.addressbook)
                .ab_info(&ab_id)
                .map(|info| info.last_change);
            let page = service.fetch_addressbook(&ab_id, since).await?;
            write(&self.addressbook).merge_group(&page, &self.events);
            circle_pages += 1;
        }
        Ok(circle_pages)
    }

    /// Persist the addressbook model.
    pub fn save_addressbook(&self, force: bool) -> SaveOutcome {
        let book = read(&self.addressbook);
        serializer::save(
            &self.registry,
            &self.config.addressbook_path(&self.account),
            self.config.store_options(),
            &*book,
            force,
        )
    }

    /// Persist the deltas model. `immediate` bypasses the write debounce.
    pub fn save_deltas(&self, immediate: bool) -> SaveOutcome {
        let deltas = read(&self.deltas);
        serializer::save(
            &self.registry,
            &self.config.deltas_path(&self.account),
            self.config.store_options(),
            &*deltas,
            immediate,
        )
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waxwing_types::contact::{ContactKind, ServiceKind};
    use waxwing_types::member::{ClientKind, MembershipRole};
    use waxwing_types::wire::{CircleInverseDelta, ContactDelta, MemberDelta, RoleMembers, ServiceDelta};
    use waxwing_types::circle::{CircleRole, RelationshipState};

    const CIRCLE_AB: &str = "cafe0000-0000-0000-0000-000000000001";

    /// Scripted directory service: a fixed snapshot, optionally demanding
    /// one full sync first.
    struct ScriptedService {
        demand_full_syncs: usize,
        membership_fetches: usize,
        page_fetches: usize,
    }

    impl ScriptedService {
        fn new(demand_full_syncs: usize) -> Self {
            Self {
                demand_full_syncs,
                membership_fetches: 0,
                page_fetches: 0,
            }
        }
    }

    impl DirectoryService for ScriptedService {
        async fn fetch_membership(
            &mut self,
            _cache_key: Option<&str>,
        ) -> Result<MembershipDelta, ServiceError> {
            if self.demand_full_syncs > 0 {
                self.demand_full_syncs -= 1;
                return Err(ServiceError::FullSyncRequired);
            }
            self.membership_fetches += 1;
            Ok(MembershipDelta {
                services: vec![ServiceDelta {
                    kind: ServiceKind::Messenger,
                    last_change: Some(100),
                    deleted: false,
                    memberships: vec![RoleMembers {
                        role: MembershipRole::Allow,
                        members: vec![MemberDelta {
                            passport: Some("alice@x.com".into()),
                            last_changed: Some(90),
                            ..Default::default()
                        }],
                    }],
                }],
                cache_key: Some("sharing-ck-1".into()),
            })
        }

        async fn fetch_addressbook(
            &mut self,
            ab_id: &AbId,
            _since: Option<u64>,
        ) -> Result<AbPageDelta, ServiceError> {
            self.page_fetches += 1;
            if ab_id.is_individual() {
                Ok(AbPageDelta {
                    ab_id: ab_id.clone(),
                    last_change: Some(100),
                    name: None,
                    groups: Vec::new(),
                    contacts: vec![ContactDelta {
                        guid: "c-1".into(),
                        cid: 7,
                        account: "alice@x.com".into(),
                        kind: ContactKind::Regular,
                        client: ClientKind::Passport,
                        display_name: "Alice".into(),
                        is_messenger_user: true,
                        groups: Vec::new(),
                        relationship_state: None,
                        circle_role: None,
                        deleted: false,
                        last_changed: Some(90),
                    }],
                    circles: vec![CircleInverseDelta {
                        ab_id: AbId::new(CIRCLE_AB),
                        role: CircleRole::Member,
                        state: RelationshipState::Accepted,
                        hosted_domain: "live.com".into(),
                        deleted: false,
                        last_changed: Some(90),
                    }],
                    cache_key: Some("ab-ck-1".into()),
                })
            } else {
                Ok(AbPageDelta {
                    ab_id: ab_id.clone(),
                    last_change: Some(100),
                    name: Some("chess club".into()),
                    groups: Vec::new(),
                    contacts: vec![
                        ContactDelta {
                            guid: "me".into(),
                            cid: 1,
                            account: "owner@x.com".into(),
                            kind: ContactKind::Me,
                            client: ClientKind::Passport,
                            display_name: "Owner".into(),
                            is_messenger_user: true,
                            groups: Vec::new(),
                            relationship_state: None,
                            circle_role: Some(CircleRole::Member),
                            deleted: false,
                            last_changed: Some(90),
                        },
                        ContactDelta {
                            guid: "m-1".into(),
                            cid: 8,
                            account: "bob@x.com".into(),
                            kind: ContactKind::Regular,
                            client: ClientKind::Passport,
                            display_name: "Bob".into(),
                            is_messenger_user: true,
                            groups: Vec::new(),
                            relationship_state: None,
                            circle_role: None,
                            deleted: false,
                            last_changed: Some(90),
                        },
                    ],
                    circles: Vec::new(),
                    cache_key: None,
                })
            }
        }
    }

    fn synchronizer(dir: &std::path::Path) -> Synchronizer {
        let config = SyncConfig {
            data_dir: dir.to_string_lossy().into_owned(),
            password: Some("hunter2".into()),
            ..Default::default()
        };
        Synchronizer::new(config, "owner@x.com", RosterEvents::default())
    }

    #[tokio::test]
    async fn test_full_cycle_materializes_circle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = synchronizer(dir.path());
        let mut service = ScriptedService::new(0);

        let report = sync.synchronize(&mut service).await.expect("sync");
        assert!(!report.resynced);
        assert_eq!(report.circle_pages, 1);
        // Individual page plus one circle page.
        assert_eq!(service.page_fetches, 2);

        let book = sync.addressbook().read().expect("read lock");
        assert_eq!(book.circles().len(), 1);
        assert!(book
            .role_members(ServiceKind::Messenger, MembershipRole::Allow)
            .is_some_and(|members| members.len() == 1));
    }

    #[tokio::test]
    async fn test_cache_key_stored_before_truncate_clears_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = synchronizer(dir.path());
        let mut service = ScriptedService::new(0);

        sync.synchronize(&mut service).await.expect("sync");
        // The post-save truncate sheds the transient sync state.
        let deltas = sync.deltas().read().expect("read lock");
        assert!(deltas.cache_key(CacheKeyKind::Sharing).is_none());
    }

    #[tokio::test]
    async fn test_full_sync_signal_retries_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = synchronizer(dir.path());
        let mut service = ScriptedService::new(1);

        let report = sync.synchronize(&mut service).await.expect("sync");
        assert!(report.resynced);
        assert_eq!(service.membership_fetches, 1);
        let book = sync.addressbook().read().expect("read lock");
        assert_eq!(book.circles().len(), 1);
    }

    #[tokio::test]
    async fn test_resync_loop_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = synchronizer(dir.path());
        let mut service = ScriptedService::new(5);

        let result = sync.synchronize(&mut service).await;
        assert!(matches!(result, Err(SyncError::ResyncLoop)));
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let sync = synchronizer(dir.path());
            let mut service = ScriptedService::new(0);
            sync.synchronize(&mut service).await.expect("sync");
        }

        // A fresh synchronizer (new process) loads the saved addressbook.
        let sync = synchronizer(dir.path());
        let report = sync.load();
        assert!(report.addressbook_recovered.is_none());
        assert!(!report.version_reset);
        let book = sync.addressbook().read().expect("read lock");
        assert_eq!(book.circles().len(), 1);
        assert_eq!(book.contact_count(), 3);
    }
}
