//! Integration test: model persistence round-trips through every store
//! encoding.
//!
//! Builds a populated addressbook and deltas model, saves them under each
//! of the four container encodings, reloads, and checks the reloaded model
//! is structurally identical. Also pins the on-disk signature bytes.

use waxwing_mcl::codec::{BlobCodec, NonceLayout};
use waxwing_mcl::serializer::{self, LoadOutcome, SaveOutcome};
use waxwing_mcl::store::{MclOptions, MclRegistry};
use waxwing_roster::deltas::CacheKeyKind;
use waxwing_roster::{AddressBook, Deltas, RosterEvents};
use waxwing_types::circle::{CircleRole, RelationshipState};
use waxwing_types::contact::{ContactKind, ServiceKind};
use waxwing_types::member::{ClientKind, MembershipRole};
use waxwing_types::wire::{
    AbPageDelta, CircleInverseDelta, ContactDelta, MemberDelta, MembershipDelta, RoleMembers,
    ServiceDelta,
};
use waxwing_types::AbId;

const PASSWORD: &str = "correct horse battery staple";

fn populated_addressbook() -> AddressBook {
    let mut book = AddressBook::default();
    book.initialize();
    let bus = RosterEvents::default();

    book.merge_membership(
        &MembershipDelta {
            services: vec![ServiceDelta {
                kind: ServiceKind::Messenger,
                last_change: Some(100),
                deleted: false,
                memberships: vec![
                    RoleMembers {
                        role: MembershipRole::Allow,
                        members: vec![MemberDelta {
                            passport: Some("alice@x.com".into()),
                            last_changed: Some(90),
                            ..Default::default()
                        }],
                    },
                    RoleMembers {
                        role: MembershipRole::Reverse,
                        members: vec![MemberDelta {
                            email: Some("carol@elsewhere.org".into()),
                            last_changed: Some(80),
                            ..Default::default()
                        }],
                    },
                ],
            }],
            cache_key: None,
        },
        &bus,
    );

    book.merge_individual(
        &AbPageDelta {
            ab_id: AbId::individual(),
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
                ab_id: AbId::new("cafe0000-0000-0000-0000-000000000001"),
                role: CircleRole::Admin,
                state: RelationshipState::Accepted,
                hosted_domain: "live.com".into(),
                deleted: false,
                last_changed: Some(90),
            }],
            cache_key: None,
        },
        &bus,
    );

    book
}

fn populated_deltas() -> Deltas {
    let mut deltas = Deltas::default();
    deltas.set_cache_key(CacheKeyKind::Sharing, "sharing-ck");
    deltas.set_preferred_host("ABFindContactsPaged", "by2.contacts.example.com");
    deltas.save_image("alice@x.com", "sha1-aaaa", b"fake-png-bytes");
    deltas
}

fn options(codec: BlobCodec) -> MclOptions {
    MclOptions {
        codec,
        password: Some(PASSWORD.into()),
        nonce_layout: NonceLayout::Random,
        use_cache: false,
    }
}

fn as_json<T: serde::Serialize>(model: &T) -> serde_json::Value {
    serde_json::to_value(model).expect("model to json")
}

#[test]
fn addressbook_roundtrips_under_every_codec() {
    let book = populated_addressbook();
    let expected = as_json(&book);

    for codec in [
        BlobCodec::Plain,
        BlobCodec::Gzip,
        BlobCodec::Sealed,
        BlobCodec::GzipSealed,
    ] {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roster.mcl");
        let registry = MclRegistry::new();

        assert_eq!(
            serializer::save(&registry, &path, options(codec), &book, true),
            SaveOutcome::Written,
            "save under {codec:?}"
        );
        let outcome: LoadOutcome<AddressBook> = serializer::load(&registry, &path, options(codec));
        assert!(outcome.recover_reason().is_none(), "load under {codec:?}");
        assert_eq!(as_json(&outcome.model()), expected, "roundtrip under {codec:?}");
    }
}

#[test]
fn deltas_roundtrip_preserves_image_cache() {
    let deltas = populated_deltas();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("owner.deltas.mcl");
    let registry = MclRegistry::new();

    serializer::save(&registry, &path, options(BlobCodec::GzipSealed), &deltas, true);
    let outcome: LoadOutcome<Deltas> =
        serializer::load(&registry, &path, options(BlobCodec::GzipSealed));
    let mut loaded = outcome.model();

    assert_eq!(loaded.cache_key(CacheKeyKind::Sharing), Some("sharing-ck"));
    assert_eq!(
        loaded.preferred_host("ABFindContactsPaged"),
        Some("by2.contacts.example.com")
    );
    assert_eq!(
        loaded.get_image("alice@x.com").as_deref(),
        Some(b"fake-png-bytes".as_slice())
    );
}

#[test]
fn compressed_sealed_file_carries_mcp_signature() {
    let book = populated_addressbook();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("roster.mcl");
    let registry = MclRegistry::new();

    serializer::save(
        &registry,
        &path,
        options(BlobCodec::GzipSealed),
        &book,
        true,
    );
    let image = std::fs::read(&path).expect("raw file");
    assert_eq!(&image[..3], b"mcp");
}

#[test]
fn tampered_signature_recovers_to_empty_model() {
    let book = populated_addressbook();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("roster.mcl");
    let registry = MclRegistry::new();

    serializer::save(
        &registry,
        &path,
        options(BlobCodec::GzipSealed),
        &book,
        true,
    );

    let mut image = std::fs::read(&path).expect("raw file");
    image[2] ^= 0xFF;
    std::fs::write(&path, &image).expect("write tampered");

    // The corrupted signature demotes the file to plaintext, which no
    // longer parses as a model; the caller gets a usable empty one.
    let outcome: LoadOutcome<AddressBook> =
        serializer::load(&registry, &path, options(BlobCodec::GzipSealed));
    assert!(outcome.recover_reason().is_some());
    let mut model = outcome.model();
    model.initialize();
    assert_eq!(model.contact_count(), 0);
}

#[test]
fn legacy_layout_roundtrips() {
    let book = populated_addressbook();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("roster.mcl");
    let registry = MclRegistry::new();

    let legacy = MclOptions {
        nonce_layout: NonceLayout::LegacyFixed,
        ..options(BlobCodec::Sealed)
    };
    serializer::save(&registry, &path, legacy.clone(), &book, true);
    let outcome: LoadOutcome<AddressBook> = serializer::load(&registry, &path, legacy);
    assert!(outcome.recover_reason().is_none());
    assert_eq!(as_json(&outcome.model()), as_json(&book));
}
