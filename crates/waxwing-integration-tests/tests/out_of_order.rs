//! Integration test: merges arriving out of order.
//!
//! Service completions fire from arbitrary transport threads, so nothing
//! guarantees delta arrival order. The timestamp freshness rule, not
//! external sequencing, is what must keep the models consistent: replaying
//! an older delta after a newer one must change nothing.

use waxwing_roster::events;
use waxwing_roster::{AddressBook, RosterEvents};
use waxwing_types::contact::{ContactKind, ServiceKind};
use waxwing_types::member::{ClientKind, MembershipRole};
use waxwing_types::wire::{
    AbPageDelta, ContactDelta, MemberDelta, MembershipDelta, RoleMembers, ServiceDelta,
};
use waxwing_types::AbId;

fn membership(service_ts: u64, role: MembershipRole, passport: &str, member_ts: u64, deleted: bool) -> MembershipDelta {
    MembershipDelta {
        services: vec![ServiceDelta {
            kind: ServiceKind::Messenger,
            last_change: Some(service_ts),
            deleted: false,
            memberships: vec![RoleMembers {
                role,
                members: vec![MemberDelta {
                    passport: Some(passport.to_string()),
                    deleted,
                    last_changed: Some(member_ts),
                    ..Default::default()
                }],
            }],
        }],
        cache_key: None,
    }
}

fn page(ts: u64, contacts: Vec<ContactDelta>) -> AbPageDelta {
    AbPageDelta {
        ab_id: AbId::individual(),
        last_change: Some(ts),
        name: None,
        groups: Vec::new(),
        contacts,
        circles: Vec::new(),
        cache_key: None,
    }
}

fn contact(guid: &str, cid: u64, account: &str, display_name: &str, ts: u64) -> ContactDelta {
    ContactDelta {
        guid: guid.to_string(),
        cid,
        account: account.to_string(),
        kind: ContactKind::Regular,
        client: ClientKind::Passport,
        display_name: display_name.to_string(),
        is_messenger_user: true,
        groups: Vec::new(),
        relationship_state: None,
        circle_role: None,
        deleted: false,
        last_changed: Some(ts),
    }
}

fn snapshot(book: &AddressBook) -> serde_json::Value {
    serde_json::to_value(book).expect("snapshot")
}

#[test]
fn newer_membership_survives_late_older_delta() {
    let mut book = AddressBook::default();
    book.initialize();
    let bus = RosterEvents::default();

    // The newer delta (member deleted) lands first.
    book.merge_membership(
        &membership(200, MembershipRole::Allow, "alice@x.com", 150, true),
        &bus,
    );
    let after_new = snapshot(&book);

    // The older addition completes late; it must not resurrect the member.
    book.merge_membership(
        &membership(100, MembershipRole::Allow, "alice@x.com", 100, false),
        &bus,
    );
    assert_eq!(snapshot(&book), after_new);
}

#[test]
fn older_page_cannot_regress_contact_rename() {
    let mut book = AddressBook::default();
    book.initialize();
    let bus = RosterEvents::default();

    book.merge_individual(
        &page(200, vec![contact("c-1", 7, "alice@x.com", "Alice v2", 180)]),
        &bus,
    );
    let after_new = snapshot(&book);

    book.merge_individual(
        &page(100, vec![contact("c-1", 7, "alice@x.com", "Alice v1", 90)]),
        &bus,
    );
    assert_eq!(snapshot(&book), after_new);
}

#[test]
fn replaying_identical_delta_is_a_no_op() {
    let mut book = AddressBook::default();
    book.initialize();
    let bus = RosterEvents::default();
    let mut rx = bus.subscribe();

    let delta = membership(100, MembershipRole::Pending, "bob@x.com", 90, false);
    book.merge_membership(&delta, &bus);
    let first = snapshot(&book);
    let fired_first = events::drain(&mut rx).len();

    book.merge_membership(&delta, &bus);
    assert_eq!(snapshot(&book), first);
    assert_eq!(events::drain(&mut rx).len(), 0, "replay fired events");
    assert_eq!(fired_first, 1);
}

#[test]
fn interleaved_roles_keep_allow_block_exclusive() {
    let mut book = AddressBook::default();
    book.initialize();
    let bus = RosterEvents::default();

    // Block lands after Allow, then a stale Allow replays.
    book.merge_membership(
        &membership(100, MembershipRole::Allow, "eve@x.com", 100, false),
        &bus,
    );
    book.merge_membership(
        &membership(200, MembershipRole::Block, "eve@x.com", 150, false),
        &bus,
    );
    book.merge_membership(
        &membership(120, MembershipRole::Allow, "eve@x.com", 100, false),
        &bus,
    );

    let in_allow = book
        .role_members(ServiceKind::Messenger, MembershipRole::Allow)
        .map(|m| m.len())
        .unwrap_or(0);
    let in_block = book
        .role_members(ServiceKind::Messenger, MembershipRole::Block)
        .map(|m| m.len())
        .unwrap_or(0);
    assert_eq!((in_allow, in_block), (0, 1));
}
