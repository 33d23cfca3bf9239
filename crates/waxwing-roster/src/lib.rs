//! # waxwing-roster
//!
//! The local mirror of a user's contact directory and the merge engine that
//! keeps it consistent: membership lists per service, addressbook pages
//! (the individual page plus one per circle), groups, circle relationship
//! records, and the small deltas store of synchronization aids.
//!
//! Server-pushed deltas flow one way into the models through the merge
//! operations; mutations become visible to the rest of the system only as
//! [`events::RosterEvent`]s. Conflict resolution everywhere is by
//! last-change timestamp: an incoming record that is not strictly newer
//! than the stored one loses, which is what makes merging safe when
//! service callbacks complete out of order.
//!
//! ## Modules
//!
//! - [`addressbook`] — the persisted directory model and derived indices.
//! - [`membership`] — membership (privacy list) delta merge.
//! - [`pages`] — addressbook page merge for the individual page.
//! - [`circles`] — circle lifecycle: inverse connections, page merge,
//!   materialization.
//! - [`deltas`] — cache keys, preferred hosts, user-tile image cache,
//!   owner profile snapshot.
//! - [`events`] — the typed notification bus.
//!
//! ## Locking
//!
//! The models take `&mut self` and contain no interior locks. Callers that
//! share a model across service callbacks wrap it in one reader/writer
//! lock and hold it for the duration of each merge or save call.

pub mod addressbook;
pub mod circles;
pub mod deltas;
pub mod events;
pub mod membership;
pub mod pages;

pub use addressbook::AddressBook;
pub use deltas::Deltas;
pub use events::{RosterEvent, RosterEvents};
