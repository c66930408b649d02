//! Collaborator contracts consumed by the engine.
//!
//! The engine owns no transport, rendering, or permission logic; everything
//! it needs from the outside world comes through these seams. All gateway
//! calls are dispatch-only — results are observed through the pushed
//! snapshots that feed the reconciler, never through a return channel.

use crate::{
    error::InternalError,
    model::{CardIdentity, Record},
    pagination::WindowQuery,
    subscription::SubscriptionToken,
    types::{CollectionId, RecordId},
};
use std::collections::BTreeSet;

///
/// Role
///
/// Role strings a user holds on a collection, consumed read-only to gate
/// create/edit affordances.
///

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Role {
    Read,
    Write,
    Manage,
}

///
/// RecordGateway
///
/// Query execution and record persistence. `fetch` installs/refreshes the
/// push subscription for a window; create/update/delete are asynchronous and
/// acknowledged through the same push mechanism.
///

pub trait RecordGateway {
    /// Issue a read for the given window. Snapshots arrive via push.
    fn fetch(&mut self, query: &WindowQuery) -> Result<(), InternalError>;

    /// Move the push subscription to a (cumulative) window. Snapshots for it
    /// must carry `token` back so superseded epochs can be discarded.
    fn subscribe(
        &mut self,
        query: &WindowQuery,
        token: SubscriptionToken,
    ) -> Result<(), InternalError>;

    /// Ask the transport to create the record; an identifier is assigned on
    /// acknowledgement.
    fn create(&mut self, record: &Record) -> Result<(), InternalError>;

    fn update(&mut self, id: RecordId, record: &Record) -> Result<(), InternalError>;

    /// Request user-confirmed deletion of a persisted record.
    fn delete_confirm(&mut self, collection: CollectionId, id: RecordId)
        -> Result<(), InternalError>;

    /// Flip the record's favorite flag.
    fn toggle_favorite(&mut self, id: RecordId, record: &Record) -> Result<(), InternalError>;
}

///
/// LayoutHandle
///
/// The packing layout's node registry. Called exactly once per card
/// creation/destruction; implementations must stay idempotent when invoked
/// during teardown.
///

pub trait LayoutHandle {
    fn add_node(&mut self, identity: CardIdentity);
    fn remove_node(&mut self, identity: CardIdentity);
}

///
/// PermissionLookup
///
/// Roles the current user holds per collection. Never mutated by the engine.
///

pub trait PermissionLookup {
    fn roles(&self, collection: CollectionId) -> BTreeSet<Role>;
}
