//! Pinboard: a card-grid synchronization and navigation engine.
//!
//! A pinboard perspective shows a scrollable grid of editable record cards,
//! fetched page by page and kept consistent with a live server-pushed view
//! while the user edits cards in place. This crate is the public surface over
//! [`pinboard_core`]: the engine, the domain model, and the collaborator
//! contracts a host embeds it with.
//!
//! The engine owns three pictures of the same data and keeps them coherent:
//! the paginated fetch window, the locally mutated card set (including
//! not-yet-persisted cards and in-flight edits), and the authoritative pushed
//! snapshots that can arrive out of order or with records removed. Cards are
//! matched across snapshots by a stable identity fingerprint, never by grid
//! position.
#![warn(unreachable_pub)]

pub use pinboard_core::{
    CARD_WIDTH_PX, PAGE_ROWS, page_size_for_width, row_capacity,
    config::{ConfigGateway, ViewConfig, ViewConfigStore},
    engine::GridEngine,
    error::{ErrorClass, ErrorOrigin, InternalError},
    grid::Grid,
    model::{AttributeRow, AttributeValue, Card, CardIdentity, Record},
    navigation::{NavigationChange, NavigationState, QuerySpec, Workspace},
    obs::{EngineCounters, EngineEvent, EngineSink, counters_report, counters_reset_all},
    pagination::{PageRequest, PaginationController, WindowQuery},
    reconcile::ReconcileOutcome,
    selection::{
        Advance, DeferredSelect, NAME_COLUMN, Selection, SelectionController, SelectionState,
        SelectionView, VALUE_COLUMN,
    },
    subscription::{Generation, GenerationCounter, SubscriptionToken},
    traits::{LayoutHandle, PermissionLookup, RecordGateway, Role},
    types::{CardNonce, CollectionId, OrganizationId, ProjectId, RecordId, Ulid},
};

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
///

pub mod prelude {
    pub use pinboard_core::prelude::*;
    pub use pinboard_core::{engine::GridEngine, navigation::Workspace};
}
