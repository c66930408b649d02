use crate::{
    config::{ConfigGateway, ViewConfig, ViewConfigStore},
    error::{ErrorClass, ErrorOrigin, InternalError},
    grid::Grid,
    model::{AttributeRow, Card, CardIdentity, Record},
    navigation::{NavigationChange, NavigationState, QuerySpec, Workspace},
    obs::sink::{self, EngineEvent, EngineSink, with_engine_sink},
    pagination::{PaginationController, WindowQuery},
    reconcile::{self, ReconcileOutcome},
    selection::{Advance, DeferredSelect, NAME_COLUMN, SelectionController, SelectionState, SelectionView},
    subscription::{GenerationCounter, SubscriptionToken},
    traits::{LayoutHandle, PermissionLookup, RecordGateway, Role},
    types::{CollectionId, RecordId},
};
use std::collections::{BTreeMap, BTreeSet};

///
/// GridEngine
///
/// The per-perspective composition root: owns the grid, the selection state
/// machine, the pagination controller and the view-configuration store, and
/// wires them to the transport/layout/permission collaborators.
///
/// Single-threaded and cooperative: every mutation happens in reaction to one
/// discrete event (navigation update, pushed snapshot, keyboard input, blur)
/// and runs to completion before the next one. Stale subscription callbacks
/// are fenced off with the generation counter, not locks.
///

pub struct GridEngine<G, C, L, P>
where
    G: RecordGateway,
    C: ConfigGateway,
    L: LayoutHandle,
    P: PermissionLookup,
{
    grid: Grid,
    selection: SelectionController,
    pagination: PaginationController,
    config: ViewConfigStore<C>,
    navigation: NavigationState,
    generations: GenerationCounter,

    gateway: G,
    layout: L,
    permissions: P,

    collection_roles: BTreeMap<CollectionId, BTreeSet<Role>>,
    sink: Option<&'static dyn EngineSink>,
    torn_down: bool,
}

impl<G, C, L, P> GridEngine<G, C, L, P>
where
    G: RecordGateway,
    C: ConfigGateway,
    L: LayoutHandle,
    P: PermissionLookup,
{
    #[must_use]
    pub fn new(gateway: G, config_gateway: C, layout: L, permissions: P, page_size: u32) -> Self {
        Self {
            grid: Grid::new(),
            selection: SelectionController::new(),
            pagination: PaginationController::new(page_size),
            config: ViewConfigStore::new(config_gateway),
            navigation: NavigationState::new(),
            generations: GenerationCounter::new(),
            gateway,
            layout,
            permissions,
            collection_roles: BTreeMap::new(),
            sink: None,
            torn_down: false,
        }
    }

    /// Route this engine's telemetry through a scoped sink.
    #[must_use]
    pub fn with_sink(mut self, sink: &'static dyn EngineSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run `f` under this engine's sink override, if one is installed.
    fn scoped<T>(sink: Option<&'static dyn EngineSink>, f: impl FnOnce() -> T) -> T {
        if let Some(sink) = sink {
            with_engine_sink(sink, f)
        } else {
            f()
        }
    }

    // ------------------------------------------------------------------
    // Read-only surface
    // ------------------------------------------------------------------

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        self.grid.cards()
    }

    #[must_use]
    pub fn selection(&self) -> Option<SelectionView> {
        self.selection.view()
    }

    #[must_use]
    pub fn selection_state(&self) -> SelectionState {
        self.selection.state()
    }

    #[must_use]
    pub fn subscription_token(&self) -> SubscriptionToken {
        self.generations.token()
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.pagination.is_exhausted()
    }

    #[must_use]
    pub const fn view_config(&self) -> Option<&ViewConfig> {
        self.config.config()
    }

    /// Roles the current user holds on a card's collection.
    #[must_use]
    pub fn collection_roles(&self, card: &Card) -> BTreeSet<Role> {
        self.collection_roles
            .get(&card.record.collection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Creation is offered only for a single-collection query on which the
    /// user holds the write role.
    #[must_use]
    pub fn has_create_rights(&self) -> bool {
        self.single_collection().is_some_and(|collection| {
            self.collection_roles
                .get(&collection)
                .is_some_and(|roles| roles.contains(&Role::Write))
        })
    }

    fn single_collection(&self) -> Option<CollectionId> {
        let query = self.navigation.query()?;
        match query.collections.as_slice() {
            [collection] => Some(*collection),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Navigation and pagination
    // ------------------------------------------------------------------

    /// Apply a navigation update. A changed query or workspace is a
    /// structural reset; a valid navigation immediately starts loading,
    /// seeding the window from the persisted loaded-count when one exists.
    pub fn set_navigation(
        &mut self,
        workspace: Workspace,
        query: QuerySpec,
    ) -> Result<(), InternalError> {
        self.ensure_live()?;

        let change = self.navigation.apply(workspace, query);
        if change == NavigationChange::StructuralReset {
            self.structural_reset();
        }

        if !self.navigation.is_valid() {
            // Fetches stay suppressed until both workspace halves exist.
            return Ok(());
        }

        self.refresh_roles();

        if change == NavigationChange::StructuralReset {
            let loaded = self.config.config().map_or(0, |config| config.loaded_count);
            let spec = self.navigation.query().cloned().unwrap_or_default();

            let request = Self::scoped(self.sink, || {
                if loaded > 0 {
                    self.pagination.seed_from_loaded_count(&spec, loaded)
                } else {
                    self.pagination.request_next_page(&spec)
                }
            });
            if let Some(request) = request {
                self.dispatch_fetch(&request.fetch, &request.subscription, request.loaded_count)?;
            }
        }

        Ok(())
    }

    /// Scroll crossed the near-bottom threshold: try to load another page.
    ///
    /// No-op while a fetch is in flight, after exhaustion, or while the
    /// navigation is invalid.
    pub fn notify_scroll_near_bottom(&mut self) -> Result<(), InternalError> {
        self.ensure_live()?;

        if !self.navigation.is_valid() {
            return Ok(());
        }

        let spec = self.navigation.query().cloned().unwrap_or_default();
        let request = Self::scoped(self.sink, || self.pagination.request_next_page(&spec));
        if let Some(request) = request {
            self.dispatch_fetch(&request.fetch, &request.subscription, request.loaded_count)?;
        }

        Ok(())
    }

    fn dispatch_fetch(
        &mut self,
        fetch: &WindowQuery,
        subscription: &WindowQuery,
        loaded_count: u32,
    ) -> Result<(), InternalError> {
        self.gateway.fetch(fetch)?;
        self.gateway.subscribe(subscription, self.generations.token())?;

        Self::scoped(self.sink, || {
            self.config.increase_document_count(loaded_count)
        })
    }

    /// Drop all state tied to the previous query/workspace. Pending
    /// subscription callbacks die at the generation fence.
    fn structural_reset(&mut self) {
        self.generations.bump();

        for card in self.grid.cards() {
            self.layout.remove_node(card.identity());
        }
        self.grid.clear();
        self.selection.clear();
        self.pagination.reset();
    }

    fn refresh_roles(&mut self) {
        self.collection_roles = self
            .navigation
            .query()
            .map(|query| {
                query
                    .collections
                    .iter()
                    .map(|&collection| (collection, self.permissions.roles(collection)))
                    .collect()
            })
            .unwrap_or_default();
    }

    // ------------------------------------------------------------------
    // Authoritative snapshots
    // ------------------------------------------------------------------

    /// Apply one pushed snapshot of the cumulative window.
    ///
    /// Snapshots from a superseded generation (a structural reset or
    /// teardown happened after the subscribe) are discarded. Grid mutations
    /// run to completion before the selection is re-validated.
    pub fn apply_snapshot(
        &mut self,
        token: SubscriptionToken,
        records: Vec<Record>,
    ) -> ReconcileOutcome {
        if self.torn_down || !token.is_current(&self.generations) {
            Self::scoped(self.sink, || {
                sink::record(EngineEvent::StaleBatchDropped {
                    generation: token.generation().as_u64(),
                });
            });
            return ReconcileOutcome::default();
        }
        if !self.navigation.is_valid() {
            return ReconcileOutcome::default();
        }

        let initial_load = self.grid.is_empty();

        let incoming: Vec<Card> = records
            .into_iter()
            .map(|record| {
                let mut card = Card::from_record(record);
                card.order = self.seeded_order(&card);
                card
            })
            .collect();
        let batch_len = incoming.len();

        let outcome = Self::scoped(self.sink, || {
            let outcome = reconcile::merge(&mut self.grid, incoming);
            self.pagination.note_batch(batch_len);
            outcome
        });

        for &identity in &outcome.appended {
            self.layout.add_node(identity);
        }
        for &identity in &outcome.removed {
            self.layout.remove_node(identity);
        }

        if initial_load {
            // First window of a perspective: honor the persisted ordering,
            // then collapse the keys to dense positions.
            self.grid.sort_by_order();
            self.normalize_orders();
        } else {
            for &identity in &outcome.appended {
                if let Some(position) = self.grid.position_of(identity) {
                    if let Some(card) = self.grid.card_mut(position) {
                        card.order = position as i64;
                    }
                }
            }
        }

        // Mutations first, then the cursor: clamp to the new shape before
        // any deferred move runs.
        let row_counts = self.row_counts();
        self.selection.clamp(&row_counts);

        outcome
    }

    fn seeded_order(&self, card: &Card) -> i64 {
        // Cards outside the persisted mapping sort after every ordered card.
        card.record
            .id
            .and_then(|id| self.config.config().and_then(|config| config.order_for(id)))
            .unwrap_or(i64::MAX)
    }

    fn normalize_orders(&mut self) {
        for index in 0..self.grid.len() {
            if let Some(card) = self.grid.card_mut(index) {
                card.order = index as i64;
            }
        }
    }

    // ------------------------------------------------------------------
    // View configuration
    // ------------------------------------------------------------------

    /// Feed one pushed view-configuration snapshot through the suppression
    /// filter; a surfaced change re-seeds card ordering.
    pub fn observe_config(&mut self, snapshot: Option<ViewConfig>) {
        if self.torn_down {
            return;
        }

        let Some(config) = self.config.observe(snapshot).cloned() else {
            return;
        };

        for index in 0..self.grid.len() {
            if let Some(card) = self.grid.card_mut(index) {
                if let Some(order) = card.record.id.and_then(|id| config.order_for(id)) {
                    card.order = order;
                }
            }
        }
        self.grid.sort_by_order();

        let row_counts = self.row_counts();
        self.selection.clamp(&row_counts);
    }

    /// Persist the grid's current ordering.
    pub fn update_view_order(&mut self) -> Result<(), InternalError> {
        self.ensure_live()?;

        Self::scoped(self.sink, || self.config.change_card_order(self.grid.cards()))
    }

    // ------------------------------------------------------------------
    // Selection and input
    // ------------------------------------------------------------------

    /// Arrow/Tab/Enter pressed: create the selection lazily.
    pub fn handle_navigation_key(&mut self) {
        let row_counts = self.row_counts();
        self.selection.initialize_if_needed(&row_counts);
    }

    /// Click on a cell of a card; the second activation of the same cell
    /// opens edit mode.
    pub fn click(&mut self, card: usize, column: usize, row: usize) {
        let row_counts = self.row_counts();
        self.selection.click(card, column, row, &row_counts);
    }

    /// Advance the cursor; past the last card a fresh card is appended when
    /// the user may create one.
    pub fn select_next(&mut self) -> Result<(), InternalError> {
        self.ensure_live()?;

        let row_counts = self.row_counts();
        match self.selection.select_next(&row_counts) {
            Advance::Moved => Ok(()),
            Advance::NewCardSlot => self.append_new_card_slot(),
        }
    }

    fn append_new_card_slot(&mut self) -> Result<(), InternalError> {
        if !self.has_create_rights() {
            return Ok(());
        }
        let Some(collection) = self.single_collection() else {
            return Ok(());
        };

        let card = Card::from_record(Record::new(collection));
        let identity = card.identity();
        self.grid.push_back(card);
        self.layout.add_node(identity);

        let row_counts = self.row_counts();
        let last = self.grid.len() - 1;
        self.selection.select(last, NAME_COLUMN, 0, false, &row_counts);

        Ok(())
    }

    /// Prepend a freshly created card (toolbar path).
    pub fn create_card(&mut self, record: Record) -> Result<(), InternalError> {
        self.ensure_live()?;

        if !self.has_create_rights() {
            return Err(InternalError::unsupported(
                ErrorOrigin::Grid,
                "no create rights on the current collection",
            ));
        }

        let card = Card::from_record(record);
        let identity = card.identity();
        if self.grid.push_front(card) {
            self.layout.add_node(identity);
        }

        Ok(())
    }

    /// Run deferred selection moves now that the visual tree has settled.
    pub fn settle(&mut self) {
        let row_counts = self.row_counts();
        self.selection.settle(&row_counts);
    }

    // ------------------------------------------------------------------
    // Attribute editing
    // ------------------------------------------------------------------

    /// Confirm the new-attribute placeholder as a real row and defer
    /// selecting its value cell.
    pub fn create_attribute_row(
        &mut self,
        card: usize,
        name: impl Into<String>,
    ) -> Result<(), InternalError> {
        self.ensure_live()?;

        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }

        let card_ref = self.card_mut(card)?;
        if card_ref.rows().iter().any(|row| row.name == name) {
            return Err(InternalError::new(
                ErrorClass::Conflict,
                ErrorOrigin::Grid,
                format!("duplicate attribute name: {name}"),
            ));
        }

        card_ref.push_row(AttributeRow::new(name, "".into()));
        card_ref.stage_changes();

        self.selection.defer(DeferredSelect::LastRowValue { card });

        Ok(())
    }

    /// Rename an attribute row; an emptied name removes the row and defers
    /// selecting the row above.
    pub fn update_attribute_name(
        &mut self,
        card: usize,
        row: usize,
        name: impl Into<String>,
    ) -> Result<(), InternalError> {
        self.ensure_live()?;

        let name = name.into();
        let trimmed = name.trim().to_owned();

        let card_ref = self.card_mut(card)?;
        if trimmed.is_empty() {
            if card_ref.remove_row(row).is_some() {
                card_ref.stage_changes();
                self.selection.defer(DeferredSelect::RowAbove);
            }
            return Ok(());
        }

        let Some(row_ref) = card_ref.row_mut(row) else {
            return Err(InternalError::not_found(ErrorOrigin::Grid, "attribute row"));
        };
        row_ref.previous_name = row_ref.name.clone();
        row_ref.name = trimmed;
        card_ref.stage_changes();

        Ok(())
    }

    pub fn update_attribute_value(
        &mut self,
        card: usize,
        row: usize,
        value: impl Into<String>,
    ) -> Result<(), InternalError> {
        self.ensure_live()?;

        let value = value.into();
        let trimmed = value.trim().to_owned();

        let card_ref = self.card_mut(card)?;
        let Some(row_ref) = card_ref.row_mut(row) else {
            return Err(InternalError::not_found(ErrorOrigin::Grid, "attribute row"));
        };
        row_ref.value = trimmed.as_str().into();
        card_ref.stage_changes();

        Ok(())
    }

    /// Clear the value of a row, keeping the row.
    pub fn remove_value(&mut self, card: usize, row: usize) -> Result<(), InternalError> {
        self.update_attribute_value(card, row, "")
    }

    // ------------------------------------------------------------------
    // Commit lifecycle
    // ------------------------------------------------------------------

    /// Focus left a card: deletion suggestion first, otherwise commit staged
    /// changes. Edit mode ends either way.
    pub fn focus_out(&mut self, card: usize) -> Result<(), InternalError> {
        self.ensure_live()?;
        self.selection.exit_edit_mode();

        let (suggest_deletion, unpersisted_empty) = {
            let card_ref = self.card_ref(card)?;
            (
                card_ref.should_suggest_deletion(),
                !card_ref.initialized && card_ref.has_no_attributes(),
            )
        };

        if suggest_deletion {
            return self.confirm_deletion(card);
        }
        if unpersisted_empty {
            // Never persisted and empty: nothing to confirm, just drop it.
            return self.discard(card);
        }

        if self.card_mut(card)?.take_changed() {
            return self.commit_card_edit(card);
        }

        Ok(())
    }

    /// Dispatch the card's pending create/update. A card in its untouched
    /// initial state produces no commit; a card already mid-commit is not
    /// dispatched twice.
    pub fn commit_card_edit(&mut self, card: usize) -> Result<(), InternalError> {
        self.ensure_live()?;

        let (skip, initialized, identity, record) = {
            let card_ref = self.card_ref(card)?;
            (
                card_ref.in_initial_state() || card_ref.committing,
                card_ref.initialized,
                card_ref.identity(),
                card_ref.record.clone(),
            )
        };
        if skip {
            return Ok(());
        }

        self.card_mut(card)?.committing = true;

        let result = if initialized {
            match record.id {
                Some(id) => self.gateway.update(id, &record),
                None => Err(InternalError::not_found(ErrorOrigin::Grid, "record id")),
            }
        } else {
            self.gateway.create(&record)
        };

        if let Err(err) = result {
            // Clear the flag so the user can retry the same card.
            self.fail_commit(identity);
            return Err(err);
        }

        Ok(())
    }

    /// Transport acknowledged a create: adopt the assigned identifier. The
    /// card's identity migrates, so the layout node is re-keyed.
    pub fn complete_create(
        &mut self,
        identity: CardIdentity,
        id: RecordId,
    ) -> Result<(), InternalError> {
        self.ensure_live()?;

        let Some(card) = self.grid.by_identity_mut(identity) else {
            return Err(InternalError::not_found(ErrorOrigin::Grid, "card"));
        };
        card.complete_create(id);
        let new_identity = card.identity();

        self.layout.remove_node(identity);
        self.layout.add_node(new_identity);

        Ok(())
    }

    /// Transport acknowledged an update.
    pub fn complete_update(&mut self, identity: CardIdentity) -> Result<(), InternalError> {
        self.ensure_live()?;

        let Some(card) = self.grid.by_identity_mut(identity) else {
            return Err(InternalError::not_found(ErrorOrigin::Grid, "card"));
        };
        card.committing = false;

        Ok(())
    }

    /// Transport rejected a create/update: clear `committing` so the same
    /// card can be retried. The engine stays fully usable.
    pub fn fail_commit(&mut self, identity: CardIdentity) {
        if let Some(card) = self.grid.by_identity_mut(identity) {
            card.committing = false;
        }
        Self::scoped(self.sink, || {
            sink::record(EngineEvent::CommitFailed { identity });
        });
    }

    /// Ask for deletion of a persisted card, or silently discard an
    /// unpersisted one.
    pub fn confirm_deletion(&mut self, card: usize) -> Result<(), InternalError> {
        self.ensure_live()?;

        let (initialized, collection, id) = {
            let card_ref = self.card_ref(card)?;
            (
                card_ref.initialized,
                card_ref.record.collection_id,
                card_ref.record.id,
            )
        };

        if initialized {
            let id = id.ok_or_else(|| InternalError::not_found(ErrorOrigin::Grid, "record id"))?;
            return self.gateway.delete_confirm(collection, id);
        }

        self.discard(card)
    }

    /// Flip the favorite flag of a card; persisted cards dispatch the toggle.
    pub fn toggle_favorite(&mut self, card: usize) -> Result<(), InternalError> {
        self.ensure_live()?;

        let card_ref = self.card_mut(card)?;
        card_ref.record.favorite = !card_ref.record.favorite;
        let record = card_ref.record.clone();

        match record.id {
            // Unpersisted cards only flip locally; the eventual create
            // carries the flag.
            None => Ok(()),
            Some(id) => self.gateway.toggle_favorite(id, &record),
        }
    }

    /// Remove a local-only card from the grid.
    fn discard(&mut self, card: usize) -> Result<(), InternalError> {
        let identity = self
            .grid
            .card(card)
            .map(Card::identity)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Grid, "card"))?;

        let _ = self.grid.remove(identity);
        self.layout.remove_node(identity);

        let row_counts = self.row_counts();
        self.selection.clamp(&row_counts);

        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Release all subscriptions; no callback may mutate state afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.generations.bump();

        // Layout removal is idempotent during teardown.
        for card in self.grid.cards() {
            self.layout.remove_node(card.identity());
        }
        self.selection.clear();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_live(&self) -> Result<(), InternalError> {
        if self.torn_down {
            return Err(InternalError::unsupported(
                ErrorOrigin::Grid,
                "engine already torn down",
            ));
        }
        Ok(())
    }

    fn row_counts(&self) -> Vec<usize> {
        self.grid.iter().map(Card::row_count).collect()
    }

    fn card_ref(&self, index: usize) -> Result<&Card, InternalError> {
        self.grid
            .card(index)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Grid, "card"))
    }

    fn card_mut(&mut self, index: usize) -> Result<&mut Card, InternalError> {
        self.grid
            .card_mut(index)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Grid, "card"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::AttributeValue,
        types::{OrganizationId, ProjectId},
    };
    use std::{cell::RefCell, rc::Rc};

    ///
    /// Test collaborators
    ///

    #[derive(Debug, Default)]
    struct GatewayLog {
        fetches: Vec<WindowQuery>,
        subscribes: Vec<WindowQuery>,
        creates: Vec<Record>,
        updates: Vec<(RecordId, Record)>,
        delete_confirms: Vec<(CollectionId, RecordId)>,
        favorites: Vec<RecordId>,
        fail_writes: bool,
    }

    #[derive(Clone, Default)]
    struct MockGateway {
        log: Rc<RefCell<GatewayLog>>,
    }

    impl RecordGateway for MockGateway {
        fn fetch(&mut self, query: &WindowQuery) -> Result<(), InternalError> {
            self.log.borrow_mut().fetches.push(query.clone());
            Ok(())
        }

        fn subscribe(
            &mut self,
            query: &WindowQuery,
            _token: SubscriptionToken,
        ) -> Result<(), InternalError> {
            self.log.borrow_mut().subscribes.push(query.clone());
            Ok(())
        }

        fn create(&mut self, record: &Record) -> Result<(), InternalError> {
            let mut log = self.log.borrow_mut();
            if log.fail_writes {
                return Err(InternalError::gateway_failure("create rejected"));
            }
            log.creates.push(record.clone());
            Ok(())
        }

        fn update(&mut self, id: RecordId, record: &Record) -> Result<(), InternalError> {
            let mut log = self.log.borrow_mut();
            if log.fail_writes {
                return Err(InternalError::gateway_failure("update rejected"));
            }
            log.updates.push((id, record.clone()));
            Ok(())
        }

        fn delete_confirm(
            &mut self,
            collection: CollectionId,
            id: RecordId,
        ) -> Result<(), InternalError> {
            self.log.borrow_mut().delete_confirms.push((collection, id));
            Ok(())
        }

        fn toggle_favorite(&mut self, id: RecordId, _record: &Record) -> Result<(), InternalError> {
            self.log.borrow_mut().favorites.push(id);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockConfigGateway {
        writes: Rc<RefCell<Vec<ViewConfig>>>,
    }

    impl ConfigGateway for MockConfigGateway {
        fn persist(&mut self, config: &ViewConfig) -> Result<(), InternalError> {
            self.writes.borrow_mut().push(config.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockLayout {
        adds: Rc<RefCell<Vec<CardIdentity>>>,
        removes: Rc<RefCell<Vec<CardIdentity>>>,
    }

    impl LayoutHandle for MockLayout {
        fn add_node(&mut self, identity: CardIdentity) {
            self.adds.borrow_mut().push(identity);
        }

        fn remove_node(&mut self, identity: CardIdentity) {
            self.removes.borrow_mut().push(identity);
        }
    }

    #[derive(Clone, Default)]
    struct MockPermissions {
        writable: Vec<CollectionId>,
    }

    impl PermissionLookup for MockPermissions {
        fn roles(&self, collection: CollectionId) -> BTreeSet<Role> {
            let mut roles = BTreeSet::from([Role::Read]);
            if self.writable.contains(&collection) {
                roles.insert(Role::Write);
            }
            roles
        }
    }

    type TestEngine = GridEngine<MockGateway, MockConfigGateway, MockLayout, MockPermissions>;

    struct Fixture {
        engine: TestEngine,
        gateway: MockGateway,
        layout: MockLayout,
        config_writes: Rc<RefCell<Vec<ViewConfig>>>,
        collection: CollectionId,
    }

    fn fixture(page_size: u32) -> Fixture {
        let collection = CollectionId::generate();
        let gateway = MockGateway::default();
        let config_gateway = MockConfigGateway::default();
        let config_writes = Rc::clone(&config_gateway.writes);
        let layout = MockLayout::default();
        let permissions = MockPermissions {
            writable: vec![collection],
        };

        let engine = GridEngine::new(
            gateway.clone(),
            config_gateway,
            layout.clone(),
            permissions,
            page_size,
        );

        Fixture {
            engine,
            gateway,
            layout,
            config_writes,
            collection,
        }
    }

    fn navigate(fixture: &mut Fixture) {
        let workspace = Workspace::new(OrganizationId::generate(), ProjectId::generate());
        fixture
            .engine
            .set_navigation(workspace, QuerySpec::for_collection(fixture.collection))
            .unwrap();
    }

    fn persisted_record(collection: CollectionId, attributes: &[(&str, &str)]) -> Record {
        let mut record = Record::new(collection);
        record.id = Some(RecordId::generate());
        for (name, value) in attributes {
            record.data.insert(
                (*name).to_owned(),
                AttributeValue::Text((*value).to_owned()),
            );
        }
        record
    }

    ///
    /// Navigation + pagination
    ///

    #[test]
    fn valid_navigation_dispatches_the_first_page() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        let log = fx.gateway.log.borrow();
        assert_eq!(log.fetches.len(), 1);
        assert_eq!(log.fetches[0].page, 0);
        assert_eq!(log.fetches[0].page_size, 20);
        assert_eq!(log.subscribes.len(), 1);
        drop(log);

        // loaded_count persisted as one page.
        assert_eq!(fx.config_writes.borrow().last().unwrap().loaded_count, 20);
    }

    #[test]
    fn invalid_workspace_suppresses_fetches() {
        let mut fx = fixture(20);
        fx.engine
            .set_navigation(
                Workspace::default(),
                QuerySpec::for_collection(fx.collection),
            )
            .unwrap();

        assert!(fx.gateway.log.borrow().fetches.is_empty());

        fx.engine.notify_scroll_near_bottom().unwrap();
        assert!(fx.gateway.log.borrow().fetches.is_empty());
    }

    #[test]
    fn exhaustion_scenario_from_the_contract() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        // Page 0: full window of 20 records.
        let token = fx.engine.subscription_token();
        let records: Vec<Record> = (0..20)
            .map(|_| persisted_record(fx.collection, &[("a", "1")]))
            .collect();
        fx.engine.apply_snapshot(token, records);
        assert!(!fx.engine.is_exhausted());

        // Page 1 accepted, but the cumulative window comes back short.
        fx.engine.notify_scroll_near_bottom().unwrap();
        assert_eq!(fx.gateway.log.borrow().fetches.len(), 2);
        let records: Vec<Record> = (0..35)
            .map(|_| persisted_record(fx.collection, &[("a", "1")]))
            .collect();
        fx.engine.apply_snapshot(fx.engine.subscription_token(), records);
        assert!(fx.engine.is_exhausted());

        // Exhausted: further scroll produces no fetch.
        fx.engine.notify_scroll_near_bottom().unwrap();
        fx.engine.notify_scroll_near_bottom().unwrap();
        assert_eq!(fx.gateway.log.borrow().fetches.len(), 2);
    }

    #[test]
    fn loaded_count_is_monotonic_across_pages() {
        let mut fx = fixture(10);
        navigate(&mut fx);

        let records: Vec<Record> = (0..10)
            .map(|_| persisted_record(fx.collection, &[("a", "1")]))
            .collect();
        fx.engine.apply_snapshot(fx.engine.subscription_token(), records);
        fx.engine.notify_scroll_near_bottom().unwrap();

        let counts: Vec<u32> = fx
            .config_writes
            .borrow()
            .iter()
            .map(|config| config.loaded_count)
            .collect();
        assert_eq!(counts, vec![10, 20]);
    }

    #[test]
    fn persisted_loaded_count_seeds_the_whole_window() {
        let mut fx = fixture(20);
        fx.engine.observe_config(Some(ViewConfig {
            loaded_count: 60,
            ..ViewConfig::default()
        }));
        navigate(&mut fx);

        let log = fx.gateway.log.borrow();
        assert_eq!(log.fetches.len(), 1);
        assert_eq!(log.fetches[0].page, 0);
        assert_eq!(log.fetches[0].page_size, 60);
    }

    ///
    /// Snapshots and reconciliation
    ///

    #[test]
    fn stale_snapshot_after_reset_is_discarded() {
        let mut fx = fixture(20);
        navigate(&mut fx);
        let stale_token = fx.engine.subscription_token();

        // A different query is a structural reset: new generation.
        let workspace = Workspace::new(OrganizationId::generate(), ProjectId::generate());
        fx.engine
            .set_navigation(workspace, QuerySpec::for_collection(fx.collection))
            .unwrap();

        let records = vec![persisted_record(fx.collection, &[("a", "1")])];
        let outcome = fx.engine.apply_snapshot(stale_token, records);

        assert!(outcome.is_noop());
        assert!(fx.engine.cards().is_empty());
    }

    #[test]
    fn committing_card_survives_a_batch_without_it() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        // Card A arrives from the server.
        let record_a = persisted_record(fx.collection, &[("a", "1")]);
        fx.engine
            .apply_snapshot(fx.engine.subscription_token(), vec![record_a]);
        assert_eq!(fx.engine.cards().len(), 1);
        let a_identity = fx.engine.cards()[0].identity();

        // Card B is local, mid-create: tab past the end of card A.
        for _ in 0..8 {
            if fx.engine.cards().len() > 1 {
                break;
            }
            fx.engine.select_next().unwrap();
        }
        assert_eq!(fx.engine.cards().len(), 2);
        fx.engine.create_attribute_row(1, "title").unwrap();
        fx.engine.settle();
        fx.engine.focus_out(1).unwrap();
        let b_identity = fx.engine.cards()[1].identity();
        assert!(fx.engine.cards()[1].committing);

        // A batch containing neither: A is a remote deletion, B survives.
        let outcome = fx.engine.apply_snapshot(fx.engine.subscription_token(), vec![]);

        assert_eq!(outcome.removed, vec![a_identity]);
        assert_eq!(fx.engine.cards().len(), 1);
        assert_eq!(fx.engine.cards()[0].identity(), b_identity);
        assert!(fx.layout.removes.borrow().contains(&a_identity));
    }

    #[test]
    fn initial_load_honors_the_persisted_ordering() {
        let mut fx = fixture(20);

        let first = persisted_record(fx.collection, &[("n", "1")]);
        let second = persisted_record(fx.collection, &[("n", "2")]);
        let third = persisted_record(fx.collection, &[("n", "3")]);

        let mut card_order = std::collections::BTreeMap::new();
        card_order.insert(third.id.unwrap(), 0);
        card_order.insert(first.id.unwrap(), 1);
        card_order.insert(second.id.unwrap(), 2);
        fx.engine.observe_config(Some(ViewConfig {
            card_order,
            loaded_count: 0,
        }));

        navigate(&mut fx);
        fx.engine.apply_snapshot(
            fx.engine.subscription_token(),
            vec![first.clone(), second.clone(), third.clone()],
        );

        let ids: Vec<RecordId> = fx
            .engine
            .cards()
            .iter()
            .map(|card| card.record.id.unwrap())
            .collect();
        assert_eq!(ids, vec![third.id.unwrap(), first.id.unwrap(), second.id.unwrap()]);
    }

    #[test]
    fn order_round_trips_through_update_view_order() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        let records: Vec<Record> = (0..3)
            .map(|n| persisted_record(fx.collection, &[("n", &n.to_string())]))
            .collect();
        fx.engine
            .apply_snapshot(fx.engine.subscription_token(), records);
        fx.engine.update_view_order().unwrap();

        let persisted = fx.config_writes.borrow().last().cloned().unwrap();
        let reloaded_order: Vec<i64> = fx
            .engine
            .cards()
            .iter()
            .map(|card| persisted.order_for(card.record.id.unwrap()).unwrap())
            .collect();

        // The persisted mapping reproduces the grid's relative order.
        assert!(reloaded_order.windows(2).all(|pair| pair[0] < pair[1]));
    }

    ///
    /// Selection scenarios
    ///

    #[test]
    fn click_select_then_click_edit_then_blur_deletes_empty_card() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        let record = persisted_record(fx.collection, &[("a", "1"), ("b", "2"), ("c", "3")]);
        let record_id = record.id.unwrap();
        fx.engine
            .apply_snapshot(fx.engine.subscription_token(), vec![record]);

        // First activation selects, the second one edits.
        fx.engine.click(0, 1, 2);
        assert_eq!(fx.engine.selection_state(), SelectionState::Selected);
        fx.engine.click(0, 1, 2);
        assert_eq!(fx.engine.selection_state(), SelectionState::Editing);

        // All rows removed: blur must suggest deletion, not save.
        fx.engine.update_attribute_name(0, 2, "").unwrap();
        fx.engine.update_attribute_name(0, 1, "").unwrap();
        fx.engine.update_attribute_name(0, 0, "").unwrap();
        fx.engine.focus_out(0).unwrap();

        let log = fx.gateway.log.borrow();
        assert_eq!(log.delete_confirms, vec![(fx.collection, record_id)]);
        assert!(log.updates.is_empty());
    }

    #[test]
    fn blur_on_an_unpersisted_empty_card_discards_it() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        // Tab into a new card slot, then leave it untouched.
        fx.engine.select_next().unwrap();
        assert_eq!(fx.engine.cards().len(), 1);

        fx.engine.focus_out(0).unwrap();

        assert!(fx.engine.cards().is_empty());
        assert!(fx.gateway.log.borrow().delete_confirms.is_empty());
        assert_eq!(fx.engine.selection_state(), SelectionState::Idle);
    }

    #[test]
    fn selection_clamps_when_the_grid_shrinks() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        let keep = persisted_record(fx.collection, &[("a", "1")]);
        let drop_a = persisted_record(fx.collection, &[("a", "1"), ("b", "2")]);
        let drop_b = persisted_record(fx.collection, &[("a", "1")]);
        fx.engine.apply_snapshot(
            fx.engine.subscription_token(),
            vec![keep.clone(), drop_a, drop_b],
        );

        fx.engine.click(2, 1, 0);

        // Concurrent deletions shrink the grid to one card.
        fx.engine
            .apply_snapshot(fx.engine.subscription_token(), vec![keep]);

        let view = fx.engine.selection().unwrap();
        assert_eq!(fx.engine.cards().len(), 1);
        assert!(view.row <= 1);
        assert_eq!(fx.engine.selection_state(), SelectionState::Selected);
    }

    ///
    /// Commit lifecycle
    ///

    #[test]
    fn tab_past_the_end_creates_a_card_and_create_is_dispatched_once() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        fx.engine.select_next().unwrap();
        assert_eq!(fx.engine.cards().len(), 1);
        assert!(fx.layout.adds.borrow().len() == 1);

        fx.engine.create_attribute_row(0, "title").unwrap();
        fx.engine.settle();
        let view = fx.engine.selection().unwrap();
        assert!(view.edit_mode);

        fx.engine.update_attribute_value(0, 0, "hello").unwrap();
        fx.engine.focus_out(0).unwrap();

        assert_eq!(fx.gateway.log.borrow().creates.len(), 1);
        assert!(fx.engine.cards()[0].committing);

        // A second blur while the create is outstanding does not re-dispatch.
        fx.engine.commit_card_edit(0).unwrap();
        assert_eq!(fx.gateway.log.borrow().creates.len(), 1);
    }

    #[test]
    fn create_ack_migrates_identity_and_rekeys_the_layout_node() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        fx.engine.select_next().unwrap();
        fx.engine.create_attribute_row(0, "title").unwrap();
        fx.engine.focus_out(0).unwrap();
        let draft_identity = fx.engine.cards()[0].identity();

        let id = RecordId::generate();
        fx.engine.complete_create(draft_identity, id).unwrap();

        let card = &fx.engine.cards()[0];
        assert!(card.initialized);
        assert!(!card.committing);
        assert_ne!(card.identity(), draft_identity);
        assert!(fx.layout.removes.borrow().contains(&draft_identity));
        assert!(fx.layout.adds.borrow().contains(&card.identity()));

        // The next authoritative window matches the card by record id.
        let mut server_copy = Record::new(fx.collection);
        server_copy.id = Some(id);
        server_copy
            .data
            .insert("title".into(), AttributeValue::Text(String::new()));
        let outcome = fx
            .engine
            .apply_snapshot(fx.engine.subscription_token(), vec![server_copy]);
        assert_eq!(outcome.replaced.len(), 1);
        assert_eq!(fx.engine.cards().len(), 1);
    }

    #[test]
    fn failed_create_clears_committing_for_retry() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        fx.engine.select_next().unwrap();
        fx.engine.create_attribute_row(0, "title").unwrap();

        fx.gateway.log.borrow_mut().fail_writes = true;
        assert!(fx.engine.focus_out(0).is_err());
        assert!(!fx.engine.cards()[0].committing);

        // Engine stays usable; the retry succeeds.
        fx.gateway.log.borrow_mut().fail_writes = false;
        fx.engine.commit_card_edit(0).unwrap();
        assert_eq!(fx.gateway.log.borrow().creates.len(), 1);
        assert!(fx.engine.cards()[0].committing);
    }

    #[test]
    fn update_path_dispatches_for_initialized_cards() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        let record = persisted_record(fx.collection, &[("a", "1")]);
        let record_id = record.id.unwrap();
        fx.engine
            .apply_snapshot(fx.engine.subscription_token(), vec![record]);

        fx.engine.update_attribute_value(0, 0, "2").unwrap();
        fx.engine.focus_out(0).unwrap();

        let log = fx.gateway.log.borrow();
        assert_eq!(log.updates.len(), 1);
        assert_eq!(log.updates[0].0, record_id);
        assert!(log.creates.is_empty());
    }

    #[test]
    fn toggle_favorite_round_trips_through_the_gateway() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        let record = persisted_record(fx.collection, &[("a", "1")]);
        let record_id = record.id.unwrap();
        fx.engine
            .apply_snapshot(fx.engine.subscription_token(), vec![record]);

        fx.engine.toggle_favorite(0).unwrap();

        assert!(fx.engine.cards()[0].record.favorite);
        assert_eq!(fx.gateway.log.borrow().favorites, vec![record_id]);
    }

    ///
    /// Permissions
    ///

    #[test]
    fn create_requires_write_on_a_single_collection() {
        let collection = CollectionId::generate();
        let gateway = MockGateway::default();
        let layout = MockLayout::default();
        // Read-only permissions.
        let engine_permissions = MockPermissions::default();
        let mut engine: TestEngine = GridEngine::new(
            gateway,
            MockConfigGateway::default(),
            layout,
            engine_permissions,
            20,
        );

        let workspace = Workspace::new(OrganizationId::generate(), ProjectId::generate());
        engine
            .set_navigation(workspace, QuerySpec::for_collection(collection))
            .unwrap();

        assert!(!engine.has_create_rights());
        assert!(engine.create_card(Record::new(collection)).is_err());

        // Tab past the end silently refuses to create.
        engine.select_next().unwrap();
        assert!(engine.cards().is_empty());
    }

    ///
    /// Teardown
    ///

    #[test]
    fn teardown_fences_off_every_late_callback() {
        let mut fx = fixture(20);
        navigate(&mut fx);

        let record = persisted_record(fx.collection, &[("a", "1")]);
        fx.engine
            .apply_snapshot(fx.engine.subscription_token(), vec![record.clone()]);
        let token = fx.engine.subscription_token();

        fx.engine.teardown();

        let outcome = fx.engine.apply_snapshot(token, vec![record]);
        assert!(outcome.is_noop());
        assert!(fx.engine.set_navigation(Workspace::default(), QuerySpec::default()).is_err());
        assert!(fx.engine.notify_scroll_near_bottom().is_err());

        // Teardown is idempotent.
        fx.engine.teardown();
    }
}
