use crate::{
    grid::Grid,
    model::{Card, CardIdentity},
    obs::sink::{self, EngineEvent},
};

///
/// ReconcileOutcome
///
/// What one authoritative batch did to the grid. The engine uses this to
/// notify the selection state machine and the layout collaborator; removals
/// are the cards the server no longer knows about.
///

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub replaced: Vec<CardIdentity>,
    pub appended: Vec<CardIdentity>,
    pub removed: Vec<CardIdentity>,
    pub collisions: u64,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.replaced.is_empty() && self.appended.is_empty() && self.removed.is_empty()
    }
}

/// Merge an authoritative batch into the locally held card sequence.
///
/// The stream re-delivers the entire visible window on every change, so the
/// merge diffs by identity, not position:
///
/// 1. an existing card matched by identity is replaced in its slot (no
///    visual reflow for unchanged cards);
/// 2. an unmatched existing card that is persisted and not mid-commit was
///    deleted remotely and is removed;
/// 3. an unmatched existing card that is local-only (uncommitted or
///    mid-commit) is retained — the batch cannot know about it yet;
/// 4. incoming cards matched to nothing are appended in delivery order.
pub fn merge(grid: &mut Grid, incoming: Vec<Card>) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let mut incoming = dedupe_by_identity(incoming, &mut outcome);

    // Phase 1: walk the existing sequence; replace matches in place, collect
    // remote deletions. Matched incoming slots are taken so phase 2 appends
    // only the leftovers, in delivery order.
    let mut removals: Vec<CardIdentity> = Vec::new();
    for index in 0..grid.len() {
        let Some(existing) = grid.card(index) else {
            break;
        };
        let identity = existing.identity();
        let (initialized, committing, order) =
            (existing.initialized, existing.committing, existing.order);

        let matched = incoming
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|card| card.identity() == identity))
            .and_then(Option::take);

        if let Some(mut replacement) = matched {
            // Order is a presentation detail owned by the view config, not
            // by the server payload.
            replacement.order = order;
            grid.replace_at(index, replacement);
            outcome.replaced.push(identity);
        } else if initialized && !committing {
            removals.push(identity);
        }
        // Uncommitted or mid-commit cards are retained as-is.
    }

    for identity in removals {
        let _ = grid.remove(identity);
        sink::record(EngineEvent::RemoteRemoval { identity });
        outcome.removed.push(identity);
    }

    // Phase 2: append newly visible cards in the order received.
    for card in incoming.into_iter().flatten() {
        let identity = card.identity();
        if grid.push_back(card) {
            outcome.appended.push(identity);
        }
    }

    sink::record(EngineEvent::ReconcileApplied {
        replaced: outcome.replaced.len() as u64,
        appended: outcome.appended.len() as u64,
        removed: outcome.removed.len() as u64,
    });

    outcome
}

/// Collapse duplicate incoming identities: the later card in iteration order
/// wins. A collision signals misassigned identifiers upstream and is logged
/// as a data-integrity warning, never a fatal error.
fn dedupe_by_identity(
    incoming: Vec<Card>,
    outcome: &mut ReconcileOutcome,
) -> Vec<Option<Card>> {
    let mut slots: Vec<Option<Card>> = Vec::with_capacity(incoming.len());

    for card in incoming {
        let identity = card.identity();
        let earlier = slots.iter_mut().find(|slot| {
            slot.as_ref()
                .is_some_and(|existing| existing.identity() == identity)
        });

        if let Some(slot) = earlier {
            sink::record(EngineEvent::IdentityCollision { identity });
            outcome.collisions += 1;
            *slot = Some(card);
        } else {
            slots.push(Some(card));
        }
    }

    slots
}
