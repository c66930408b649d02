use crate::{
    error::InternalError,
    model::Card,
    obs::sink::{self, EngineEvent},
    types::RecordId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// ViewConfig
///
/// The persisted slice of a perspective's presentation: how the user ordered
/// the cards and how far they had paginated. Read on perspective entry to
/// seed pagination and sort order.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ViewConfig {
    /// Persisted-record-identifier → user-controlled order key. Cards
    /// without a persisted identifier are never part of the mapping.
    pub card_order: BTreeMap<RecordId, i64>,

    /// Cumulative record count loaded in the last session; monotonic by
    /// construction of the pagination controller.
    pub loaded_count: u32,
}

impl ViewConfig {
    /// Seed a card's order key from the persisted mapping.
    #[must_use]
    pub fn order_for(&self, id: RecordId) -> Option<i64> {
        self.card_order.get(&id).copied()
    }
}

///
/// ConfigGateway
///
/// Persistence boundary for the view configuration. Writes are synchronous
/// dispatches to the owning store; the engine never talks to it directly.
///

pub trait ConfigGateway {
    fn persist(&mut self, config: &ViewConfig) -> Result<(), InternalError>;
}

///
/// ViewConfigStore
///
/// The only component allowed to mutate `card_order`/`loaded_count`.
///
/// The store also filters the configuration stream: a pushed snapshot is
/// surfaced to the caller only when it is non-null, actually different, and
/// not the echo of a write this store itself just issued — otherwise every
/// write would feed back into another update cycle.
///

#[derive(Debug)]
pub struct ViewConfigStore<C: ConfigGateway> {
    gateway: C,
    current: Option<ViewConfig>,
    last_written: Option<ViewConfig>,
}

impl<C: ConfigGateway> ViewConfigStore<C> {
    pub const fn new(gateway: C) -> Self {
        Self {
            gateway,
            current: None,
            last_written: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> Option<&ViewConfig> {
        self.current.as_ref()
    }

    /// Feed one pushed configuration snapshot through the suppression
    /// filter. Returns the snapshot only when the caller should react to it.
    pub fn observe(&mut self, snapshot: Option<ViewConfig>) -> Option<&ViewConfig> {
        let snapshot = snapshot?;

        if self.current.as_ref() == Some(&snapshot) {
            return None;
        }

        let own_echo = self.last_written.as_ref() == Some(&snapshot);
        self.current = Some(snapshot);

        if own_echo {
            // Reacting to our own write would loop.
            None
        } else {
            self.current.as_ref()
        }
    }

    /// Record a new cumulative loaded-count and persist.
    ///
    /// The value is set unconditionally; monotonicity is guaranteed by the
    /// pagination controller that produces it.
    pub fn increase_document_count(&mut self, loaded_count: u32) -> Result<(), InternalError> {
        let mut config = self.current.clone().unwrap_or_default();
        config.loaded_count = loaded_count;
        self.write(config)
    }

    /// Recompute the order mapping from the grid's current card sequence and
    /// persist it. Cards without a persisted identifier are skipped; a
    /// mapping identical to the current one is not re-written.
    pub fn change_card_order(&mut self, cards: &[Card]) -> Result<(), InternalError> {
        let card_order: BTreeMap<RecordId, i64> = cards
            .iter()
            .filter_map(|card| card.record.id.map(|id| (id, card.order)))
            .collect();

        let mut config = self.current.clone().unwrap_or_default();
        if config.card_order == card_order {
            return Ok(());
        }
        config.card_order = card_order;
        self.write(config)
    }

    fn write(&mut self, config: ViewConfig) -> Result<(), InternalError> {
        self.gateway.persist(&config)?;

        sink::record(EngineEvent::ConfigPersisted {
            loaded_count: config.loaded_count,
        });

        self.last_written = Some(config.clone());
        self.current = Some(config);

        Ok(())
    }
}
