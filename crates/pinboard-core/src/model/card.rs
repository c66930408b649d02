use crate::{
    hash::{fnv1a_64, fnv1a_64_continue},
    model::{
        attribute::{apply_rows, materialize_rows},
        record::Record,
        AttributeRow,
    },
    types::CardNonce,
};
use std::fmt;

// Domain-separation prefixes so a persisted id and a nonce can never collide
// in the same digest space.
const IDENTITY_TAG_RECORD: u8 = 0x01;
const IDENTITY_TAG_NONCE: u8 = 0x02;

///
/// CardIdentity
///
/// Stable content fingerprint of a card: a digest over the record's persisted
/// identifier (or the card's creation nonce) and its collection membership.
/// Two cards are the same card iff their identities are equal, independent of
/// grid position. The identity migrates from nonce-based to id-based when the
/// record is first persisted.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct CardIdentity(u64);

impl CardIdentity {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

///
/// Card
///
/// One editable visual unit wrapping a record, plus the editable row
/// projection and the commit bookkeeping flags.
///

#[derive(Clone, Debug)]
pub struct Card {
    pub record: Record,
    nonce: CardNonce,

    /// True once the record has a server-assigned identifier.
    pub initialized: bool,

    /// True while a create/update for this card is outstanding. Guards
    /// against duplicate create dispatch and against removal by a batch that
    /// cannot know about the card yet.
    pub committing: bool,

    /// User-controlled sort key, persisted in the view configuration.
    pub order: i64,

    rows: Vec<AttributeRow>,
    changed: bool,
}

impl Card {
    #[must_use]
    pub fn from_record(record: Record) -> Self {
        let initialized = record.is_persisted();
        let rows = materialize_rows(&record);

        Self {
            record,
            nonce: CardNonce::generate(),
            initialized,
            committing: false,
            order: 0,
            rows,
            changed: false,
        }
    }

    #[must_use]
    pub fn identity(&self) -> CardIdentity {
        let hash = match self.record.id {
            Some(id) => fnv1a_64_continue(fnv1a_64(&[IDENTITY_TAG_RECORD]), &id.to_bytes()),
            None => fnv1a_64_continue(fnv1a_64(&[IDENTITY_TAG_NONCE]), &self.nonce.to_bytes()),
        };

        CardIdentity(fnv1a_64_continue(hash, &self.record.collection_id.to_bytes()))
    }

    // ------------------------------------------------------------------
    // Row projection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn rows(&self) -> &[AttributeRow] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn row_mut(&mut self, index: usize) -> Option<&mut AttributeRow> {
        self.rows.get_mut(index)
    }

    pub fn push_row(&mut self, row: AttributeRow) {
        self.rows.push(row);
    }

    pub fn remove_row(&mut self, index: usize) -> Option<AttributeRow> {
        if index < self.rows.len() {
            Some(self.rows.remove(index))
        } else {
            None
        }
    }

    /// Write the row projection back into the record and mark the card as
    /// carrying unsaved edits.
    pub fn stage_changes(&mut self) {
        apply_rows(&mut self.record, &self.rows);
        self.changed = true;
    }

    /// Read and clear the unsaved-edits flag; blur commits exactly once.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.changed
    }

    // ------------------------------------------------------------------
    // Lifecycle predicates
    // ------------------------------------------------------------------

    /// A card that was created but never touched: nothing to persist.
    #[must_use]
    pub fn in_initial_state(&self) -> bool {
        !self.initialized && self.rows.is_empty() && self.record.data.is_empty()
    }

    #[must_use]
    pub fn has_no_attributes(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zero rows on an already-persisted card: blur should ask for deletion
    /// rather than saving an empty record.
    #[must_use]
    pub fn should_suggest_deletion(&self) -> bool {
        self.has_no_attributes() && self.initialized
    }

    // ------------------------------------------------------------------
    // Commit acknowledgement
    // ------------------------------------------------------------------

    /// Adopt the server-assigned identifier after a successful create.
    ///
    /// The card's identity migrates from nonce-based to id-based here; the
    /// next authoritative batch will match it by record id.
    pub fn complete_create(&mut self, id: crate::types::RecordId) {
        self.record.id = Some(id);
        self.initialized = true;
        self.committing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionId, RecordId};

    fn collection() -> CollectionId {
        CollectionId::generate()
    }

    #[test]
    fn identity_is_position_independent_and_stable() {
        let id = RecordId::generate();
        let coll = collection();

        let mut record_a = Record::new(coll);
        record_a.id = Some(id);
        let mut record_b = Record::new(coll).with_attribute("title", "changed".into());
        record_b.id = Some(id);

        // Same persisted id + collection, different payloads: same card.
        assert_eq!(
            Card::from_record(record_a).identity(),
            Card::from_record(record_b).identity()
        );
    }

    #[test]
    fn unpersisted_cards_get_distinct_identities() {
        let coll = collection();
        let a = Card::from_record(Record::new(coll));
        let b = Card::from_record(Record::new(coll));

        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn identity_differs_across_collections() {
        let id = RecordId::generate();

        let mut record_a = Record::new(collection());
        record_a.id = Some(id);
        let mut record_b = Record::new(collection());
        record_b.id = Some(id);

        assert_ne!(
            Card::from_record(record_a).identity(),
            Card::from_record(record_b).identity()
        );
    }

    #[test]
    fn identity_migrates_when_create_completes() {
        let coll = collection();
        let mut card = Card::from_record(Record::new(coll));
        let before = card.identity();

        let id = RecordId::generate();
        card.committing = true;
        card.complete_create(id);

        let mut persisted = Record::new(coll);
        persisted.id = Some(id);

        assert_ne!(card.identity(), before);
        assert_eq!(card.identity(), Card::from_record(persisted).identity());
        assert!(card.initialized);
        assert!(!card.committing);
    }

    #[test]
    fn staging_writes_rows_back_into_the_record() {
        let mut card = Card::from_record(Record::new(collection()));
        card.push_row(AttributeRow::new("title", "hello".into()));
        card.stage_changes();

        assert_eq!(card.record.data.get("title"), Some(&"hello".into()));
        assert!(card.take_changed());
        assert!(!card.take_changed());
    }

    #[test]
    fn deletion_is_suggested_only_for_initialized_cards() {
        let coll = collection();

        let mut persisted = Record::new(coll);
        persisted.id = Some(RecordId::generate());
        assert!(Card::from_record(persisted).should_suggest_deletion());

        assert!(!Card::from_record(Record::new(coll)).should_suggest_deletion());
    }
}
