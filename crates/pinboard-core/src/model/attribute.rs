use crate::model::record::{AttributeValue, Record};

///
/// AttributeRow
///
/// One editable (name, value) row of a card. Rows are materialized from the
/// record's payload sorted by name; `previous_name` tracks the persisted name
/// across a rename so write-back can drop the old key.
///
/// Invariants: no two rows of a card share a name; an empty-named row is a
/// transient "new attribute" placeholder and is never written back.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttributeRow {
    pub name: String,
    pub previous_name: String,
    pub value: AttributeValue,
}

impl AttributeRow {
    #[must_use]
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        let name = name.into();

        Self {
            previous_name: name.clone(),
            name,
            value,
        }
    }

    /// A placeholder row for the "append new attribute" affordance.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }
}

/// Materialize the editable projection of a record's payload.
///
/// Rows come out sorted by attribute name; the value variant (`Text | Json`)
/// is decided here and not re-inspected afterwards.
#[must_use]
pub fn materialize_rows(record: &Record) -> Vec<AttributeRow> {
    // BTreeMap iteration is already name-ordered.
    record
        .data
        .iter()
        .map(|(name, value)| AttributeRow::new(name.clone(), value.clone()))
        .collect()
}

/// Write the edited rows back into the record's payload.
///
/// Placeholder rows are skipped; a later duplicate name overwrites an earlier
/// one, matching last-write-wins at the transport layer.
pub fn apply_rows(record: &mut Record, rows: &[AttributeRow]) {
    record.data = rows
        .iter()
        .filter(|row| !row.is_placeholder())
        .map(|row| (row.name.clone(), row.value.clone()))
        .collect();
}
