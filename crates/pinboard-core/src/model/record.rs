use crate::types::{CollectionId, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// AttributeValue
///
/// Tagged projection of a record's free-form payload values. The variant is
/// decided once when rows are materialized: strings stay `Text`, everything
/// else is carried as `Json` and edited through its serialized form.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Json(serde_json::Value),
}

impl AttributeValue {
    /// Classify a raw payload value into its editable variant.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }

    /// The text shown in the edit field for this value.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Json(value) => value.is_null(),
        }
    }
}

impl Default for AttributeValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

///
/// Record
///
/// The underlying domain entity a card wraps. `id` is absent until the first
/// successful create round-trips through the transport.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Record {
    pub id: Option<RecordId>,
    pub collection_id: CollectionId,
    pub data: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub favorite: bool,
}

impl Record {
    #[must_use]
    pub fn new(collection_id: CollectionId) -> Self {
        Self {
            id: None,
            collection_id,
            data: BTreeMap::new(),
            favorite: false,
        }
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.data.insert(name.into(), value);
        self
    }
}
