use crate::types::Ulid;
use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};

// One newtype per identifier namespace so a record id can never be passed
// where a collection id is expected.
macro_rules! id_newtype {
    ($($(#[doc = $doc:literal])+ $name:ident),* $(,)?) => {
        $(
            $(#[doc = $doc])+
            #[derive(
                Clone, Copy, Debug, Default, Deref, Deserialize, Display, Eq, Hash, Ord,
                PartialEq, PartialOrd, Serialize,
            )]
            #[repr(transparent)]
            pub struct $name(pub Ulid);

            impl $name {
                #[must_use]
                pub const fn nil() -> Self {
                    Self(Ulid::nil())
                }

                /// Generate a fresh identifier from the monotonic generator.
                #[must_use]
                pub fn generate() -> Self {
                    Self(Ulid::generate())
                }

                #[must_use]
                pub const fn to_bytes(&self) -> [u8; 16] {
                    self.0.to_bytes()
                }
            }

            impl From<Ulid> for $name {
                fn from(ulid: Ulid) -> Self {
                    Self(ulid)
                }
            }
        )*
    };
}

id_newtype! {
    /// Server-assigned identifier of a persisted record.
    RecordId,
    /// Identifier of the collection a record belongs to.
    CollectionId,
    /// Identifier of the organization half of a workspace.
    OrganizationId,
    /// Identifier of the project half of a workspace.
    ProjectId,
    /// Per-card creation nonce; the identity basis of a card whose record
    /// has not been persisted yet.
    CardNonce,
}
