mod id;
mod ulid;

pub use id::{CardNonce, CollectionId, OrganizationId, ProjectId, RecordId};
pub use ulid::{Ulid, UlidError};
