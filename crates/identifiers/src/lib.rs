//! Identifier types for versioned resources.
//!
//! Every versioned resource in VRS is addressed by an object id (a UUID) and, once committed, by
//! a version id of the form:
//!
//! `<object_id>::<origin_id>::<ordinal>`
//!
//! Example:
//! `8849182c-82ad-4088-a07f-48ead4180515::local.vrs.dev::3`
//!
//! - `object_id` identifies the resource across all of its versions.
//! - `origin_id` names the system that created the version.
//! - `ordinal` is the 1-based position of the version in the resource's history.
//!
//! Clients may refer to a resource either by its bare object id (meaning "the latest version")
//! or by a full version id. [`VersionIdentifier`] captures both forms.
//!
//! ## Sharded directory layout
//! For an object id `u` (32-hex simple form), file-backed stores keep data under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! This limits fan-out in any single directory.

mod clock;
mod object_id;
mod version;

pub use clock::next_commit_time;
pub use object_id::{ObjectId, OriginId, Uuid};
pub use version::{ObjectVersionId, Ordinal, VersionIdentifier, VersionQuery};

/// Error type for identifier parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The object id part is not a UUID.
    #[error("invalid object id: '{0}'")]
    InvalidObjectId(String),
    /// The origin id part is empty or contains unsupported characters.
    #[error("invalid origin id: '{0}'")]
    InvalidOrigin(String),
    /// The ordinal is not a positive base-10 integer.
    #[error("invalid version ordinal: '{0}'")]
    InvalidOrdinal(String),
    /// The identifier does not have the `object::origin::ordinal` shape.
    #[error("malformed version identifier: '{0}'")]
    Malformed(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
