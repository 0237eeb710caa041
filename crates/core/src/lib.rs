//! # VRS Core
//!
//! The versioned-resource engine of the VRS record store.
//!
//! This crate holds everything with real invariants:
//! - Revision histories with gap-free ordinals and a monotonic commit clock ([`revision`])
//! - Optimistic concurrency on every mutation of an existing resource ([`concurrency`])
//! - Point-in-time resolution of versions ([`temporal`])
//! - Storage backends, in memory or as sharded YAML files ([`store`])
//! - Versioned folder trees addressed by path ([`directory`])
//! - EHRs with a versioned `EHR_STATUS` ([`ehr`]) and versioned compositions ([`composition`])
//! - Query dispatch with pagination and audit of touched resources ([`query`])
//!
//! **No API concerns**: HTTP routing, headers and authentication belong in `api-rest`.
//! Configuration is passed in as [`CoreConfig`]; nothing here reads environment variables.

pub mod composition;
pub mod concurrency;
pub mod config;
pub mod constants;
pub mod directory;
pub mod ehr;
pub mod error;
pub mod outcome;
pub mod query;
pub mod revision;
pub mod store;
pub mod temporal;

pub use composition::{Composition, CompositionService};
pub use concurrency::{ConcurrencyGuard, ResourceLocator};
pub use config::CoreConfig;
pub use directory::{DirectoryService, DirectoryView, FolderNode, FolderPath};
pub use ehr::{EhrService, VersionedObjectSummary};
pub use error::{CoreError, CoreResult, ErrorCategory, VersionConflict};
pub use outcome::Lookup;
pub use query::QueryDispatcher;
pub use revision::{AuditDetails, ChangeType, RevisionEntry, RevisionHistory};
pub use store::{EhrRecord, Storage};
pub use temporal::{OriginalVersion, TemporalResolver};

pub use vrs_identifiers::{ObjectId, ObjectVersionId, OriginId, VersionIdentifier, VersionQuery};
