//! Versioned directory (folder tree) of an EHR.
//!
//! - [`path`]: folder path syntax.
//! - [`folder`]: immutable trees with copy-on-write edits.
//! - [`wire`]: openEHR `FOLDER` conversion.
//! - [`service`]: create, read (by version or time, optionally narrowed by path), update and
//!   delete under optimistic concurrency.

pub mod folder;
pub mod path;
pub mod service;
pub mod wire;

pub use folder::{FolderNode, ItemRef};
pub use path::FolderPath;
pub use service::{DirectoryService, DirectoryView};
