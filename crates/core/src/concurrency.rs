//! Optimistic concurrency control.
//!
//! Every mutation of an existing resource names the version the caller last saw (the
//! `If-Match` precondition). The mutation only proceeds when that version is still the latest;
//! otherwise the caller gets the actual latest version and where to fetch it.
//!
//! The comparison is done on the canonical string form of both identifiers, so a bare object id
//! never matches a committed version.
//!
//! [`ConcurrencyGuard::check`] is pure. Stores call it while holding the per-resource lock, which
//! is what makes read-latest/compare/append atomic.

use crate::{CoreError, CoreResult};
use vrs_identifiers::{ObjectId, ObjectVersionId, VersionIdentifier};

/// Where the versions of a resource can be fetched, relative to the API base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceLocator {
    Directory { ehr_id: ObjectId },
    EhrStatus { ehr_id: ObjectId },
    Composition,
}

impl ResourceLocator {
    pub fn location(&self, version: &ObjectVersionId) -> String {
        match self {
            Self::Directory { ehr_id } => format!("ehr/{ehr_id}/directory/{version}"),
            Self::EhrStatus { ehr_id } => {
                format!("ehr/{ehr_id}/versioned_ehr_status/version/{version}")
            }
            Self::Composition => format!("composition/{version}"),
        }
    }
}

pub struct ConcurrencyGuard;

impl ConcurrencyGuard {
    /// Checks a caller's precondition against the current latest version.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingPrecondition`] when `expected` is `None`.
    /// - [`CoreError::VersionConflict`] carrying `latest` and its location on mismatch.
    pub fn check(
        locator: &ResourceLocator,
        expected: Option<&VersionIdentifier>,
        latest: &ObjectVersionId,
    ) -> CoreResult<()> {
        let expected = expected.ok_or(CoreError::MissingPrecondition)?;

        if expected.to_string() == latest.to_string() {
            return Ok(());
        }

        tracing::warn!(
            expected = %expected,
            latest = %latest,
            "version precondition failed"
        );
        Err(CoreError::version_conflict(
            latest.clone(),
            locator.location(latest),
        ))
    }

    /// Parses an `If-Match` header value.
    ///
    /// Surrounding whitespace, a weak validator prefix (`W/`) and one pair of double quotes are
    /// stripped. Blank values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedIdentifier`] if the remaining text is not an identifier.
    pub fn parse_if_match(header: Option<&str>) -> CoreResult<Option<VersionIdentifier>> {
        let Some(raw) = header.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        let raw = raw.strip_prefix("W/").unwrap_or(raw);
        let raw = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .unwrap_or(raw);
        Ok(Some(VersionIdentifier::parse(raw)?))
    }
}
