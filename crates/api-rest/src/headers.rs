//! Request header handling shared by the handlers.
//!
//! - `Prefer: return=minimal|representation` selects the body of write responses.
//! - `If-Match` carries the version a caller last saw.
//! - `x-committer` / `x-change-description` become the commit's audit details.
//! - `version_at_time` query values are RFC 3339 instants.

use crate::error::{etag_value, RestError, RestResult};
use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use vrs_core::constants::SYSTEM_COMMITTER;
use vrs_core::{AuditDetails, ChangeType, ConcurrencyGuard, VersionIdentifier};

pub const COMMITTER_HEADER: &str = "x-committer";
pub const DESCRIPTION_HEADER: &str = "x-change-description";

/// What a successful write should return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReturnPreference {
    #[default]
    Minimal,
    Representation,
}

impl ReturnPreference {
    /// The first recognised `return=` directive across all `Prefer` headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get_all("prefer")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split([',', ';']))
            .filter_map(|directive| directive.trim().strip_prefix("return="))
            .find_map(|value| match value.trim().trim_matches('"') {
                "representation" => Some(Self::Representation),
                "minimal" => Some(Self::Minimal),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn wants_body(self) -> bool {
        self == Self::Representation
    }
}

/// Parses the `If-Match` precondition, if one was sent.
///
/// # Errors
///
/// Returns a 400 error if the header is not text or not a version identifier.
pub fn if_match(headers: &HeaderMap) -> RestResult<Option<VersionIdentifier>> {
    let raw = text_header(headers, header::IF_MATCH.as_str())?;
    Ok(ConcurrencyGuard::parse_if_match(raw.as_deref())?)
}

/// Audit details from the committer headers, falling back to the system committer.
pub fn audit_details(headers: &HeaderMap, change_type: ChangeType) -> RestResult<AuditDetails> {
    let committer = text_header(headers, COMMITTER_HEADER)?;
    let description = text_header(headers, DESCRIPTION_HEADER)?;

    let committer = committer
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| SYSTEM_COMMITTER.to_owned());
    Ok(AuditDetails::new(
        committer,
        change_type,
        description.as_deref(),
    )?)
}

/// Parses an optional RFC 3339 instant such as `2024-01-01T10:00:00Z`.
pub fn parse_instant(value: Option<&str>) -> RestResult<Option<DateTime<Utc>>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(value)
        .map(|instant| Some(instant.with_timezone(&Utc)))
        .map_err(|err| RestError::BadRequest(format!("invalid version_at_time '{value}': {err}")))
}

/// `ETag` and relative `Location` headers for a committed version.
pub fn version_headers(
    version: impl std::fmt::Display,
    location: &str,
) -> Vec<(header::HeaderName, HeaderValue)> {
    let mut headers = Vec::with_capacity(2);
    if let Some(etag) = etag_value(version) {
        headers.push((header::ETAG, etag));
    }
    if let Ok(location) = HeaderValue::from_str(location) {
        headers.push((header::LOCATION, location));
    }
    headers
}

fn text_header(headers: &HeaderMap, name: &str) -> RestResult<Option<String>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::to_owned)
                .map_err(|_| RestError::BadRequest(format!("{name} header is not valid text")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn prefer_defaults_to_minimal() {
        assert_eq!(
            ReturnPreference::from_headers(&HeaderMap::new()),
            ReturnPreference::Minimal
        );
        assert_eq!(
            ReturnPreference::from_headers(&headers(&[("prefer", "respond-async")])),
            ReturnPreference::Minimal
        );
    }

    #[test]
    fn prefer_reads_return_directive_among_others() {
        let map = headers(&[("prefer", "respond-async, return=representation")]);
        assert_eq!(
            ReturnPreference::from_headers(&map),
            ReturnPreference::Representation
        );
    }

    #[test]
    fn if_match_accepts_quoted_versions() {
        let map = headers(&[(
            "if-match",
            "\"8849182c-82ad-4088-a07f-48ead4180515::node::2\"",
        )]);
        let expected = if_match(&map).expect("parse").expect("present");
        assert_eq!(
            expected.to_string(),
            "8849182c-82ad-4088-a07f-48ead4180515::node::2"
        );
        assert!(if_match(&HeaderMap::new()).expect("parse").is_none());
    }

    #[test]
    fn if_match_rejects_garbage() {
        let map = headers(&[("if-match", "not-a-version")]);
        assert!(if_match(&map).is_err());
    }

    #[test]
    fn audit_falls_back_to_system_committer() {
        let audit = audit_details(&HeaderMap::new(), ChangeType::Creation).expect("audit");
        assert_eq!(audit.committer().as_str(), SYSTEM_COMMITTER);

        let map = headers(&[("x-committer", "dr.who"), ("x-change-description", "tidy")]);
        let audit = audit_details(&map, ChangeType::Modification).expect("audit");
        assert_eq!(audit.committer().as_str(), "dr.who");
        assert_eq!(audit.description(), Some("tidy"));
    }

    #[test]
    fn instants_must_be_rfc3339() {
        assert!(parse_instant(None).expect("none").is_none());
        assert!(parse_instant(Some("2024-01-01T10:00:00Z"))
            .expect("valid")
            .is_some());
        assert!(parse_instant(Some("yesterday")).is_err());
    }
}
