//! Query dispatch.
//!
//! The dispatcher does not understand query text. It appends pagination clauses, hands text and
//! parameters to a [`QueryExecutor`], and records which resources the result touched in the
//! shared [`AuditLog`]. Stored queries are looked up by qualified name and semantic version in a
//! [`StoredQueryRegistry`] first.
//!
//! Outcomes:
//! - ad-hoc query with rows → [`QueryOutcome::Rows`]
//! - ad-hoc query without rows → [`QueryOutcome::NoContent`]
//! - stored query → always [`QueryOutcome::Rows`], tagged `"{name}/{version}"`

pub mod audit;
pub mod dispatcher;
pub mod executor;
pub mod registry;
pub mod scan;

pub use audit::{AuditLog, TouchedResources};
pub use dispatcher::{paginate, QueryDispatcher};
pub use executor::{ExecutionResult, QueryExecutor};
pub use registry::{
    MemoryQueryRegistry, QueryVersion, QueryVersionSelector, StoredQuery, StoredQueryRegistry,
};
pub use scan::CompositionScanExecutor;

use crate::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub type QueryParameters = BTreeMap<String, Value>;

/// An ad-hoc query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRequest {
    pub text: String,
    pub parameters: QueryParameters,
    pub offset: Option<u64>,
    pub fetch: Option<u64>,
}

/// A stored query, addressed by qualified name (e.g. `org.example::vitals`) and version.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredQueryRequest {
    pub qualified_name: String,
    pub version: QueryVersionSelector,
    pub parameters: QueryParameters,
    pub offset: Option<u64>,
    pub fetch: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryColumn {
    pub name: String,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryResponse {
    /// `"{qualified_name}/{version}"` for stored queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The text as executed, pagination included.
    pub q: String,
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    Rows(QueryResponse),
    NoContent,
}

/// What was executed for one request. Not persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryInvocation {
    pub text: String,
    /// `None` when the request had no parameters.
    pub bound_parameters: Option<QueryParameters>,
    pub offset: Option<u64>,
    pub fetch_limit: Option<u64>,
    pub touched_resource_ids: TouchedResources,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dispatched {
    pub outcome: QueryOutcome,
    pub invocation: QueryInvocation,
}

/// Reads an offset or fetch value given as a JSON number or numeric string.
///
/// Fractions are truncated (`5.9` → `5`).
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for negative, non-finite or non-numeric values.
pub fn integer_from_json(field: &str, value: &Value) -> CoreResult<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map_or_else(|| truncate(field, n.as_f64().unwrap_or(f64::NAN)), Ok),
        Value::String(s) => integer_from_text(field, s),
        other => Err(CoreError::InvalidInput(format!(
            "{field} must be a number, got {other}"
        ))),
    }
}

/// As [`integer_from_json`] for query-string values.
pub fn integer_from_text(field: &str, text: &str) -> CoreResult<u64> {
    let parsed: f64 = text
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidInput(format!("{field} must be a number, got '{text}'")))?;
    truncate(field, parsed)
}

fn truncate(field: &str, value: f64) -> CoreResult<u64> {
    if !value.is_finite() || value < 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(value.trunc() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_accept_numbers_and_numeric_strings() {
        assert_eq!(integer_from_json("fetch", &json!(5)).expect("int"), 5);
        assert_eq!(integer_from_json("fetch", &json!(5.9)).expect("double"), 5);
        assert_eq!(integer_from_json("offset", &json!("10.0")).expect("string"), 10);
        assert_eq!(integer_from_text("offset", " 3 ").expect("text"), 3);
    }

    #[test]
    fn integers_reject_negative_and_garbage() {
        assert!(integer_from_json("fetch", &json!(-1)).is_err());
        assert!(integer_from_json("fetch", &json!(true)).is_err());
        assert!(integer_from_text("offset", "ten").is_err());
        assert!(integer_from_text("offset", "inf").is_err());
    }
}
