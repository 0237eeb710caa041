//! Reference executor over the composition store.
//!
//! It understands only what the dispatcher adds to any query: a leading `SELECT`, trailing
//! `LIMIT n` / `OFFSET n` clauses and an optional `ehr_id` parameter. Everything between is
//! ignored; every such query lists the latest live version of each composition.

use super::{ExecutionResult, QueryColumn, QueryExecutor, QueryParameters, TouchedResources};
use crate::constants::EHR_ID_TAG;
use crate::revision::ChangeType;
use crate::store::Storage;
use crate::{CoreError, CoreResult};
use serde_json::{json, Value};
use vrs_identifiers::ObjectId;

pub struct CompositionScanExecutor {
    storage: Storage,
}

impl CompositionScanExecutor {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn columns() -> Vec<QueryColumn> {
        [
            ("ehr_id", "/ehr_id/value"),
            ("uid", "/uid/value"),
            ("template_id", "/archetype_details/template_id/value"),
        ]
        .into_iter()
        .map(|(name, path)| QueryColumn {
            name: name.into(),
            path: path.into(),
        })
        .collect()
    }
}

#[derive(Debug, Default, PartialEq)]
struct Paging {
    limit: Option<usize>,
    offset: Option<usize>,
}

/// Splits trailing `LIMIT`/`OFFSET` clauses off the query, in any order.
fn trailing_paging(text: &str) -> CoreResult<Paging> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    let mut paging = Paging::default();

    while tokens.len() >= 2 {
        let keyword = tokens[tokens.len() - 2];
        let slot = if keyword.eq_ignore_ascii_case("LIMIT") {
            &mut paging.limit
        } else if keyword.eq_ignore_ascii_case("OFFSET") {
            &mut paging.offset
        } else {
            break;
        };
        if slot.is_some() {
            return Err(CoreError::QueryExecution(format!(
                "{keyword} given more than once"
            )));
        }
        let value = tokens[tokens.len() - 1];
        *slot = Some(value.parse().map_err(|_| {
            CoreError::QueryExecution(format!("{keyword} expects a number, got '{value}'"))
        })?);
        tokens.truncate(tokens.len() - 2);
    }
    Ok(paging)
}

fn ehr_filter(parameters: Option<&QueryParameters>) -> CoreResult<Option<ObjectId>> {
    let Some(value) = parameters.and_then(|p| p.get("ehr_id")) else {
        return Ok(None);
    };
    value
        .as_str()
        .and_then(|s| ObjectId::parse(s).ok())
        .map(Some)
        .ok_or_else(|| {
            CoreError::QueryExecution(format!("parameter ehr_id is not an EHR id: {value}"))
        })
}

impl QueryExecutor for CompositionScanExecutor {
    fn execute(
        &self,
        text: &str,
        parameters: Option<&QueryParameters>,
    ) -> CoreResult<ExecutionResult> {
        let starts_with_select = text
            .split_whitespace()
            .next()
            .is_some_and(|t| t.eq_ignore_ascii_case("SELECT"));
        if !starts_with_select {
            return Err(CoreError::QueryExecution(
                "only SELECT queries are supported".into(),
            ));
        }
        let paging = trailing_paging(text)?;
        let ehr_id = ehr_filter(parameters)?;

        let store = &self.storage.compositions;
        let mut rows = Vec::new();
        let mut owners = Vec::new();
        for object_id in store.object_ids()? {
            let Some(history) = store.history(&object_id)? else {
                continue;
            };
            let latest = history.latest()?;
            if latest.audit.change_type() == ChangeType::Deleted {
                continue;
            }
            let Some(snapshot) = store.snapshot(&latest.version)? else {
                continue;
            };
            if ehr_id.is_some_and(|id| id != snapshot.owner_id) {
                continue;
            }
            owners.push(snapshot.owner_id);
            rows.push(vec![
                json!(snapshot.owner_id.to_string()),
                json!(snapshot.version.to_string()),
                snapshot
                    .content
                    .template_id
                    .clone()
                    .map_or(Value::Null, Value::String),
            ]);
        }

        let offset = paging.offset.unwrap_or(0);
        let limit = paging.limit.unwrap_or(usize::MAX);
        let mut touched = TouchedResources::new();
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .zip(owners)
            .skip(offset)
            .take(limit)
            .map(|(row, owner)| {
                touched.record(EHR_ID_TAG, owner.to_string());
                row
            })
            .collect();

        Ok(ExecutionResult {
            columns: Self::columns(),
            rows,
            touched,
        })
    }
}
