use super::{QueryColumn, QueryParameters, TouchedResources};
use crate::CoreResult;
use serde_json::Value;

/// Rows produced by a [`QueryExecutor`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionResult {
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Vec<Value>>,
    /// Resources read while producing `rows`, keyed by semantic tag.
    pub touched: TouchedResources,
}

/// Runs query text against the record corpus.
///
/// `parameters` is `None` when the caller supplied no parameters, which some executors treat
/// differently from an empty set. Implementations report their own failures as
/// [`crate::CoreError::QueryExecution`]; the dispatcher passes them through unchanged.
pub trait QueryExecutor: Send + Sync {
    fn execute(
        &self,
        text: &str,
        parameters: Option<&QueryParameters>,
    ) -> CoreResult<ExecutionResult>;
}
