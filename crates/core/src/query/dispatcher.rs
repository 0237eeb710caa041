use super::{
    AuditLog, Dispatched, QueryExecutor, QueryInvocation, QueryOutcome, QueryParameters,
    QueryRequest, QueryResponse, StoredQueryRegistry, StoredQueryRequest,
};
use crate::{CoreError, CoreResult};
use std::sync::Arc;

/// Appends pagination to query text: ` LIMIT {fetch}` first, then ` OFFSET {offset}`.
pub fn paginate(text: &str, offset: Option<u64>, fetch: Option<u64>) -> String {
    let mut text = text.to_owned();
    if let Some(fetch) = fetch {
        text.push_str(&format!(" LIMIT {fetch}"));
    }
    if let Some(offset) = offset {
        text.push_str(&format!(" OFFSET {offset}"));
    }
    text
}

#[derive(Clone)]
pub struct QueryDispatcher {
    executor: Arc<dyn QueryExecutor>,
    registry: Arc<dyn StoredQueryRegistry>,
    audit: AuditLog,
}

impl QueryDispatcher {
    pub fn new(executor: Arc<dyn QueryExecutor>, registry: Arc<dyn StoredQueryRegistry>) -> Self {
        Self {
            executor,
            registry,
            audit: AuditLog::default(),
        }
    }

    /// The process-wide record of touched resources, for audit collaborators.
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] when the query text is blank.
    /// - Executor failures, unchanged (normally [`CoreError::QueryExecution`]).
    pub fn execute_adhoc(&self, request: QueryRequest) -> CoreResult<Dispatched> {
        if request.text.trim().is_empty() {
            return Err(CoreError::InvalidInput("query text (q) is required".into()));
        }

        let (response, invocation) = self.run(
            &request.text,
            request.parameters,
            request.offset,
            request.fetch,
        )?;
        let outcome = if response.rows.is_empty() {
            QueryOutcome::NoContent
        } else {
            QueryOutcome::Rows(response)
        };
        Ok(Dispatched {
            outcome,
            invocation,
        })
    }

    /// # Errors
    ///
    /// - [`CoreError::QueryNotFound`] when no registered version matches.
    /// - Executor failures, unchanged.
    pub fn execute_stored(&self, request: StoredQueryRequest) -> CoreResult<Dispatched> {
        let stored = self
            .registry
            .resolve(&request.qualified_name, &request.version)?
            .ok_or_else(|| CoreError::QueryNotFound {
                name: request.qualified_name.clone(),
                version: request.version.to_string(),
            })?;

        let (mut response, invocation) = self.run(
            &stored.text,
            request.parameters,
            request.offset,
            request.fetch,
        )?;
        response.name = Some(format!("{}/{}", stored.qualified_name, stored.version));
        Ok(Dispatched {
            outcome: QueryOutcome::Rows(response),
            invocation,
        })
    }

    fn run(
        &self,
        text: &str,
        parameters: QueryParameters,
        offset: Option<u64>,
        fetch: Option<u64>,
    ) -> CoreResult<(QueryResponse, QueryInvocation)> {
        let text = paginate(text, offset, fetch);
        let bound_parameters = (!parameters.is_empty()).then_some(parameters);

        tracing::debug!(
            query = %text,
            parameters = bound_parameters.as_ref().map_or(0, |p| p.len()),
            "dispatching query"
        );
        let result = self.executor.execute(&text, bound_parameters.as_ref())?;
        self.audit.merge(&result.touched)?;
        tracing::debug!(rows = result.rows.len(), "query finished");

        let response = QueryResponse {
            name: None,
            q: text.clone(),
            columns: result.columns,
            rows: result.rows,
        };
        let invocation = QueryInvocation {
            text,
            bound_parameters,
            offset,
            fetch_limit: fetch,
            touched_resource_ids: result.touched,
        };
        Ok((response, invocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EHR_ID_TAG;
    use crate::query::{
        ExecutionResult, MemoryQueryRegistry, QueryColumn, QueryVersion, QueryVersionSelector,
        TouchedResources,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Records every call and returns a fixed number of rows.
    struct RecordingExecutor {
        rows: usize,
        calls: Mutex<Vec<(String, Option<QueryParameters>)>>,
    }

    impl RecordingExecutor {
        fn returning(rows: usize) -> Arc<Self> {
            Arc::new(Self {
                rows,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Option<QueryParameters>)> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl QueryExecutor for RecordingExecutor {
        fn execute(
            &self,
            text: &str,
            parameters: Option<&QueryParameters>,
        ) -> CoreResult<ExecutionResult> {
            self.calls
                .lock()
                .expect("calls")
                .push((text.to_owned(), parameters.cloned()));
            if text.contains("BROKEN") {
                return Err(CoreError::QueryExecution("syntax error".into()));
            }

            let mut touched = TouchedResources::new();
            let rows: Vec<Vec<Value>> = (0..self.rows)
                .map(|i| {
                    touched.record(EHR_ID_TAG, format!("ehr-{i}"));
                    vec![json!(format!("ehr-{i}"))]
                })
                .collect();
            Ok(ExecutionResult {
                columns: vec![QueryColumn {
                    name: "ehr_id".into(),
                    path: "/ehr_id/value".into(),
                }],
                rows,
                touched,
            })
        }
    }

    fn registry() -> Arc<MemoryQueryRegistry> {
        let registry = MemoryQueryRegistry::new();
        for (version, text) in [("1.0.0", "SELECT v1"), ("1.1.0", "SELECT v11")] {
            registry
                .register(
                    "org.example::q1",
                    QueryVersion::parse(version).expect("version"),
                    text,
                )
                .expect("register");
        }
        Arc::new(registry)
    }

    fn adhoc(text: &str) -> QueryRequest {
        QueryRequest {
            text: text.into(),
            ..QueryRequest::default()
        }
    }

    #[test]
    fn paginate_appends_limit_then_offset() {
        assert_eq!(
            paginate("SELECT c FROM COMPOSITION c", Some(10), Some(5)),
            "SELECT c FROM COMPOSITION c LIMIT 5 OFFSET 10"
        );
        assert_eq!(paginate("q", Some(3), None), "q OFFSET 3");
        assert_eq!(paginate("q", None, None), "q");
    }

    #[test]
    fn adhoc_pagination_and_no_content() {
        let executor = RecordingExecutor::returning(0);
        let dispatcher = QueryDispatcher::new(executor.clone(), registry());

        let dispatched = dispatcher
            .execute_adhoc(QueryRequest {
                offset: Some(10),
                fetch: Some(5),
                ..adhoc("SELECT c FROM COMPOSITION c")
            })
            .expect("dispatch");

        assert_eq!(dispatched.outcome, QueryOutcome::NoContent);
        assert_eq!(
            dispatched.invocation.text,
            "SELECT c FROM COMPOSITION c LIMIT 5 OFFSET 10"
        );
        assert_eq!(executor.calls()[0].0, dispatched.invocation.text);
    }

    #[test]
    fn parameters_are_passed_only_when_present() {
        let executor = RecordingExecutor::returning(1);
        let dispatcher = QueryDispatcher::new(executor.clone(), registry());

        dispatcher.execute_adhoc(adhoc("SELECT 1")).expect("no params");
        let mut parameters = QueryParameters::new();
        parameters.insert("ehr_id".into(), json!("abc"));
        dispatcher
            .execute_adhoc(QueryRequest {
                parameters: parameters.clone(),
                ..adhoc("SELECT 1")
            })
            .expect("params");

        let calls = executor.calls();
        assert_eq!(calls[0].1, None);
        assert_eq!(calls[1].1, Some(parameters));
    }

    #[test]
    fn blank_text_is_invalid_input() {
        let dispatcher = QueryDispatcher::new(RecordingExecutor::returning(1), registry());
        let err = dispatcher.execute_adhoc(adhoc("  ")).expect_err("blank");
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn stored_query_defaults_to_latest_and_is_tagged() {
        let executor = RecordingExecutor::returning(0);
        let dispatcher = QueryDispatcher::new(executor.clone(), registry());

        let dispatched = dispatcher
            .execute_stored(StoredQueryRequest {
                qualified_name: "org.example::q1".into(),
                version: QueryVersionSelector::Latest,
                parameters: QueryParameters::new(),
                offset: None,
                fetch: None,
            })
            .expect("dispatch");

        match dispatched.outcome {
            QueryOutcome::Rows(response) => {
                assert_eq!(response.name.as_deref(), Some("org.example::q1/1.1.0"));
                assert!(response.rows.is_empty());
            }
            QueryOutcome::NoContent => panic!("stored queries always return rows"),
        }
        assert_eq!(executor.calls()[0].0, "SELECT v11");
    }

    #[test]
    fn unknown_stored_query_is_not_found() {
        let dispatcher = QueryDispatcher::new(RecordingExecutor::returning(1), registry());
        let err = dispatcher
            .execute_stored(StoredQueryRequest {
                qualified_name: "org.example::q1".into(),
                version: QueryVersionSelector::parse(Some("2")).expect("selector"),
                parameters: QueryParameters::new(),
                offset: None,
                fetch: None,
            })
            .expect_err("missing");
        assert_eq!(
            err.to_string(),
            "could not retrieve query identified by: org.example::q1/2"
        );
    }

    #[test]
    fn touched_resources_reach_the_audit_log_but_not_on_failure() {
        let dispatcher = QueryDispatcher::new(RecordingExecutor::returning(2), registry());

        let dispatched = dispatcher.execute_adhoc(adhoc("SELECT 1")).expect("ok");
        assert_eq!(
            dispatched
                .invocation
                .touched_resource_ids
                .values(EHR_ID_TAG)
                .map(|v| v.len()),
            Some(2)
        );

        let err = dispatcher.execute_adhoc(adhoc("BROKEN")).expect_err("fails");
        assert!(matches!(err, CoreError::QueryExecution(_)));

        let seen = dispatcher.audit_log().values(EHR_ID_TAG).expect("audit");
        assert_eq!(seen.len(), 2);
    }
}
