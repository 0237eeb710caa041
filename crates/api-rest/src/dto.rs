//! Request and response bodies with OpenAPI schemas.
//!
//! Resource documents (`FOLDER`, `EHR_STATUS`, `COMPOSITION`) travel as canonical openEHR JSON and
//! are not modelled here; see the `openehr` crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};
use vrs_core::query::{QueryColumn, QueryResponse};
use vrs_core::{EhrRecord, RevisionEntry, RevisionHistory, VersionedObjectSummary};

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusRes {
    pub ok: bool,
    pub message: String,
    pub node_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EhrRes {
    pub ehr_id: String,
    pub system_id: String,
    /// RFC 3339.
    pub time_created: String,
    pub ehr_status_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_id: Option<String>,
}

impl From<&EhrRecord> for EhrRes {
    fn from(record: &EhrRecord) -> Self {
        Self {
            ehr_id: record.ehr_id.to_string(),
            system_id: record.system_id.to_string(),
            time_created: record.time_created.to_rfc3339(),
            ehr_status_id: record.ehr_status_id.to_string(),
            directory_id: record.directory_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionedObjectRes {
    pub uid: String,
    pub owner_id: String,
    pub time_created: String,
}

impl From<VersionedObjectSummary> for VersionedObjectRes {
    fn from(summary: VersionedObjectSummary) -> Self {
        Self {
            uid: summary.uid.to_string(),
            owner_id: summary.owner_id.to_string(),
            time_created: summary.time_created.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditRes {
    pub committer: String,
    pub change_type: String,
    pub time_committed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&RevisionEntry> for AuditRes {
    fn from(entry: &RevisionEntry) -> Self {
        Self {
            committer: entry.audit.committer().to_string(),
            change_type: entry.audit.change_type().to_string(),
            time_committed: entry.committed_at.to_rfc3339(),
            description: entry.audit.description().map(str::to_owned),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevisionItemRes {
    pub version_id: String,
    pub audits: Vec<AuditRes>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevisionHistoryRes {
    pub items: Vec<RevisionItemRes>,
}

impl From<&RevisionHistory> for RevisionHistoryRes {
    fn from(history: &RevisionHistory) -> Self {
        Self {
            items: history
                .all()
                .map(|entry| RevisionItemRes {
                    version_id: entry.version.to_string(),
                    audits: vec![AuditRes::from(entry)],
                })
                .collect(),
        }
    }
}

/// One version of a resource together with its commit metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct OriginalVersionRes {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preceding_version_uid: Option<String>,
    pub contribution: String,
    pub commit_audit: AuditRes,
    #[schema(value_type = Object)]
    pub data: Value,
}

impl OriginalVersionRes {
    pub fn new(entry: &RevisionEntry, data: Value) -> Self {
        Self {
            uid: entry.version.to_string(),
            preceding_version_uid: entry.preceding_version.as_ref().map(ToString::to_string),
            contribution: entry.contribution_id.to_string(),
            commit_audit: AuditRes::from(entry),
            data,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompositionRes {
    /// Full version id of the returned version.
    pub uid: String,
    pub ehr_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[schema(value_type = Object)]
    pub composition: Value,
}

/// Ad-hoc query body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryReq {
    pub q: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub query_parameters: BTreeMap<String, Value>,
    /// Number or numeric string; fractions are truncated.
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub offset: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub fetch: Option<Value>,
}

/// Stored query body; every field is optional.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct StoredQueryReq {
    #[schema(value_type = Object)]
    pub query_parameters: BTreeMap<String, Value>,
    #[schema(value_type = Option<i64>)]
    pub offset: Option<Value>,
    #[schema(value_type = Option<i64>)]
    pub fetch: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueryColumnRes {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueryRes {
    /// `name/version` of a stored query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub q: String,
    pub columns: Vec<QueryColumnRes>,
    #[schema(value_type = Vec<Vec<Object>>)]
    pub rows: Vec<Vec<Value>>,
}

impl From<QueryResponse> for QueryRes {
    fn from(response: QueryResponse) -> Self {
        Self {
            name: response.name,
            q: response.q,
            columns: response
                .columns
                .into_iter()
                .map(|QueryColumn { name, path }| QueryColumnRes { name, path })
                .collect(),
            rows: response.rows,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VersionAtTimeParams {
    /// RFC 3339 instant; latest version when absent.
    pub version_at_time: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DirectoryParams {
    /// RFC 3339 instant; latest version when absent.
    pub version_at_time: Option<String>,
    /// Slash-separated folder names below the root, e.g. `episodes/2024`.
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FolderPathParams {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CompositionCreateParams {
    pub ehr_id: String,
}
