use crate::{router, AppState};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use vrs_core::query::{MemoryQueryRegistry, QueryVersion};
use vrs_core::{AuditDetails, ChangeType, CoreConfig, ObjectId, Storage};

const BASE: &str = "http://localhost:3000";

struct TestApp {
    app: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with(MemoryQueryRegistry::new(), None)
    }

    fn with(registry: MemoryQueryRegistry, api_key: Option<&str>) -> Self {
        let cfg = Arc::new(CoreConfig::in_memory());
        let storage = Storage::in_memory(cfg.node_name().clone());
        let state = AppState::new(cfg, storage, Arc::new(registry))
            .with_api_key(api_key.map(str::to_owned));
        Self {
            app: router(state.clone()),
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    fn new_ehr(&self) -> ObjectId {
        self.state
            .ehrs
            .create_ehr(None, AuditDetails::system(ChangeType::Creation))
            .expect("create ehr")
            .ehr_id
    }
}

fn request(
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("valid request")
}

async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}

fn etag(response: &Response) -> String {
    response
        .headers()
        .get(header::ETAG)
        .expect("etag")
        .to_str()
        .expect("text")
        .trim_matches('"')
        .to_owned()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location")
        .to_str()
        .expect("text")
        .to_owned()
}

fn tree() -> Value {
    json!({
        "_type": "FOLDER",
        "name": { "value": "root" },
        "folders": [{ "name": { "value": "episodes" } }]
    })
}

#[tokio::test]
async fn status_is_open_while_other_routes_need_the_key() {
    let test = TestApp::with(MemoryQueryRegistry::new(), Some("secret"));

    let response = test.send(request("GET", "/status", &[], None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ok"], json!(true));

    let response = test.send(request("POST", "/ehr", &[], None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = test
        .send(request("POST", "/ehr", &[("x-api-key", "secret")], None))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn create_ehr_returns_absolute_location() {
    let test = TestApp::new();

    let response = test.send(request("POST", "/ehr", &[], None)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let ehr_id = etag(&response);
    assert_eq!(location(&response), format!("{BASE}/ehr/{ehr_id}"));

    let response = test
        .send(request(
            "POST",
            "/ehr",
            &[("prefer", "return=representation")],
            None,
        ))
        .await;
    let body = json_body(response).await;
    assert!(body["ehr_id"].is_string());
    assert!(body.get("directory_id").is_none());
}

#[tokio::test]
async fn create_ehr_with_taken_id_conflicts() {
    let test = TestApp::new();
    let ehr_id = test.new_ehr();

    let response = test
        .send(request("PUT", &format!("/ehr/{ehr_id}"), &[], None))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"], json!("duplicate_ehr"));
}

#[tokio::test]
async fn directory_lifecycle_over_http() {
    let test = TestApp::new();
    let ehr_id = test.new_ehr();
    let uri = format!("/ehr/{ehr_id}/directory");

    let created = test
        .send(request(
            "POST",
            &uri,
            &[("prefer", "return=representation")],
            Some(tree()),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let v1 = etag(&created);
    assert_eq!(json_body(created).await["uid"]["value"], json!(v1));

    let missing = test
        .send(request(
            "PUT",
            &format!("{uri}?path=episodes"),
            &[],
            Some(json!({ "name": { "value": "episodes" } })),
        ))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(missing).await["error"],
        json!("missing_precondition")
    );

    let quoted_v1 = format!("\"{v1}\"");
    let updated = test
        .send(request(
            "PUT",
            &format!("{uri}?path=episodes"),
            &[("if-match", quoted_v1.as_str())],
            Some(json!({
                "name": { "value": "episodes" },
                "folders": [{ "name": { "value": "2024" } }]
            })),
        ))
        .await;
    assert_eq!(updated.status(), StatusCode::NO_CONTENT);
    let v2 = etag(&updated);
    assert_ne!(v1, v2);

    let stale = test
        .send(request("PUT", &uri, &[("if-match", v1.as_str())], Some(tree())))
        .await;
    assert_eq!(stale.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(etag(&stale), v2);
    assert_eq!(location(&stale), format!("{BASE}/ehr/{ehr_id}/directory/{v2}"));

    let nested = test
        .send(request("GET", &format!("{uri}?path=episodes/2024"), &[], None))
        .await;
    assert_eq!(nested.status(), StatusCode::OK);
    let nested = json_body(nested).await;
    assert_eq!(nested["name"]["value"], json!("2024"));
    assert!(nested.get("uid").is_none());

    let absent = test
        .send(request("GET", &format!("{uri}?path=nowhere"), &[], None))
        .await;
    assert_eq!(absent.status(), StatusCode::NO_CONTENT);

    let malformed = test
        .send(request("GET", &format!("{uri}?path=bad%21name"), &[], None))
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let deleted = test
        .send(request("DELETE", &uri, &[("if-match", v2.as_str())], None))
        .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = test.send(request("GET", &uri, &[], None)).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let first = test
        .send(request("GET", &format!("{uri}/{v1}"), &[], None))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["folders"][0]["name"]["value"], json!("episodes"));
}

#[tokio::test]
async fn ehr_status_versions_over_http() {
    let test = TestApp::new();
    let ehr_id = test.new_ehr();

    let too_early = test
        .send(request(
            "GET",
            &format!(
                "/ehr/{ehr_id}/versioned_ehr_status/version?version_at_time=2000-01-01T00:00:00Z"
            ),
            &[],
            None,
        ))
        .await;
    assert_eq!(too_early.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(too_early).await["reason"],
        json!("no_version_at_time")
    );

    let current = test
        .send(request("GET", &format!("/ehr/{ehr_id}/ehr_status"), &[], None))
        .await;
    assert_eq!(current.status(), StatusCode::OK);
    let v1 = etag(&current);
    assert_eq!(json_body(current).await["uid"]["value"], json!(v1));

    let status = json!({
        "_type": "EHR_STATUS",
        "archetype_node_id": "openEHR-EHR-EHR_STATUS.generic.v1",
        "name": { "value": "EHR Status" },
        "is_queryable": false,
        "is_modifiable": true
    });
    let updated = test
        .send(request(
            "PUT",
            &format!("/ehr/{ehr_id}/ehr_status"),
            &[("if-match", v1.as_str()), ("x-committer", "dr.who")],
            Some(status),
        ))
        .await;
    assert_eq!(updated.status(), StatusCode::NO_CONTENT);
    let v2 = etag(&updated);

    let history = test
        .send(request(
            "GET",
            &format!("/ehr/{ehr_id}/versioned_ehr_status/revision_history"),
            &[],
            None,
        ))
        .await;
    let history = json_body(history).await;
    assert_eq!(history["items"].as_array().expect("items").len(), 2);
    assert_eq!(history["items"][1]["audits"][0]["committer"], json!("dr.who"));

    let by_version = test
        .send(request(
            "GET",
            &format!("/ehr/{ehr_id}/versioned_ehr_status/version/{v1}"),
            &[],
            None,
        ))
        .await;
    assert_eq!(by_version.status(), StatusCode::OK);
    let by_version = json_body(by_version).await;
    assert_eq!(by_version["data"]["is_queryable"], json!(true));

    let bare = test
        .send(request(
            "GET",
            &format!("/ehr/{ehr_id}/versioned_ehr_status/version/{ehr_id}"),
            &[],
            None,
        ))
        .await;
    assert_eq!(bare.status(), StatusCode::BAD_REQUEST);
    assert_ne!(v1, v2);
}

#[tokio::test]
async fn adhoc_queries_page_and_report_no_content() {
    let test = TestApp::new();
    let ehr_id = test.new_ehr();

    let empty = test
        .send(request(
            "POST",
            "/query/aql",
            &[],
            Some(json!({ "q": "SELECT c FROM COMPOSITION c" })),
        ))
        .await;
    assert_eq!(empty.status(), StatusCode::NO_CONTENT);

    let created = test
        .send(request(
            "POST",
            &format!("/composition?ehr_id={ehr_id}"),
            &[],
            Some(json!({ "archetype_details": { "template_id": { "value": "vitals" } } })),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let rows = test
        .send(request(
            "POST",
            "/query/aql",
            &[],
            Some(json!({ "q": "SELECT c FROM COMPOSITION c", "offset": 0, "fetch": "1.9" })),
        ))
        .await;
    assert_eq!(rows.status(), StatusCode::OK);
    let rows = json_body(rows).await;
    assert_eq!(rows["q"], json!("SELECT c FROM COMPOSITION c LIMIT 1 OFFSET 0"));
    assert_eq!(rows["rows"][0][0], json!(ehr_id.to_string()));
    assert_eq!(rows["rows"][0][2], json!("vitals"));

    let no_text = test.send(request("GET", "/query/aql", &[], None)).await;
    assert_eq!(no_text.status(), StatusCode::BAD_REQUEST);

    let negative = test
        .send(request("GET", "/query/aql?q=SELECT%20c&fetch=-1", &[], None))
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stored_queries_resolve_by_version() {
    let registry = MemoryQueryRegistry::new();
    registry
        .register(
            "org.example::all",
            QueryVersion::parse("1.0.0").expect("version"),
            "SELECT c FROM COMPOSITION c",
        )
        .expect("register");
    let test = TestApp::with(registry, None);

    let latest = test
        .send(request("GET", "/query/org.example::all", &[], None))
        .await;
    assert_eq!(latest.status(), StatusCode::OK);
    let latest = json_body(latest).await;
    assert_eq!(latest["name"], json!("org.example::all/1.0.0"));
    assert_eq!(latest["rows"], json!([]));

    let pinned = test
        .send(request("POST", "/query/org.example::all/1", &[], None))
        .await;
    assert_eq!(pinned.status(), StatusCode::OK);

    let unknown = test
        .send(request("GET", "/query/org.example::all/2", &[], None))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(unknown).await["error"], json!("query_not_found"));
}

#[tokio::test]
async fn composition_lifecycle_over_http() {
    let test = TestApp::new();
    let ehr_id = test.new_ehr();

    let created = test
        .send(request(
            "POST",
            &format!("/composition?ehr_id={ehr_id}"),
            &[],
            Some(json!({ "content": [] })),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let v1 = etag(&created);
    assert!(v1.ends_with("::1"));
    let bare = v1.split("::").next().expect("object id").to_owned();

    let fetched = test
        .send(request("GET", &format!("/composition/{bare}"), &[], None))
        .await;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(json_body(fetched).await["uid"], json!(v1));

    let updated = test
        .send(request(
            "PUT",
            &format!("/composition/{v1}"),
            &[("prefer", "return=representation")],
            Some(json!({ "content": [1] })),
        ))
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let v2 = etag(&updated);
    let updated = json_body(updated).await;
    assert_eq!(updated["ehr_id"], json!(ehr_id.to_string()));
    assert_eq!(updated["composition"]["content"], json!([1]));

    let stale = test
        .send(request(
            "PUT",
            &format!("/composition/{v1}"),
            &[],
            Some(json!({ "content": [2] })),
        ))
        .await;
    assert_eq!(stale.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(etag(&stale), v2);

    let unguarded = test
        .send(request("DELETE", &format!("/composition/{bare}"), &[], None))
        .await;
    assert_eq!(unguarded.status(), StatusCode::BAD_REQUEST);

    let deleted = test
        .send(request(
            "DELETE",
            &format!("/composition/{bare}"),
            &[("if-match", v2.as_str())],
            None,
        ))
        .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = test
        .send(request("GET", &format!("/composition/{bare}"), &[], None))
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}
