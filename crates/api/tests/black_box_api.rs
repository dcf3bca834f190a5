use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::json;

use stocktake_api::app::{build_router, AppServices};
use stocktake_audit::{Operator, Product};
use stocktake_core::{OperatorId, ProductId};
use stocktake_infra::DirectoryFixtures;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    fixtures: Fixtures,
}

#[derive(Clone)]
struct Fixtures {
    alice: Operator,
    bob: Operator,
    retired: Operator,
    tools: Product,
    paint: Product,
}

impl Fixtures {
    fn new() -> Self {
        let operator = |username: &str, is_active: bool| Operator {
            id: OperatorId::new(),
            username: username.to_string(),
            is_active,
        };
        let product = |code: &str, category: &str| Product {
            id: ProductId::new(),
            code: code.to_string(),
            name: format!("{code} item"),
            category_code: category.to_string(),
            location: "A-01".to_string(),
        };

        Self {
            alice: operator("alice", true),
            bob: operator("bob", true),
            retired: operator("retired", false),
            tools: product("P-100", "TOOLS"),
            paint: product("P-200", "PAINT"),
        }
    }

    fn directory(&self) -> DirectoryFixtures {
        DirectoryFixtures {
            products: vec![self.tools.clone(), self.paint.clone()],
            operators: vec![self.alice.clone(), self.bob.clone(), self.retired.clone()],
        }
    }
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory services, ephemeral port.
        let fixtures = Fixtures::new();
        let app = build_router(AppServices::in_memory(fixtures.directory()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            fixtures,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create_session(
    client: &reqwest::Client,
    srv: &TestServer,
    operator: &str,
) -> serde_json::Value {
    let res = client
        .post(srv.url("/sessions"))
        .json(&json!({ "operator": operator }))
        .send()
        .await
        .unwrap();
    if res.status() != StatusCode::CREATED {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        panic!("expected 201 Created, got {status} body={body}");
    }
    res.json().await.unwrap()
}

fn reading(tag: &str, product_code: &str) -> serde_json::Value {
    json!({
        "tag_id": tag,
        "product_code": product_code,
        "scanned_at": Utc::now().to_rfc3339(),
    })
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_session_by_username_or_id() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = create_session(&client, &srv, "alice").await;
    assert_eq!(created["status"], "open");
    assert_eq!(created["operator_id"], srv.fixtures.alice.id.to_string());
    assert!(created["ended_at"].is_null());

    // Close it, then open another one addressed by operator id.
    let id = created["id"].as_str().unwrap();
    let res = client
        .put(srv.url(&format!("/sessions/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let by_id = create_session(&client, &srv, &srv.fixtures.bob.id.to_string()).await;
    assert_eq!(by_id["operator_id"], srv.fixtures.bob.id.to_string());
}

#[tokio::test]
async fn create_session_rejects_unknown_inactive_and_blank_operators() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/sessions"))
        .json(&json!({ "operator": "nobody" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "operator_not_found");

    let res = client
        .post(srv.url("/sessions"))
        .json(&json!({ "operator": "retired" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "operator_inactive");

    let res = client
        .post(srv.url("/sessions"))
        .json(&json!({ "operator": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_one_session_can_be_open() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/sessions/open")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let first = create_session(&client, &srv, "alice").await;

    let res = client
        .post(srv.url("/sessions"))
        .json(&json!({ "operator": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "session_already_open");

    let res = client.get(srv.url("/sessions/open")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let open: serde_json::Value = res.json().await.unwrap();
    assert_eq!(open["id"], first["id"]);
}

#[tokio::test]
async fn readings_are_aggregated_and_repeated_tags_ignored() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let session = create_session(&client, &srv, "alice").await;
    let id = session["id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/sessions/{id}/readings")))
        .json(&json!([
            reading("T1", "P-100"),
            reading("T2", "P-100"),
            reading("T1", "P-100"),
            reading("T3", "P-200"),
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: serde_json::Value = res.json().await.unwrap();
    assert_eq!(detail["total_units"], 3);

    let readings = detail["readings"].as_array().unwrap();
    assert_eq!(readings.len(), 2);
    let tools = readings
        .iter()
        .find(|r| r["product_id"] == srv.fixtures.tools.id.to_string())
        .expect("tools row");
    assert_eq!(tools["quantity"], 2);
    assert_eq!(tools["category_code"], "TOOLS");

    // A later batch replaying an accepted tag changes nothing.
    let res = client
        .post(srv.url(&format!("/sessions/{id}/readings")))
        .json(&json!([reading("T2", "P-100")]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: serde_json::Value = res.json().await.unwrap();
    assert_eq!(detail["total_units"], 3);
}

#[tokio::test]
async fn unknown_product_fails_the_whole_batch() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let session = create_session(&client, &srv, "alice").await;
    let id = session["id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/sessions/{id}/readings")))
        .json(&json!([reading("T1", "P-100"), reading("T2", "NOPE")]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "product_not_found");

    let res = client
        .get(srv.url(&format!("/sessions/{id}")))
        .send()
        .await
        .unwrap();
    let detail: serde_json::Value = res.json().await.unwrap();
    assert_eq!(detail["readings"].as_array().unwrap().len(), 0);

    // T1 was not consumed by the failed batch.
    let res = client
        .post(srv.url(&format!("/sessions/{id}/readings")))
        .json(&json!([reading("T1", "P-100")]))
        .send()
        .await
        .unwrap();
    let detail: serde_json::Value = res.json().await.unwrap();
    assert_eq!(detail["total_units"], 1);
}

#[tokio::test]
async fn closed_sessions_reject_writes_and_second_close() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let session = create_session(&client, &srv, "alice").await;
    let id = session["id"].as_str().unwrap();

    let res = client
        .put(srv.url(&format!("/sessions/{id}/finalize")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let closed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(closed["status"], "finalized");
    assert!(!closed["ended_at"].is_null());

    let res = client
        .put(srv.url(&format!("/sessions/{id}/finalize")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .put(srv.url(&format!("/sessions/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url(&format!("/sessions/{id}/readings")))
        .json(&json!([reading("T9", "P-100")]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn events_are_logged_in_order_and_filterable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let session = create_session(&client, &srv, "alice").await;
    let id = session["id"].as_str().unwrap();
    let now = Utc::now();

    let res = client
        .post(srv.url(&format!("/sessions/{id}/events")))
        .json(&json!([
            { "kind": "pause", "description": "lunch", "occurred_at": now.to_rfc3339() },
            { "kind": "resume", "occurred_at": (now + ChronoDuration::minutes(30)).to_rfc3339() },
            { "kind": "pause", "description": "reader battery", "occurred_at": (now + ChronoDuration::minutes(45)).to_rfc3339() },
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: serde_json::Value = res.json().await.unwrap();
    let kinds: Vec<&str> = detail["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["pause", "resume", "pause"]);

    let res = client
        .get(srv.url(&format!("/sessions/{id}/events?kind=pause")))
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][1]["description"], "reader battery");

    let res = client
        .post(srv.url(&format!("/sessions/{id}/events")))
        .json(&json!([{ "kind": "", "occurred_at": now.to_rfc3339() }]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reading_listing_is_paginated_and_filtered() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let session = create_session(&client, &srv, "alice").await;
    let id = session["id"].as_str().unwrap();

    client
        .post(srv.url(&format!("/sessions/{id}/readings")))
        .json(&json!([reading("T1", "P-100"), reading("T2", "P-200")]))
        .send()
        .await
        .unwrap();

    let res = client
        .get(srv.url(&format!("/sessions/{id}/readings?limit=1")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["count"], 1);
    assert_eq!(page["total"], 2);
    assert_eq!(page["has_more"], true);

    let res = client
        .get(srv.url(&format!("/sessions/{id}/readings?category_code=PAINT")))
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["product_id"], srv.fixtures.paint.id.to_string());

    let res = client
        .get(srv.url(&format!("/sessions/{id}/readings?product_id=not-a-uuid")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_and_report_cover_closed_sessions() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let first = create_session(&client, &srv, "alice").await;
    let first_id = first["id"].as_str().unwrap();
    client
        .post(srv.url(&format!("/sessions/{first_id}/readings")))
        .json(&json!([reading("T1", "P-100"), reading("T2", "P-100")]))
        .send()
        .await
        .unwrap();
    client
        .put(srv.url(&format!("/sessions/{first_id}/finalize")))
        .send()
        .await
        .unwrap();

    let second = create_session(&client, &srv, "bob").await;
    let second_id = second["id"].as_str().unwrap();
    client
        .put(srv.url(&format!("/sessions/{second_id}/cancel")))
        .send()
        .await
        .unwrap();

    let res = client.get(srv.url("/reports/metrics")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let metrics: serde_json::Value = res.json().await.unwrap();
    assert_eq!(metrics["total_sessions"], 2);
    assert_eq!(metrics["finalized_sessions"], 1);
    assert_eq!(metrics["cancelled_sessions"], 1);
    assert_eq!(metrics["open_sessions"], 0);
    assert_eq!(metrics["per_operator"].as_array().unwrap().len(), 2);

    let res = client
        .get(srv.url(&format!("/reports/operators/{}", srv.fixtures.alice.id)))
        .send()
        .await
        .unwrap();
    let alice: serde_json::Value = res.json().await.unwrap();
    assert_eq!(alice["operator_name"], "alice");
    assert_eq!(alice["finalized_sessions"], 1);

    let res = client.get(srv.url("/reports/sessions")).send().await.unwrap();
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["summary"]["total_sessions"], 2);
    let rows = report["rows"].as_array().unwrap();
    let alice_row = rows
        .iter()
        .find(|r| r["session_id"] == first["id"])
        .expect("alice row");
    assert_eq!(alice_row["total_units"], 2);
    assert_eq!(alice_row["reading_rows"], 1);

    // Nothing started in the distant past.
    let res = client
        .get(srv.url("/reports/metrics?start=2000-01-01&end=2000-12-31"))
        .send()
        .await
        .unwrap();
    let empty: serde_json::Value = res.json().await.unwrap();
    assert_eq!(empty["total_sessions"], 0);
    assert_eq!(empty["avg_duration_minutes"], 0.0);
}

#[tokio::test]
async fn malformed_ids_and_dates_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/sessions/not-a-uuid")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");

    let res = client
        .get(srv.url("/reports/metrics?start=yesterday"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/reports/sessions?start=2024-02-01&end=2024-01-01"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url(&format!("/sessions/{}", stocktake_core::SessionId::new())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
