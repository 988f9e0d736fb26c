//! API executor against a local mock server

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testforge_common::TestSuite;
use testforge_engine::reporter::Status;
use testforge_engine::{ApiExecutor, EngineError, PreProcessor, VariableStore};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn suite(base_url: &str, case: serde_json::Value) -> TestSuite {
    serde_json::from_value(json!({
        "id": "s-api",
        "suiteName": "Accounts API",
        "type": "API",
        "baseUrl": base_url,
        "testCases": [case]
    }))
    .unwrap()
}

fn executor(vars: &VariableStore) -> ApiExecutor {
    ApiExecutor::new(vars.clone(), Arc::new(PreProcessor::default()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_rest_assertions_and_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("x-tenant", "acme"))
        .and(body_json(json!({"name": "alice"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 7,
            "name": "alice",
            "roles": ["admin", "ops"]
        })))
        .mount(&server)
        .await;

    let vars = VariableStore::new();
    vars.set_global("tenant", "acme");
    vars.set_global("user", "alice");

    let suite = suite(
        &server.uri(),
        json!({
            "id": "tc-create",
            "name": "Create user",
            "type": "REST",
            "testData": [{
                "name": "create alice",
                "method": "POST",
                "endpoint": "/users",
                "headers": {"x-tenant": "{{tenant}}"},
                "body": {"name": "{{user}}"},
                "assertions": [
                    {"type": "statusCode", "expected": 201},
                    {"type": "equals", "jsonPath": "$.name", "expected": "{{user}}"},
                    {"type": "contains", "jsonPath": "$.roles", "expected": "ops"}
                ],
                "store": {"userId": "$.id"}
            }]
        }),
    );

    let entries = executor(&vars).run_suite(&suite).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.status, Status::Pass, "{:?}", entry.error);
    assert_eq!(entry.assertions_passed, 3);
    assert_eq!(entry.assertions_failed, 0);
    assert_eq!(entry.response.as_ref().unwrap().status, 201);
    assert_eq!(vars.get_global("userId").as_deref(), Some("7"));
}

#[tokio::test]
async fn test_failed_assertions_keep_evaluating() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "active": false})))
        .mount(&server)
        .await;

    let vars = VariableStore::new();
    let suite = suite(
        &server.uri(),
        json!({
            "id": "tc-get",
            "name": "Get user",
            "type": "REST",
            "testData": [{
                "endpoint": "/users/1",
                "assertions": [
                    {"type": "statusCode", "expected": 404},
                    {"type": "equals", "jsonPath": "$.active", "expected": true},
                    {"type": "equals", "jsonPath": "$.id", "expected": 1}
                ]
            }]
        }),
    );

    let entries = executor(&vars).run_suite(&suite).await;
    let entry = &entries[0];
    assert_eq!(entry.status, Status::Fail);
    assert_eq!(entry.name, "GET /users/1");
    assert_eq!(entry.assertions_passed, 1);
    assert_eq!(entry.assertions_failed, 2);
    assert!(entry.error.as_ref().unwrap().contains("statusCode"));
}

#[tokio::test]
async fn test_soap_request_uses_xpath() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ws"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<Envelope><Body><GetUserResponse><Name>alice</Name></GetUserResponse></Body></Envelope>",
        ))
        .mount(&server)
        .await;

    let vars = VariableStore::new();
    let suite = suite(
        &server.uri(),
        json!({
            "id": "tc-soap",
            "name": "Get user over SOAP",
            "type": "REST",
            "testData": [{
                "method": "POST",
                "endpoint": "/ws",
                "headers": {"Content-Type": "text/xml; charset=utf-8"},
                "body": "<Envelope><Body><GetUser><Id>1</Id></GetUser></Body></Envelope>",
                "responseSchema": {"type": "object"},
                "assertions": [
                    {"type": "statusCode", "expected": 200},
                    {"type": "equals", "xpathExpression": "//Name", "expected": "alice"},
                    {"type": "contains", "xpathExpression": "//Missing", "expected": "x"}
                ]
            }]
        }),
    );

    let entries = executor(&vars).run_suite(&suite).await;
    let entry = &entries[0];
    assert_eq!(entry.status, Status::Fail);
    assert_eq!(entry.assertions_passed, 2);
    assert_eq!(entry.assertions_failed, 1);
    assert!(entry.error.as_ref().unwrap().contains("No node matched"));
}

#[tokio::test]
async fn test_schema_violation_fails_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": "12"})))
        .mount(&server)
        .await;

    let vars = VariableStore::new();
    let suite = suite(
        &server.uri(),
        json!({
            "id": "tc-orders",
            "name": "Orders",
            "type": "REST",
            "testData": [{
                "endpoint": "/orders",
                "responseSchema": {
                    "type": "object",
                    "properties": {"total": {"type": "number"}},
                    "required": ["total"]
                }
            }]
        }),
    );

    let entries = executor(&vars).run_suite(&suite).await;
    assert_eq!(entries[0].status, Status::Fail);
    assert!(entries[0].assertions_failed >= 1);
}

#[tokio::test]
async fn test_transport_error_is_reported() {
    let vars = VariableStore::new();
    let suite = suite(
        "http://127.0.0.1:1",
        json!({
            "id": "tc-down",
            "name": "Unreachable",
            "type": "REST",
            "testData": [{"endpoint": "/health"}, {"endpoint": "/ready"}]
        }),
    );

    let entries = executor(&vars).run_suite(&suite).await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == Status::Fail));
    assert!(entries.iter().all(|e| e.response.is_none() && e.error.is_some()));
}

#[tokio::test]
async fn test_body_file_relative_to_suite() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/users/9"))
        .and(body_json(json!({"email": "bob@example.com"})))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("update.json"), r#"{"email": "{{email}}"}"#).unwrap();

    let vars = VariableStore::new();
    vars.set_global("email", "bob@example.com");
    let suite = suite(
        &server.uri(),
        json!({
            "id": "tc-update",
            "name": "Update user",
            "type": "REST",
            "testData": [{
                "method": "PUT",
                "endpoint": "/users/9",
                "bodyFile": "update.json",
                "assertions": [{"type": "statusCode", "expected": 204}]
            }]
        }),
    );

    let entries = executor(&vars).with_base_dir(dir.path()).run_suite(&suite).await;
    assert_eq!(entries[0].status, Status::Pass, "{:?}", entries[0].error);
}

#[tokio::test]
async fn test_url_resolves_before_pre_processors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/1"))
        .and(header("x-order", "fixed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let vars = VariableStore::new();
    vars.set_global("orderId", "1");

    let suite = suite(
        &server.uri(),
        json!({
            "id": "tc-order",
            "name": "Order lookup",
            "type": "REST",
            "testData": [{
                "endpoint": "/orders/{{orderId}}",
                "headers": {"x-order": "{{orderId}}"},
                "preProcess": [{"function": "currentTimestamp", "args": ["fixed"], "var": "orderId"}],
                "assertions": [{"type": "statusCode", "expected": 200}]
            }]
        }),
    );

    let entries = executor(&vars).run_suite(&suite).await;
    assert_eq!(entries[0].status, Status::Pass, "{:?}", entries[0].error);
    assert_eq!(vars.get_global("orderId").as_deref(), Some("fixed"));
}

#[tokio::test]
async fn test_bad_timestamp_format_fails_only_its_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"up": true})))
        .mount(&server)
        .await;

    let vars = VariableStore::new();
    let suite = suite(
        &server.uri(),
        json!({
            "id": "tc-health",
            "name": "Health",
            "type": "REST",
            "testData": [
                {
                    "name": "stamped",
                    "endpoint": "/health",
                    "preProcess": [{"function": "currentTimestamp", "args": ["%Q"], "var": "stamp"}],
                    "assertions": [{"type": "statusCode", "expected": 200}]
                },
                {
                    "name": "plain",
                    "endpoint": "/health",
                    "assertions": [{"type": "statusCode", "expected": 200}]
                }
            ]
        }),
    );

    let entries = executor(&vars).run_suite(&suite).await;
    let statuses: Vec<Status> = entries.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![Status::Fail, Status::Pass]);
    assert!(entries[0].error.as_ref().unwrap().contains("invalid timestamp format"));
    assert!(entries[0].response.is_none());
}

#[tokio::test]
async fn test_out_of_range_test_data_index() {
    let vars = VariableStore::new();
    let suite = suite(
        "http://127.0.0.1:1",
        json!({
            "id": "tc-one",
            "name": "Single item",
            "type": "REST",
            "testData": [{"endpoint": "/one"}]
        }),
    );

    let err = executor(&vars)
        .run_test_data(&suite, &suite.test_cases[0], 3)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TestDataNotFound { ref data, .. } if data == "3"));
}
