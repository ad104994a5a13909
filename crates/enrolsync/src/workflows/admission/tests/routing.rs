use std::sync::atomic::Ordering;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::admission::domain::{Gender, LifecycleStage, RecordSource};
use crate::workflows::admission::router::admission_router;

fn batch_body() -> Value {
    json!({
        "institution": OUR_INSTITUTION,
        "username": "registrar",
        "password": "hunter2",
        "grade": "form1",
    })
}

async fn read_json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[tokio::test]
async fn post_admit_returns_the_batch_report() {
    let harness = build_harness(vec![
        candidate("cand-1", "Wanjiku Mary", Some("101"), Some("BC-1001"), Some(372), Some(Gender::Female)),
        candidate("cand-2", "Odhiambo Brian", Some("102"), Some("BC-1002"), Some(289), Some(Gender::Male)),
    ]);
    harness.portal.set_listing(vec![external_record(
        RecordSource::Portal,
        "Wanjiku Mary",
        Some("101"),
        Some("BC-1001"),
        Some(372),
        Some(OUR_INSTITUTION),
        Some(LifecycleStage::Admitted),
    )]);

    let router = admission_router(harness.service.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/admission/admit")
                .header("content-type", "application/json")
                .body(Body::from(batch_body().to_string()))
                .expect("request"),
        )
        .await
        .expect("router dispatch");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("action"), Some(&json!("admit")));
    assert_eq!(
        payload
            .get("succeeded")
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(1)
    );
    assert_eq!(
        payload
            .get("already_satisfied")
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(1)
    );
    assert!(payload
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .contains("1 succeeded"));
}

#[tokio::test]
async fn authentication_failures_map_to_bad_gateway() {
    let harness = build_harness(vec![candidate(
        "cand-1",
        "Wanjiku Mary",
        Some("101"),
        Some("BC-1001"),
        Some(372),
        Some(Gender::Female),
    )]);
    harness.portal.fail_login.store(true, Ordering::Relaxed);

    let router = admission_router(harness.service.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/admission/request")
                .header("content-type", "application/json")
                .body(Body::from(batch_body().to_string()))
                .expect("request"),
        )
        .await
        .expect("router dispatch");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let payload = read_json_body(response).await;
    assert!(payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .contains("authentication"));
}

#[tokio::test]
async fn candidate_status_endpoint_returns_stage_and_last_error() {
    let harness = build_harness(vec![candidate(
        "cand-1",
        "Wanjiku Mary",
        Some("101"),
        Some("BC-1001"),
        Some(372),
        Some(Gender::Female),
    )]);

    let router = admission_router(harness.service.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/admission/candidates/cand-1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router dispatch");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("stage"), Some(&json!("registered")));
    assert_eq!(payload.get("name"), Some(&json!("Wanjiku Mary")));
    assert!(payload.get("last_error").is_none());
}

#[tokio::test]
async fn unknown_candidate_returns_not_found() {
    let harness = build_harness(Vec::new());

    let router = admission_router(harness.service.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/admission/candidates/cand-missing")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router dispatch");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
