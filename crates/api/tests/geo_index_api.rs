//! Integration tests for `/api/v1/admin/geo-index`.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{body_json, get, post, TestHarness};
use staybook_core::geo_index::IndexState;

// ---------------------------------------------------------------------------
// Test: status of a never-built index
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_starts_absent() {
    let h = TestHarness::new();

    let response = get(h.app(), "/api/v1/admin/geo-index").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["state"], "absent");
    assert_eq!(json["data"]["key_spec"], "properties.location:2dsphere");
    assert!(json["data"]["lease"].is_null());
    assert!(json["data"]["physical"].is_null());
}

// ---------------------------------------------------------------------------
// Test: ensure builds, then is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ensure_is_idempotent() {
    let h = TestHarness::new().with_properties();

    let first = body_json(post(h.app(), "/api/v1/admin/geo-index/ensure").await).await;
    assert_eq!(first["data"]["outcome"], "built");

    let second = body_json(post(h.app(), "/api/v1/admin/geo-index/ensure").await).await;
    assert_eq!(second["data"]["outcome"], "already_active");

    assert_eq!(h.index_admin.create_calls(), 1);
    let status = body_json(get(h.app(), "/api/v1/admin/geo-index").await).await;
    assert_eq!(status["data"]["state"], "active");
    assert_eq!(status["data"]["physical"]["is_valid"], true);
}

// ---------------------------------------------------------------------------
// Test: a held lease defers the operation with 202
// ---------------------------------------------------------------------------

#[tokio::test]
async fn held_lease_defers_with_202() {
    let h = TestHarness::new();
    h.index_catalog.plant_lease(
        &h.spec.key_spec(),
        "other-instance",
        Utc::now() + chrono::Duration::seconds(60),
    );

    let response = post(h.app(), "/api/v1/admin/geo-index/ensure").await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "deferred");
    assert!(json["data"]["reason"].as_str().unwrap().contains("other-instance"));
    assert_eq!(h.index_admin.create_calls(), 0);
}

// ---------------------------------------------------------------------------
// Test: build failure rolls back and reports 500
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_build_returns_500_and_rolls_back() {
    let h = TestHarness::new();
    h.index_admin.fail_next_creates(1);

    let response = post(h.app(), "/api/v1/admin/geo-index/ensure").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INDEX_BUILD_FAILED");
    assert_eq!(h.index_catalog.state(&h.spec), IndexState::Absent);
}

// ---------------------------------------------------------------------------
// Test: retire takes the index out of service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retire_returns_searches_to_fallback() {
    let h = TestHarness::new().with_properties();
    post(h.app(), "/api/v1/admin/geo-index/ensure").await;

    let response = post(h.app(), "/api/v1/admin/geo-index/retire").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "retired");

    assert!(!h.index_admin.has_index(&h.spec.index_name()));
    let search = body_json(
        get(h.app(), "/api/v1/properties/near?lat=38.7223&lng=-9.1393&radius_km=20").await,
    )
    .await;
    assert_eq!(search["data"]["plan"]["strategy"], "fallback");
}

// ---------------------------------------------------------------------------
// Test: reconcile repairs a crashed build
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_rolls_back_crashed_build() {
    let h = TestHarness::new();
    h.index_catalog.set_state(&h.spec, IndexState::Building);
    h.index_admin
        .plant_index("properties", &h.spec.index_name(), false);

    let response = post(h.app(), "/api/v1/admin/geo-index/reconcile").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["before"], "building");
    assert_eq!(json["data"]["after"], "absent");
    assert!(!h.index_admin.has_index(&h.spec.index_name()));
}
