//! Integration tests for `/api/v1/bookings/*` views.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, TestHarness};
use staybook_core::entity::EntityKind;
use staybook_testing::fixtures::booking;

// ---------------------------------------------------------------------------
// Test: a full view embeds the three resolved entities
// ---------------------------------------------------------------------------

#[tokio::test]
async fn booking_view_embeds_resolved_entities() {
    let h = TestHarness::seeded(1);
    let response = get(h.app(), "/api/v1/bookings/1/view").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let view = &json["data"];
    assert_eq!(view["booking"]["id"], 1);
    assert_eq!(view["traveler"]["name"], "Tess");
    assert_eq!(view["owner"]["email"], "olga@example.com");
    assert_eq!(view["property"]["name"], "Alfama Loft");

    // Only the fields a view exposes survive projection.
    assert!(view["traveler"].get("password_hash").is_none());
    assert!(view["property"].get("internal_notes").is_none());
}

// ---------------------------------------------------------------------------
// Test: a deleted traveler becomes a placeholder, the view still succeeds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleted_traveler_renders_placeholder() {
    let h = TestHarness::seeded(1);
    h.entities.remove(EntityKind::Traveler, 1);

    let response = get(h.app(), "/api/v1/bookings/1/view").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["traveler"]["status"], "unavailable");
    assert_eq!(json["data"]["traveler"]["ref"]["kind"], "traveler");
    assert_eq!(json["data"]["traveler"]["ref"]["id"], 1);
    assert_eq!(json["data"]["owner"]["name"], "Olga");
}

// ---------------------------------------------------------------------------
// Test: an unreachable dependency fails the request with 503
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_owner_store_returns_503() {
    let h = TestHarness::seeded(1);
    h.entities.fail_next(EntityKind::Owner, u32::MAX);

    let response = get(h.app(), "/api/v1/bookings/1/view").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get("retry-after").unwrap(), "1");
    let json = body_json(response).await;
    assert_eq!(json["code"], "DEPENDENCY_UNAVAILABLE");
    let unresolved = json["details"]["unresolved"].as_array().unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0]["ref"]["kind"], "owner");
    assert_eq!(unresolved[0]["kind"], "unavailable");
    // Store diagnostics stay in the logs.
    assert!(unresolved[0].get("detail").is_none());

    // Three attempts, then give up.
    assert_eq!(h.entities.call_count(EntityKind::Owner), 3);
}

// ---------------------------------------------------------------------------
// Test: a transient fault is absorbed by retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_fault_is_retried_transparently() {
    let h = TestHarness::seeded(1);
    h.entities.fail_next(EntityKind::Property, 2);

    let response = get(h.app(), "/api/v1/bookings/1/view").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["property"]["name"], "Alfama Loft");
}

// ---------------------------------------------------------------------------
// Test: unknown booking is 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_booking_returns_404() {
    let h = TestHarness::seeded(1);
    let response = get(h.app(), "/api/v1/bookings/999/view").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: listing pages with limit/offset and batches lookups per kind
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_pages_with_limit_and_offset() {
    let h = TestHarness::seeded(30);

    let response = get(h.app(), "/api/v1/bookings/views?limit=10&offset=5").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let ids: Vec<i64> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["booking"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (6..=15).collect::<Vec<_>>());
    // One chunk, one lookup per entity kind.
    assert_eq!(h.entities.total_calls(), 3);
}

#[tokio::test]
async fn listing_limit_is_capped() {
    let h = TestHarness::seeded(120);

    let response = get(h.app(), "/api/v1/bookings/views?limit=500").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 100);
}

// ---------------------------------------------------------------------------
// Test: listing filters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_filters_by_traveler_and_sorts() {
    let h = TestHarness::seeded(3);
    h.entities
        .insert(EntityKind::Traveler, 2, staybook_testing::fixtures::person_doc("Tom"));
    h.bookings.insert(booking(4, 2, 10, 100));
    h.bookings.insert(booking(5, 2, 10, 100));

    let response = get(h.app(), "/api/v1/bookings/views?traveler_id=2&sort=-total_price").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["booking"]["id"], 5);
    assert_eq!(data[1]["booking"]["id"], 4);
    assert_eq!(data[0]["traveler"]["name"], "Tom");
}

#[tokio::test]
async fn inverted_date_range_returns_400() {
    let h = TestHarness::seeded(1);

    let response = get(h.app(), "/api/v1/bookings/views?from=2026-05-01&to=2026-04-01").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_FILTER");
}

#[tokio::test]
async fn unknown_status_returns_400() {
    let h = TestHarness::seeded(1);

    let response = get(h.app(), "/api/v1/bookings/views?status=archived").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: booking store outage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn booking_store_outage_returns_503() {
    let h = TestHarness::seeded(1);
    h.bookings.fail_next(1);

    let response = get(h.app(), "/api/v1/bookings/views").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "STORE_UNAVAILABLE");
}
