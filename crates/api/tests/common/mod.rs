#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use staybook_api::config::{GeoIndexConfig, ResolverConfig, ServerConfig};
use staybook_api::router::build_app_router;
use staybook_api::state::{AppState, StoreSet};
use staybook_core::entity::EntityKind;
use staybook_core::geo_index::GeoIndexSpec;
use staybook_testing::fixtures::{booking, person_doc, property_at, property_doc};
use staybook_testing::{
    InMemoryBookingStore, InMemoryEntityStore, InMemoryIndexAdmin, InMemoryIndexCatalog,
    InMemoryPropertyStore, StaticHealth,
};

/// Build a test `ServerConfig` with safe defaults.
///
/// Retries are kept at three attempts but with a 1 ms initial backoff so
/// dependency-failure tests stay fast; retirement has no drain window.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        db_max_connections: 5,
        resolver: ResolverConfig {
            initial_backoff_ms: 1,
            ..Default::default()
        },
        geo_index: GeoIndexConfig {
            retire_grace_secs: 0,
            instance_id: "test".to_string(),
            ..Default::default()
        },
    }
}

/// In-memory stores behind a full application router.
///
/// Keep the harness around to seed data and inject faults; `app()` hands out
/// a fresh router over the same stores for each request.
pub struct TestHarness {
    pub entities: InMemoryEntityStore,
    pub bookings: InMemoryBookingStore,
    pub properties: InMemoryPropertyStore,
    pub index_admin: InMemoryIndexAdmin,
    pub index_catalog: InMemoryIndexCatalog,
    pub health: StaticHealth,
    pub spec: GeoIndexSpec,
    state: AppState,
}

impl TestHarness {
    pub fn new() -> Self {
        let entities = InMemoryEntityStore::new();
        let bookings = InMemoryBookingStore::new();
        let properties = InMemoryPropertyStore::new();
        let index_admin = InMemoryIndexAdmin::new();
        let index_catalog = InMemoryIndexCatalog::new();
        let health = StaticHealth::default();
        properties.link_index_admin(index_admin.clone());

        let stores = StoreSet {
            entities: Arc::new(entities.clone()),
            bookings: Arc::new(bookings.clone()),
            properties: Arc::new(properties.clone()),
            index_admin: Arc::new(index_admin.clone()),
            index_catalog: Arc::new(index_catalog.clone()),
            health: Arc::new(health.clone()),
        };
        let state = AppState::new(Arc::new(test_config()), &stores);

        Self {
            entities,
            bookings,
            properties,
            index_admin,
            index_catalog,
            health,
            spec: GeoIndexSpec::property_location(),
            state,
        }
    }

    /// Traveler 1, owner 10 and property 100 near Lisbon, plus `count`
    /// bookings (ids `1..=count`) that reference them.
    pub fn seeded(count: i64) -> Self {
        let harness = Self::new();
        harness.entities.insert(EntityKind::Traveler, 1, person_doc("Tess"));
        harness.entities.insert(EntityKind::Owner, 10, person_doc("Olga"));
        harness
            .entities
            .insert(EntityKind::Property, 100, property_doc("Alfama Loft", 38.7115, -9.1300));
        for id in 1..=count {
            harness.bookings.insert(booking(id, 1, 10, 100));
        }
        harness
    }

    /// Properties around Lisbon plus one in Porto.
    pub fn with_properties(self) -> Self {
        self.properties.insert(property_at(1, 38.7223, -9.1393));
        self.properties.insert(property_at(2, 38.75, -9.14));
        self.properties.insert(property_at(3, 38.9, -9.3));
        self.properties.insert(property_at(4, 41.1579, -8.6291));
        self
    }

    pub fn app(&self) -> Router {
        build_app_router(self.state.clone(), &test_config())
    }
}

/// Send a GET request and return the response.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

/// Send an empty POST request and return the response.
pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri).await
}

async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
