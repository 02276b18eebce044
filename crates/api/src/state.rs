use std::sync::Arc;

use staybook_core::geo_index::GeoIndexSpec;
use staybook_core::store::{BookingStore, EntityStore, IndexAdmin, IndexCatalog, PropertyStore, StoreHealth};
use staybook_db::stores::PgStore;
use staybook_db::DbPool;

use crate::config::ServerConfig;
use crate::engine::{BookingAggregator, EntityResolver, GeoIndexManager, GeoQueryPlanner, ResolutionCache};

/// The store implementations the engine runs against.
///
/// Production wires every seam to one [`PgStore`]; integration tests swap in
/// the in-memory stores from `staybook-testing`.
#[derive(Clone)]
pub struct StoreSet {
    pub entities: Arc<dyn EntityStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub properties: Arc<dyn PropertyStore>,
    pub index_admin: Arc<dyn IndexAdmin>,
    pub index_catalog: Arc<dyn IndexCatalog>,
    pub health: Arc<dyn StoreHealth>,
}

impl StoreSet {
    pub fn postgres(pool: DbPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            entities: store.clone(),
            bookings: store.clone(),
            properties: store.clone(),
            index_admin: store.clone(),
            index_catalog: store.clone(),
            health: store,
        }
    }
}

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (everything is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Booking views (bookings + resolved foreign entities).
    pub aggregator: Arc<BookingAggregator>,
    /// Property radius search.
    pub planner: Arc<GeoQueryPlanner>,
    /// Lifecycle of the property location index.
    pub geo_index: Arc<GeoIndexManager>,
    /// Lease records, swept by a background task.
    pub index_catalog: Arc<dyn IndexCatalog>,
    pub health: Arc<dyn StoreHealth>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, stores: &StoreSet) -> Self {
        let mut resolver = EntityResolver::new(stores.entities.clone(), config.resolver.retry_policy());
        if let Some(ttl) = config.resolver.cache_ttl() {
            resolver = resolver.with_cache(ResolutionCache::new(ttl, config.resolver.cache_capacity));
        }
        let aggregator = BookingAggregator::new(stores.bookings.clone(), Arc::new(resolver));

        let geo_index = Arc::new(GeoIndexManager::new(
            GeoIndexSpec::property_location(),
            stores.index_catalog.clone(),
            stores.index_admin.clone(),
            stores.properties.clone(),
            &config.geo_index,
        ));
        let planner = GeoQueryPlanner::new(stores.properties.clone(), geo_index.clone());

        Self {
            config,
            aggregator: Arc::new(aggregator),
            planner: Arc::new(planner),
            geo_index,
            index_catalog: stores.index_catalog.clone(),
            health: stores.health.clone(),
        }
    }
}
