//! Index-aware property radius search.
//!
//! A search is served by the geospatial index only while the index is
//! `active`. In every other state, or if the indexed query fails, it runs as
//! a bounding-box scan. Both paths finish with the same exact distance
//! filter and ordering, so they return identical results.

use std::sync::Arc;

use serde::Serialize;
use staybook_core::error::SearchError;
use staybook_core::geo::{validate_radius, BoundingBox, GeoPoint, QueryPlan};
use staybook_core::geo_index::{GeoIndexSpec, IndexState};
use staybook_core::property::{rank_by_distance, Property, PropertyFilter, PropertyMatch};
use staybook_core::store::PropertyStore;

use super::geo_index::GeoIndexManager;

/// Results of a radius search and the plan that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySearch {
    pub plan: QueryPlan,
    pub properties: Vec<PropertyMatch>,
}

/// Choose a plan given the index's lifecycle state.
pub fn plan_for_state(spec: &GeoIndexSpec, state: IndexState, center: GeoPoint, radius_km: f64) -> QueryPlan {
    if state.is_queryable() {
        QueryPlan::Indexed {
            index_name: spec.index_name(),
            center,
            radius_km,
        }
    } else {
        fallback_plan(state, center, radius_km)
    }
}

fn fallback_plan(index_state: IndexState, center: GeoPoint, radius_km: f64) -> QueryPlan {
    QueryPlan::Fallback {
        bbox: BoundingBox::around(center, radius_km),
        center,
        radius_km,
        index_state,
    }
}

pub struct GeoQueryPlanner {
    properties: Arc<dyn PropertyStore>,
    index: Arc<GeoIndexManager>,
}

impl GeoQueryPlanner {
    pub fn new(properties: Arc<dyn PropertyStore>, index: Arc<GeoIndexManager>) -> Self {
        Self { properties, index }
    }

    pub async fn plan_geo_query(&self, center: GeoPoint, radius_km: f64) -> Result<QueryPlan, SearchError> {
        center.validate()?;
        validate_radius(radius_km)?;
        let state = self.index.current_state().await;
        Ok(plan_for_state(self.index.spec(), state, center, radius_km))
    }

    /// Properties within `radius_km` of `center` matching `filter`, nearest
    /// first.
    pub async fn search_properties_near(
        &self,
        center: GeoPoint,
        radius_km: f64,
        filter: &PropertyFilter,
    ) -> Result<PropertySearch, SearchError> {
        filter.validate()?;
        let mut plan = self.plan_geo_query(center, radius_km).await?;

        let indexed = match &plan {
            QueryPlan::Indexed { index_name, .. } => Some(
                self.properties
                    .query_within_radius(index_name, center, radius_km, filter)
                    .await,
            ),
            QueryPlan::Fallback { .. } => None,
        };
        let rows = match indexed {
            Some(Ok(rows)) => rows,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Indexed property query failed, falling back to scan");
                plan = fallback_plan(IndexState::Active, center, radius_km);
                self.scan(&plan, filter).await?
            }
            None => self.scan(&plan, filter).await?,
        };

        let properties = rank_by_distance(center, radius_km, rows);
        tracing::debug!(
            indexed = plan.is_indexed(),
            radius_km,
            results = properties.len(),
            "Property radius search"
        );
        Ok(PropertySearch { plan, properties })
    }

    async fn scan(&self, plan: &QueryPlan, filter: &PropertyFilter) -> Result<Vec<Property>, SearchError> {
        let bbox = match plan {
            QueryPlan::Fallback { bbox, .. } => *bbox,
            QueryPlan::Indexed { center, radius_km, .. } => BoundingBox::around(*center, *radius_km),
        };
        Ok(self.properties.query_bounding_box(&bbox, filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use staybook_core::types::DbId;
    use staybook_testing::fixtures::property_at;
    use staybook_testing::{InMemoryIndexAdmin, InMemoryIndexCatalog, InMemoryPropertyStore};

    use super::*;
    use crate::config::GeoIndexConfig;

    const LISBON: GeoPoint = GeoPoint { lat: 38.7223, lng: -9.1393 };

    struct Harness {
        spec: GeoIndexSpec,
        catalog: InMemoryIndexCatalog,
        properties: InMemoryPropertyStore,
        manager: Arc<GeoIndexManager>,
        planner: GeoQueryPlanner,
    }

    fn harness() -> Harness {
        let spec = GeoIndexSpec::property_location();
        let catalog = InMemoryIndexCatalog::new();
        let admin = InMemoryIndexAdmin::new();
        let properties = InMemoryPropertyStore::new();
        properties.link_index_admin(admin.clone());

        properties.insert(property_at(1, 38.7223, -9.1393));
        properties.insert(property_at(2, 38.75, -9.14));
        properties.insert(property_at(3, 38.9, -9.3));
        // Inside the bounding box of a 20 km search but outside the circle.
        properties.insert(property_at(4, 38.7223 + 0.17, -9.1393 + 0.21));
        properties.insert(property_at(5, 41.1579, -8.6291));

        let config = GeoIndexConfig {
            retire_grace_secs: 0,
            ..Default::default()
        };
        let manager = Arc::new(GeoIndexManager::new(
            spec.clone(),
            Arc::new(catalog.clone()),
            Arc::new(admin),
            Arc::new(properties.clone()),
            &config,
        ));
        let planner = GeoQueryPlanner::new(Arc::new(properties.clone()), Arc::clone(&manager));
        Harness {
            spec,
            catalog,
            properties,
            manager,
            planner,
        }
    }

    fn ids(search: &PropertySearch) -> Vec<DbId> {
        search.properties.iter().map(|m| m.property.id).collect()
    }

    #[test]
    fn only_active_state_plans_indexed() {
        let spec = GeoIndexSpec::property_location();
        for state in [IndexState::Absent, IndexState::Building, IndexState::Retiring] {
            let plan = plan_for_state(&spec, state, LISBON, 10.0);
            assert_matches!(plan, QueryPlan::Fallback { index_state, .. } if index_state == state);
        }
        assert_matches!(
            plan_for_state(&spec, IndexState::Active, LISBON, 10.0),
            QueryPlan::Indexed { index_name, .. } if index_name == spec.index_name()
        );
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let h = harness();
        assert_matches!(
            h.planner.plan_geo_query(GeoPoint::new(95.0, 0.0), 10.0).await,
            Err(SearchError::InvalidQuery(_))
        );
        assert_matches!(
            h.planner.plan_geo_query(LISBON, 0.0).await,
            Err(SearchError::InvalidQuery(_))
        );
        let bad_filter = PropertyFilter {
            guests: Some(0),
            ..Default::default()
        };
        assert_matches!(
            h.planner.search_properties_near(LISBON, 10.0, &bad_filter).await,
            Err(SearchError::InvalidQuery(_))
        );
    }

    #[tokio::test]
    async fn results_are_identical_before_and_after_activation() {
        let h = harness();
        let filter = PropertyFilter::default();

        let before = h.planner.search_properties_near(LISBON, 20.0, &filter).await.unwrap();
        assert!(!before.plan.is_indexed());

        h.manager.ensure_index().await.unwrap();
        let after = h.planner.search_properties_near(LISBON, 20.0, &filter).await.unwrap();
        assert!(after.plan.is_indexed());

        assert_eq!(ids(&before), vec![1, 2]);
        assert_eq!(ids(&before), ids(&after));
    }

    #[tokio::test]
    async fn building_index_is_not_used() {
        let h = harness();
        h.catalog.set_state(&h.spec, IndexState::Building);

        let search = h
            .planner
            .search_properties_near(LISBON, 20.0, &PropertyFilter::default())
            .await
            .unwrap();
        assert_matches!(search.plan, QueryPlan::Fallback { index_state: IndexState::Building, .. });
        assert_eq!(h.properties.indexed_calls(), 0);
    }

    #[tokio::test]
    async fn retiring_index_is_not_used() {
        let h = harness();
        h.manager.ensure_index().await.unwrap();
        h.catalog.set_state(&h.spec, IndexState::Retiring);
        let indexed_before = h.properties.indexed_calls();

        let search = h
            .planner
            .search_properties_near(LISBON, 20.0, &PropertyFilter::default())
            .await
            .unwrap();
        assert!(!search.plan.is_indexed());
        assert_eq!(h.properties.indexed_calls(), indexed_before);
        assert_eq!(ids(&search), vec![1, 2]);
    }

    #[tokio::test]
    async fn failed_indexed_query_falls_back_to_scan() {
        let h = harness();
        h.manager.ensure_index().await.unwrap();
        h.properties.fail_indexed_queries(1);

        let search = h
            .planner
            .search_properties_near(LISBON, 20.0, &PropertyFilter::default())
            .await
            .unwrap();
        assert_matches!(search.plan, QueryPlan::Fallback { index_state: IndexState::Active, .. });
        assert_eq!(ids(&search), vec![1, 2]);
    }

    #[tokio::test]
    async fn results_are_nearest_first_with_distances() {
        let h = harness();
        let search = h
            .planner
            .search_properties_near(LISBON, 50.0, &PropertyFilter::default())
            .await
            .unwrap();

        assert_eq!(ids(&search), vec![1, 2, 3, 4]);
        assert_eq!(search.properties[0].distance_km, 0.0);
        assert!(search
            .properties
            .windows(2)
            .all(|w| w[0].distance_km <= w[1].distance_km));
    }
}
