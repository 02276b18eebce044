//! Booking views: bookings joined with their traveler, owner and property.
//!
//! There is no cross-service transaction. A view reflects whatever each
//! service returned at resolution time: an entity deleted by its owning
//! service becomes a placeholder, while an entity that could not be read
//! fails the view so the caller can retry.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use staybook_core::booking::{Booking, BookingFilter, BookingView, Page, RESOLVE_CHUNK_SIZE};
use staybook_core::entity::ForeignEntityRef;
use staybook_core::error::{AggregationError, ResolutionErrorKind};
use staybook_core::reference::ResolutionMap;
use staybook_core::store::BookingStore;
use staybook_core::types::DbId;
use tokio_util::sync::CancellationToken;

use super::resolver::EntityResolver;

pub struct BookingAggregator {
    bookings: Arc<dyn BookingStore>,
    resolver: Arc<EntityResolver>,
}

impl BookingAggregator {
    pub fn new(bookings: Arc<dyn BookingStore>, resolver: Arc<EntityResolver>) -> Self {
        Self { bookings, resolver }
    }

    /// One booking with its three foreign entities resolved.
    pub async fn get_booking_view(
        &self,
        id: DbId,
        cancel: &CancellationToken,
    ) -> Result<BookingView, AggregationError> {
        if cancel.is_cancelled() {
            return Err(AggregationError::Cancelled);
        }
        let booking = self
            .bookings
            .find(id)
            .await?
            .ok_or(AggregationError::BookingNotFound(id))?;

        let resolved = self.resolver.resolve(&booking.refs(), cancel).await;
        let mut views = compose(vec![booking], &resolved)?;
        views.pop().ok_or(AggregationError::BookingNotFound(id))
    }

    /// Lazily stream the views of one page of bookings matching `filter`.
    ///
    /// Bookings are pulled from the store [`RESOLVE_CHUNK_SIZE`] at a time
    /// and each chunk is resolved with one batched lookup per entity kind,
    /// so nothing is fetched until the consumer polls. Views come out in the
    /// store's order. The stream ends after the first error; callers resume
    /// from the offset of the last view they received.
    pub fn list_booking_views(
        &self,
        filter: BookingFilter,
        page: Page,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<BookingView, AggregationError>> + Send + '_ {
        try_stream! {
            filter.validate()?;

            let end = page.offset.saturating_add(page.limit);
            let mut offset = page.offset;

            while offset < end {
                if cancel.is_cancelled() {
                    Err::<(), _>(AggregationError::Cancelled)?;
                }

                let window = (end - offset).min(RESOLVE_CHUNK_SIZE);
                let chunk = self.bookings.list(&filter, offset, window).await?;
                let fetched = chunk.len() as i64;
                if fetched == 0 {
                    break;
                }

                let refs: Vec<ForeignEntityRef> = chunk.iter().flat_map(Booking::refs).collect();
                let resolved = self.resolver.resolve(&refs, &cancel).await;
                for view in compose(chunk, &resolved)? {
                    yield view;
                }

                if fetched < window {
                    break;
                }
                offset += fetched;
            }
        }
    }

    /// Collect one page of views.
    pub async fn collect_booking_views(
        &self,
        filter: BookingFilter,
        page: Page,
        cancel: CancellationToken,
    ) -> Result<Vec<BookingView>, AggregationError> {
        self.list_booking_views(filter, page, cancel)
            .try_collect()
            .await
    }
}

/// Turn resolutions into views, or fail if any reference of these bookings
/// was cancelled or could not be read.
fn compose(bookings: Vec<Booking>, resolved: &ResolutionMap) -> Result<Vec<BookingView>, AggregationError> {
    let refs: BTreeSet<ForeignEntityRef> = bookings.iter().flat_map(Booking::refs).collect();

    let mut unavailable = Vec::new();
    for entity_ref in &refs {
        match resolved.get(entity_ref) {
            Some(Err(err)) if err.kind == ResolutionErrorKind::Cancelled => {
                return Err(AggregationError::Cancelled);
            }
            Some(Err(err)) if err.kind == ResolutionErrorKind::Unavailable => {
                unavailable.push(err.clone());
            }
            _ => {}
        }
    }
    if !unavailable.is_empty() {
        return Err(AggregationError::PartialDependencyFailure(unavailable));
    }

    Ok(bookings
        .into_iter()
        .map(|booking| BookingView::assemble(booking, resolved))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use futures::StreamExt;
    use serde_json::Value;
    use staybook_core::entity::EntityKind;
    use staybook_core::retry::RetryPolicy;
    use staybook_testing::fixtures::{booking, person_doc, property_doc};
    use staybook_testing::{InMemoryBookingStore, InMemoryEntityStore};

    use super::*;

    struct Harness {
        entities: InMemoryEntityStore,
        bookings: InMemoryBookingStore,
        aggregator: BookingAggregator,
    }

    fn harness() -> Harness {
        let entities = InMemoryEntityStore::new();
        entities.insert(EntityKind::Traveler, 1, person_doc("Tess"));
        entities.insert(EntityKind::Owner, 10, person_doc("Olga"));
        entities.insert(EntityKind::Property, 100, property_doc("Loft", 38.7, -9.1));

        let bookings = InMemoryBookingStore::new();
        bookings.insert(booking(1, 1, 10, 100));

        let resolver = EntityResolver::new(Arc::new(entities.clone()), RetryPolicy::default());
        let aggregator = BookingAggregator::new(Arc::new(bookings.clone()), Arc::new(resolver));
        Harness {
            entities,
            bookings,
            aggregator,
        }
    }

    #[tokio::test]
    async fn full_view_embeds_all_three_entities() {
        let h = harness();
        let view = h
            .aggregator
            .get_booking_view(1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(view.traveler.record().unwrap().str_field("name"), Some("Tess"));
        assert_eq!(view.owner.record().unwrap().str_field("name"), Some("Olga"));
        assert_eq!(view.property.record().unwrap().str_field("name"), Some("Loft"));
    }

    #[tokio::test]
    async fn deleted_traveler_becomes_placeholder() {
        let h = harness();
        h.entities.remove(EntityKind::Traveler, 1);

        let view = h
            .aggregator
            .get_booking_view(1, &CancellationToken::new())
            .await
            .unwrap();

        assert!(view.traveler.is_unavailable());
        assert!(!view.owner.is_unavailable());
        assert!(!view.property.is_unavailable());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["traveler"]["status"], "unavailable");
        assert_eq!(json["traveler"]["ref"]["id"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_owner_store_fails_the_view() {
        let h = harness();
        h.entities.fail_next(EntityKind::Owner, u32::MAX);

        let err = h
            .aggregator
            .get_booking_view(1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(err, AggregationError::PartialDependencyFailure(unresolved) => {
            assert_eq!(unresolved.len(), 1);
            assert_eq!(unresolved[0].entity_ref, ForeignEntityRef::owner(10));
        });
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let h = harness();
        let err = h
            .aggregator
            .get_booking_view(404, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, AggregationError::BookingNotFound(404));
    }

    #[tokio::test]
    async fn cancelled_request_does_no_work() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h.aggregator.get_booking_view(1, &cancel).await.unwrap_err();
        assert_matches!(err, AggregationError::Cancelled);
        assert_eq!(h.entities.total_calls(), 0);
    }

    #[tokio::test]
    async fn listing_resolves_each_chunk_with_one_lookup_per_kind() {
        let h = harness();
        for id in 2..=60 {
            h.bookings.insert(booking(id, 1, 10, 100));
        }

        let views = h
            .aggregator
            .collect_booking_views(BookingFilter::default(), Page::new(Some(60), None), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(views.len(), 60);
        let ids: Vec<DbId> = views.iter().map(|v| v.booking.id).collect();
        assert_eq!(ids, (1..=60).collect::<Vec<_>>());
        // 60 bookings in chunks of 25 -> 3 chunks, 3 kinds each.
        assert_eq!(h.bookings.list_calls(), 3);
        assert_eq!(h.entities.total_calls(), 9);
    }

    #[tokio::test]
    async fn listing_is_lazy() {
        let h = harness();
        for id in 2..=60 {
            h.bookings.insert(booking(id, 1, 10, 100));
        }

        let stream = h
            .aggregator
            .list_booking_views(BookingFilter::default(), Page::new(Some(60), None), CancellationToken::new());
        futures::pin_mut!(stream);
        assert_eq!(h.bookings.list_calls(), 0);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.booking.id, 1);
        assert_eq!(h.bookings.list_calls(), 1);
    }

    #[tokio::test]
    async fn listing_stops_when_cancelled_between_chunks() {
        let h = harness();
        for id in 2..=60 {
            h.bookings.insert(booking(id, 1, 10, 100));
        }
        let cancel = CancellationToken::new();

        let stream = h
            .aggregator
            .list_booking_views(BookingFilter::default(), Page::new(Some(60), None), cancel.clone());
        futures::pin_mut!(stream);

        // Drain the first chunk, then cancel before the second is fetched.
        for expected in 1..=RESOLVE_CHUNK_SIZE {
            let view = stream.next().await.unwrap().unwrap();
            assert_eq!(view.booking.id, expected);
        }
        cancel.cancel();

        let err = stream.next().await.unwrap().unwrap_err();
        assert_matches!(err, AggregationError::Cancelled);
        assert!(stream.next().await.is_none());

        assert_eq!(h.bookings.list_calls(), 1);
        assert_eq!(h.entities.total_calls(), 3);
    }

    #[tokio::test]
    async fn listing_honours_offset_and_short_pages() {
        let h = harness();
        for id in 2..=5 {
            h.bookings.insert(booking(id, 1, 10, 100));
        }

        let views = h
            .aggregator
            .collect_booking_views(BookingFilter::default(), Page::new(Some(10), Some(3)), CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<DbId> = views.iter().map(|v| v.booking.id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(h.bookings.list_calls(), 1);
    }

    #[tokio::test]
    async fn invalid_filter_is_reported_before_any_fetch() {
        let h = harness();
        let filter = BookingFilter {
            date_range: staybook_core::booking::DateRange {
                from: chrono::NaiveDate::from_ymd_opt(2026, 5, 1),
                to: chrono::NaiveDate::from_ymd_opt(2026, 4, 1),
            },
            ..Default::default()
        };

        let err = h
            .aggregator
            .collect_booking_views(filter, Page::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, AggregationError::InvalidFilter(_));
        assert_eq!(h.bookings.list_calls(), 0);
    }

    #[tokio::test]
    async fn booking_store_outage_surfaces_as_store_error() {
        let h = harness();
        h.bookings.fail_next(1);

        let err = h
            .aggregator
            .collect_booking_views(BookingFilter::default(), Page::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, AggregationError::Store(_));
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_views_serialize_without_leaking_fields() {
        let h = harness();
        h.entities.remove(EntityKind::Property, 100);
        h.entities.set_latency(Duration::from_millis(1));

        let views = h
            .aggregator
            .collect_booking_views(BookingFilter::default(), Page::default(), CancellationToken::new())
            .await
            .unwrap();
        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["property"]["status"], "unavailable");
        assert_eq!(json["traveler"].get("password_hash"), None::<&Value>);
    }
}
