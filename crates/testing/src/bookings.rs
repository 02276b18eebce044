//! In-memory booking store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use staybook_core::booking::{Booking, BookingFilter};
use staybook_core::error::StoreError;
use staybook_core::store::BookingStore;
use staybook_core::types::DbId;

#[derive(Debug, Default)]
struct Inner {
    bookings: RwLock<BTreeMap<DbId, Booking>>,
    list_calls: AtomicUsize,
    pending_failures: AtomicU32,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    inner: Arc<Inner>,
}

impl InMemoryBookingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, booking: Booking) {
        self.inner.bookings.write().unwrap().insert(booking.id, booking);
    }

    /// Make the next `n` store calls fail with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.inner.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `list` windows served so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    fn check_fault(&self) -> Result<(), StoreError> {
        let injected = self
            .inner
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("booking store is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn find(&self, id: DbId) -> Result<Option<Booking>, StoreError> {
        self.check_fault()?;
        Ok(self.inner.bookings.read().unwrap().get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &BookingFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_fault()?;

        let mut matching: Vec<Booking> = self
            .inner
            .bookings
            .read()
            .unwrap()
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        filter.sort(&mut matching);

        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
