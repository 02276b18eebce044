use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use staybook_core::error::StoreError;
use staybook_core::store::StoreHealth;

/// Health probe whose answer the test controls.
#[derive(Clone, Debug)]
pub struct StaticHealth {
    healthy: Arc<AtomicBool>,
}

impl StaticHealth {
    #[must_use]
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(healthy)),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

impl Default for StaticHealth {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl StoreHealth for StaticHealth {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store unreachable".to_string()))
        }
    }
}
