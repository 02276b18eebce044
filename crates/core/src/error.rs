use serde::Serialize;

use crate::entity::ForeignEntityRef;
use crate::geo_index::IndexState;
use crate::types::{DbId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Store access
// ---------------------------------------------------------------------------

/// A fault reading or writing the underlying data store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out")]
    Timeout,

    /// A stored row breaks a domain invariant. Retrying will not help.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// Entity resolution
// ---------------------------------------------------------------------------

/// Why a single foreign reference could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionErrorKind {
    /// The owning service no longer has the entity. Never retried.
    NotFound,
    /// The store could not be reached, even after retries.
    Unavailable,
    /// The originating request was abandoned before the lookup finished.
    Cancelled,
}

/// A per-reference resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Could not resolve {entity_ref}: {kind:?}")]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    #[serde(rename = "ref")]
    pub entity_ref: ForeignEntityRef,
    /// Store diagnostics, for logs only.
    #[serde(skip_serializing)]
    pub detail: Option<String>,
}

impl ResolutionError {
    pub fn not_found(entity_ref: ForeignEntityRef) -> Self {
        Self {
            kind: ResolutionErrorKind::NotFound,
            entity_ref,
            detail: None,
        }
    }

    pub fn unavailable(entity_ref: ForeignEntityRef, detail: impl Into<String>) -> Self {
        Self {
            kind: ResolutionErrorKind::Unavailable,
            entity_ref,
            detail: Some(detail.into()),
        }
    }

    pub fn cancelled(entity_ref: ForeignEntityRef) -> Self {
        Self {
            kind: ResolutionErrorKind::Cancelled,
            entity_ref,
            detail: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Booking aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Booking {0} not found")]
    BookingNotFound(DbId),

    /// At least one foreign reference stayed `Unavailable` after retries.
    /// Retryable by the caller after a delay.
    #[error("{} foreign reference(s) could not be resolved", .0.len())]
    PartialDependencyFailure(Vec<ResolutionError>),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Aggregation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Geospatial index lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index build failed for {key_spec}: {reason}")]
    BuildFailed { key_spec: String, reason: String },

    /// Another episode holds the lease. The caller's operation is deferred.
    #[error("Lease for {key_spec} is held by {holder} until {expires_at}")]
    LeaseContention {
        key_spec: String,
        holder: String,
        expires_at: Timestamp,
    },

    /// The lease expired and was taken over while a retire or reconcile
    /// episode was running. Lost leases during a build surface as
    /// `BuildFailed`.
    #[error("Lease for {key_spec} was lost during {episode}")]
    LeaseLost {
        key_spec: String,
        episode: &'static str,
    },

    #[error("Index verification failed for {key_spec}: {reason}")]
    VerificationFailed { key_spec: String, reason: String },

    #[error("Invalid index state transition {from} -> {to}")]
    InvalidTransition { from: IndexState, to: IndexState },

    /// The persisted state changed underneath a lease holder.
    #[error("Index state for {key_spec} is no longer {expected}")]
    StateConflict {
        key_spec: String,
        expected: IndexState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexError {
    /// `true` when the operation was skipped because another episode is
    /// running, rather than failing.
    pub fn is_deferral(&self) -> bool {
        matches!(self, IndexError::LeaseContention { .. })
    }
}

// ---------------------------------------------------------------------------
// Property search
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    InvalidQuery(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_serializes_ref_field() {
        let err = ResolutionError::not_found(ForeignEntityRef::traveler(9));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["ref"]["id"], 9);
        assert!(json.get("detail").is_none());
    }

    #[test]
    fn store_detail_is_never_serialized() {
        let err = ResolutionError::unavailable(
            ForeignEntityRef::owner(3),
            "error returned from database: connection refused",
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "unavailable");
        assert!(json.get("detail").is_none());
        assert_eq!(err.detail.as_deref(), Some("error returned from database: connection refused"));
    }

    #[test]
    fn lease_contention_is_a_deferral() {
        let err = IndexError::LeaseContention {
            key_spec: "properties.location:2dsphere".into(),
            holder: "other".into(),
            expires_at: chrono::Utc::now(),
        };
        assert!(err.is_deferral());
        let err = IndexError::BuildFailed {
            key_spec: "x".into(),
            reason: "boom".into(),
        };
        assert!(!err.is_deferral());
    }
}
