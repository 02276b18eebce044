//! Geospatial index lifecycle: specs, states, leases.
//!
//! The index over property coordinates moves through an explicit state
//! machine instead of being silently present or absent:
//!
//! ```text
//! absent -> building -> active -> retiring -> absent
//!              |                     |
//!              +-> absent (rollback) +-> active (rollback)
//! ```
//!
//! Only the holder of the lease for a key specification may move it out of
//! a stable state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default lease lifetime. Must comfortably exceed a worst-case build.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 600;

/// The lease is renewed this many times per TTL while an episode runs.
pub const LEASE_RENEWALS_PER_TTL: u32 = 3;

/// Default drain window between `retiring` and the physical drop.
pub const DEFAULT_RETIRE_GRACE_SECS: u64 = 30;

/// How often expired lease records are swept.
pub const DEFAULT_LEASE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Radius of the probe query used to verify a freshly built index.
pub const VERIFY_PROBE_RADIUS_KM: f64 = 50.0;

/// PostgreSQL identifier length limit (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LEN: usize = 63;

/// Interval at which a lease holder renews its lease.
pub fn renewal_interval(ttl: Duration) -> Duration {
    ttl / LEASE_RENEWALS_PER_TTL
}

// ---------------------------------------------------------------------------
// Index specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoIndexKind {
    /// Spherical-geometry index, equivalent to a `2dsphere` index.
    #[serde(rename = "2dsphere")]
    Sphere,
}

impl GeoIndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GeoIndexKind::Sphere => "2dsphere",
        }
    }
}

/// Key specification of a geospatial index: which coordinate field of which
/// collection, and the index type.
///
/// Names are validated as plain SQL identifiers because they end up in DDL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GeoIndexSpec {
    collection: String,
    field: String,
    kind: GeoIndexKind,
}

fn validate_identifier(what: &str, value: &str) -> Result<(), CoreError> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_start || !valid_rest {
        return Err(CoreError::Validation(format!(
            "{what} '{value}' must be a lowercase identifier"
        )));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::Validation(format!(
            "{what} '{value}' exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    Ok(())
}

impl GeoIndexSpec {
    pub fn new(
        collection: impl Into<String>,
        field: impl Into<String>,
        kind: GeoIndexKind,
    ) -> Result<Self, CoreError> {
        let spec = Self {
            collection: collection.into(),
            field: field.into(),
            kind,
        };
        validate_identifier("Collection", &spec.collection)?;
        validate_identifier("Field", &spec.field)?;
        validate_identifier("Index name", &spec.index_name())?;
        Ok(spec)
    }

    /// The index backing property location search.
    pub fn property_location() -> Self {
        Self {
            collection: "properties".to_string(),
            field: "location".to_string(),
            kind: GeoIndexKind::Sphere,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> GeoIndexKind {
        self.kind
    }

    /// Stable identity used for state and lease records.
    pub fn key_spec(&self) -> String {
        format!("{}.{}:{}", self.collection, self.field, self.kind.as_str())
    }

    pub fn index_name(&self) -> String {
        match self.kind {
            GeoIndexKind::Sphere => format!("idx_{}_{}_2dsphere", self.collection, self.field),
        }
    }

    pub fn lat_column(&self) -> String {
        format!("{}_lat", self.field)
    }

    pub fn lng_column(&self) -> String {
        format!("{}_lng", self.field)
    }
}

impl fmt::Display for GeoIndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_spec())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Absent,
    Building,
    Active,
    Retiring,
}

impl IndexState {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexState::Absent => "absent",
            IndexState::Building => "building",
            IndexState::Active => "active",
            IndexState::Retiring => "retiring",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "absent" => Ok(IndexState::Absent),
            "building" => Ok(IndexState::Building),
            "active" => Ok(IndexState::Active),
            "retiring" => Ok(IndexState::Retiring),
            other => Err(CoreError::Validation(format!(
                "Unknown index state '{other}'"
            ))),
        }
    }

    /// `building` and `retiring` belong to an in-flight episode and must be
    /// re-verified if found without a live lease.
    pub fn is_transient(self) -> bool {
        matches!(self, IndexState::Building | IndexState::Retiring)
    }

    /// Only an `active` index may serve queries.
    pub fn is_queryable(self) -> bool {
        self == IndexState::Active
    }

    pub fn can_transition_to(self, next: IndexState) -> bool {
        use IndexState::*;
        matches!(
            (self, next),
            (Absent, Building)
                | (Building, Active)
                | (Building, Absent)
                | (Active, Retiring)
                | (Retiring, Absent)
                | (Retiring, Active)
        )
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one geospatial index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoIndexDescriptor {
    pub key_spec: String,
    pub index_name: String,
    pub index_kind: GeoIndexKind,
    pub state: IndexState,
    /// `None` when no state record exists yet.
    pub updated_at: Option<Timestamp>,
}

impl GeoIndexDescriptor {
    pub fn absent(spec: &GeoIndexSpec) -> Self {
        Self {
            key_spec: spec.key_spec(),
            index_name: spec.index_name(),
            index_kind: spec.kind(),
            state: IndexState::Absent,
            updated_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Leases
// ---------------------------------------------------------------------------

/// Time-bounded exclusivity over one key specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lease {
    pub key_spec: String,
    pub holder: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Lease {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at < now
    }
}

/// Result of trying to take a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAttempt {
    Acquired(Lease),
    /// Someone else holds an unexpired lease.
    Held(Lease),
}

/// A physical index as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub definition: String,
    /// `false` for a half-built index left behind by a failed build.
    pub is_valid: bool,
}
