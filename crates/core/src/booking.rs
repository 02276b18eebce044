//! Bookings, booking listing filters, and the aggregated booking view.
//!
//! A booking is owned by the booking service and holds exactly one weak
//! reference each to a traveler, an owner and a property. The view returned
//! to clients embeds those entities, or a placeholder when they are gone.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::ForeignEntityRef;
use crate::error::{AggregationError, CoreError};
use crate::reference::{ReferenceRecord, ResolutionMap};
use crate::types::{DbId, StayDate, Timestamp};

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Default number of booking views per page.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Maximum number of booking views per page. Bounds resolver fan-out per
/// request together with [`RESOLVE_CHUNK_SIZE`].
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Number of bookings pulled from the store and resolved in one batch while
/// streaming a listing.
pub const RESOLVE_CHUNK_SIZE: i64 = 25;

/// Clamp a user-provided limit to valid bounds.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Offset + limit window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            offset: clamp_offset(offset),
            limit: clamp_limit(limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Parse a stored or user-supplied status. `accepted` is the legacy
    /// spelling of `confirmed` still present in older rows.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" | "accepted" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown booking status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Booking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: DbId,
    pub traveler_id: DbId,
    pub owner_id: DbId,
    pub property_id: DbId,
    pub start_date: StayDate,
    pub end_date: StayDate,
    pub guests: i32,
    pub total_price: f64,
    pub status: BookingStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Booking {
    pub fn traveler_ref(&self) -> ForeignEntityRef {
        ForeignEntityRef::traveler(self.traveler_id)
    }

    pub fn owner_ref(&self) -> ForeignEntityRef {
        ForeignEntityRef::owner(self.owner_id)
    }

    pub fn property_ref(&self) -> ForeignEntityRef {
        ForeignEntityRef::property(self.property_id)
    }

    /// The three foreign references every booking carries.
    pub fn refs(&self) -> [ForeignEntityRef; 3] {
        [self.traveler_ref(), self.owner_ref(), self.property_ref()]
    }
}

/// Check-out must be strictly after check-in.
pub fn validate_stay_dates(start: StayDate, end: StayDate) -> Result<(), CoreError> {
    if end <= start {
        return Err(CoreError::Validation(
            "End date must be after start date".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Listing filter
// ---------------------------------------------------------------------------

/// Inclusive calendar window. A booking matches when its stay overlaps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<StayDate>,
    pub to: Option<StayDate>,
}

impl DateRange {
    /// Stays occupy `[start_date, end_date)`.
    pub fn overlaps(&self, start: StayDate, end: StayDate) -> bool {
        self.to.map_or(true, |to| start <= to) && self.from.map_or(true, |from| end > from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    StartDate,
    TotalPrice,
}

impl SortKey {
    pub fn column(self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::StartDate => "start_date",
            SortKey::TotalPrice => "total_price",
        }
    }
}

/// Explicit ordering requested by the caller. Ties always break on id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingSort {
    pub key: SortKey,
    pub descending: bool,
}

impl BookingSort {
    /// Parse `created_at`, `-start_date`, etc.
    pub fn parse(value: &str) -> Result<Self, AggregationError> {
        let (descending, name) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let key = match name {
            "created_at" => SortKey::CreatedAt,
            "start_date" => SortKey::StartDate,
            "total_price" => SortKey::TotalPrice,
            other => {
                return Err(AggregationError::InvalidFilter(format!(
                    "Unknown sort key '{other}'"
                )))
            }
        };
        Ok(Self { key, descending })
    }

    fn compare(&self, a: &Booking, b: &Booking) -> Ordering {
        let ord = match self.key {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::StartDate => a.start_date.cmp(&b.start_date),
            SortKey::TotalPrice => a
                .total_price
                .partial_cmp(&b.total_price)
                .unwrap_or(Ordering::Equal),
        };
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub date_range: DateRange,
    pub owner_id: Option<DbId>,
    pub traveler_id: Option<DbId>,
    pub sort: Option<BookingSort>,
}

impl BookingFilter {
    /// Build a filter from raw request parameters.
    pub fn parse(
        status: Option<&str>,
        from: Option<StayDate>,
        to: Option<StayDate>,
        owner_id: Option<DbId>,
        traveler_id: Option<DbId>,
        sort: Option<&str>,
    ) -> Result<Self, AggregationError> {
        let status = status
            .map(BookingStatus::parse)
            .transpose()
            .map_err(|e| AggregationError::InvalidFilter(e.to_string()))?;
        let sort = sort.map(BookingSort::parse).transpose()?;
        let filter = Self {
            status,
            date_range: DateRange { from, to },
            owner_id,
            traveler_id,
            sort,
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn validate(&self) -> Result<(), AggregationError> {
        if let (Some(from), Some(to)) = (self.date_range.from, self.date_range.to) {
            if from > to {
                return Err(AggregationError::InvalidFilter(format!(
                    "Date range start {from} is after end {to}"
                )));
            }
        }
        Ok(())
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.map_or(true, |s| booking.status == s)
            && self.owner_id.map_or(true, |id| booking.owner_id == id)
            && self.traveler_id.map_or(true, |id| booking.traveler_id == id)
            && self
                .date_range
                .overlaps(booking.start_date, booking.end_date)
    }

    /// Order bookings the way the store is expected to: natural (id) order
    /// unless a sort key was requested.
    pub fn sort(&self, bookings: &mut [Booking]) {
        match self.sort {
            Some(sort) => bookings.sort_by(|a, b| sort.compare(a, b).then(a.id.cmp(&b.id))),
            None => bookings.sort_by_key(|b| b.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregated view
// ---------------------------------------------------------------------------

/// Stand-in for a foreign entity that no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placeholder {
    #[serde(rename = "ref")]
    pub entity_ref: ForeignEntityRef,
    pub status: &'static str,
}

impl Placeholder {
    pub const UNAVAILABLE: &'static str = "unavailable";

    pub fn unavailable(entity_ref: ForeignEntityRef) -> Self {
        Self {
            entity_ref,
            status: Self::UNAVAILABLE,
        }
    }
}

/// One embedded entity of a booking view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntitySlot {
    Resolved(ReferenceRecord),
    Unavailable(Placeholder),
}

impl EntitySlot {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EntitySlot::Unavailable(_))
    }

    pub fn record(&self) -> Option<&ReferenceRecord> {
        match self {
            EntitySlot::Resolved(record) => Some(record),
            EntitySlot::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub traveler: EntitySlot,
    pub owner: EntitySlot,
    pub property: EntitySlot,
}

impl BookingView {
    /// Combine a booking with resolved entities. Any ref that did not resolve
    /// becomes a placeholder; callers decide beforehand which failures are
    /// acceptable to absorb.
    pub fn assemble(booking: Booking, resolved: &ResolutionMap) -> Self {
        let slot = |entity_ref: ForeignEntityRef| match resolved.get(&entity_ref) {
            Some(Ok(record)) => EntitySlot::Resolved(record.clone()),
            _ => EntitySlot::Unavailable(Placeholder::unavailable(entity_ref)),
        };
        let traveler = slot(booking.traveler_ref());
        let owner = slot(booking.owner_ref());
        let property = slot(booking.property_ref());
        Self {
            booking,
            traveler,
            owner,
            property,
        }
    }
}
