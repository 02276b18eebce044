//! Foreign entity kinds and weak references.
//!
//! A booking points at a traveler, an owner and a property, each owned by a
//! different service. The booking service only ever holds a
//! [`ForeignEntityRef`] to them; whether the entity still exists is a
//! read-time question answered by the entity resolver.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// The owning service of a foreign entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Traveler,
    Owner,
    Property,
}

/// Fields exposed in a booking view for a traveler.
pub const TRAVELER_VIEW_FIELDS: &[&str] = &["name", "email"];

/// Fields exposed in a booking view for an owner.
pub const OWNER_VIEW_FIELDS: &[&str] = &["name", "email", "phone"];

/// Fields exposed in a booking view for a property.
pub const PROPERTY_VIEW_FIELDS: &[&str] = &["name", "photos", "location", "pricing"];

impl EntityKind {
    /// All kinds, in resolution order.
    pub const ALL: [EntityKind; 3] = [EntityKind::Traveler, EntityKind::Owner, EntityKind::Property];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Traveler => "traveler",
            EntityKind::Owner => "owner",
            EntityKind::Property => "property",
        }
    }

    /// Name of the table owned by the service this kind belongs to.
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Traveler => "travelers",
            EntityKind::Owner => "owners",
            EntityKind::Property => "properties",
        }
    }

    /// Field projection applied when this kind is embedded in a booking view.
    pub fn view_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Traveler => TRAVELER_VIEW_FIELDS,
            EntityKind::Owner => OWNER_VIEW_FIELDS,
            EntityKind::Property => PROPERTY_VIEW_FIELDS,
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "traveler" => Ok(EntityKind::Traveler),
            "owner" => Ok(EntityKind::Owner),
            "property" => Ok(EntityKind::Property),
            other => Err(CoreError::Validation(format!(
                "Unknown entity kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Weak references
// ---------------------------------------------------------------------------

/// A weak reference to an entity owned by another service.
///
/// Holding a ref never implies the entity exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForeignEntityRef {
    pub kind: EntityKind,
    pub id: DbId,
}

impl ForeignEntityRef {
    pub fn new(kind: EntityKind, id: DbId) -> Self {
        Self { kind, id }
    }

    pub fn traveler(id: DbId) -> Self {
        Self::new(EntityKind::Traveler, id)
    }

    pub fn owner(id: DbId) -> Self {
        Self::new(EntityKind::Owner, id)
    }

    pub fn property(id: DbId) -> Self {
        Self::new(EntityKind::Property, id)
    }
}

impl fmt::Display for ForeignEntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(EntityKind::parse("host").is_err());
    }

    #[test]
    fn ref_display_is_kind_colon_id() {
        assert_eq!(ForeignEntityRef::traveler(7).to_string(), "traveler:7");
    }

    #[test]
    fn ref_serializes_as_kind_and_id() {
        let json = serde_json::to_value(ForeignEntityRef::property(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "property", "id": 3 }));
    }
}
