//! Read-only accessor for records owned by another service.
//!
//! The traveler, owner and property services enforce no fixed schema on
//! read, and their documents drift over time. Instead of pretending to know
//! their shape, [`ReferenceRecord`] keeps the raw JSON object and exposes
//! name-based accessors that return `None` when a field is missing or has
//! an unexpected type.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::entity::{EntityKind, ForeignEntityRef};
use crate::error::ResolutionError;
use crate::types::DbId;

/// Outcome of resolving one foreign reference.
pub type Resolution = Result<ReferenceRecord, ResolutionError>;

/// Per-reference outcomes of one resolver call.
pub type ResolutionMap = HashMap<ForeignEntityRef, Resolution>;

/// Best-effort projection of a foreign entity, as read at request time.
///
/// Serializes as the bare field object (always including `id`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRecord {
    #[serde(skip)]
    kind: EntityKind,
    #[serde(skip)]
    id: DbId,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl ReferenceRecord {
    /// Wrap a raw document. Anything other than a JSON object is treated as
    /// a record with no readable fields.
    pub fn from_document(kind: EntityKind, id: DbId, document: Value) -> Self {
        let mut fields = match document {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.insert("id".to_string(), Value::from(id));
        Self { kind, id, fields }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> DbId {
        self.id
    }

    pub fn entity_ref(&self) -> ForeignEntityRef {
        ForeignEntityRef::new(self.kind, self.id)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Top-level field lookup. JSON `null` counts as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Dotted lookup into nested objects, e.g. `location.city`.
    pub fn path(&self, dotted: &str) -> Option<&Value> {
        let mut segments = dotted.split('.');
        let first = segments.next()?;
        let mut current = self.field(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        (!current.is_null()).then_some(current)
    }

    pub fn str_field(&self, dotted: &str) -> Option<&str> {
        self.path(dotted)?.as_str()
    }

    pub fn f64_field(&self, dotted: &str) -> Option<f64> {
        self.path(dotted)?.as_f64()
    }

    pub fn i64_field(&self, dotted: &str) -> Option<i64> {
        self.path(dotted)?.as_i64()
    }

    /// A copy restricted to the given top-level fields. `id` is always kept;
    /// missing fields are simply left out.
    pub fn project(&self, names: &[&str]) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::from(self.id));
        for name in names {
            if let Some(value) = self.fields.get(*name) {
                fields.insert((*name).to_string(), value.clone());
            }
        }
        Self {
            kind: self.kind,
            id: self.id,
            fields,
        }
    }

    /// Expected fields that are missing or null in this record.
    pub fn drifted_fields<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .copied()
            .filter(|name| self.field(name).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn property_doc() -> ReferenceRecord {
        ReferenceRecord::from_document(
            EntityKind::Property,
            5,
            json!({
                "id": 5,
                "name": "Loft",
                "location": { "city": "Lisbon", "coordinates": { "lat": 38.7, "lng": -9.1 } },
                "pricing": { "basePrice": 120 },
                "description": null,
                "internal_notes": "do not show"
            }),
        )
    }

    #[test]
    fn nested_paths_resolve() {
        let rec = property_doc();
        assert_eq!(rec.str_field("location.city"), Some("Lisbon"));
        assert_eq!(rec.f64_field("location.coordinates.lat"), Some(38.7));
        assert_eq!(rec.i64_field("pricing.basePrice"), Some(120));
    }

    #[test]
    fn shape_mismatch_reads_as_absent() {
        let rec = property_doc();
        assert_eq!(rec.str_field("pricing.basePrice"), None);
        assert_eq!(rec.path("location.city.name"), None);
        assert_eq!(rec.field("description"), None);
    }

    #[test]
    fn projection_keeps_id_and_listed_fields_only() {
        let projected = property_doc().project(&["name", "photos"]);
        let json = serde_json::to_value(&projected).unwrap();
        assert_eq!(json, json!({ "id": 5, "name": "Loft" }));
    }

    #[test]
    fn non_object_document_has_only_id() {
        let rec = ReferenceRecord::from_document(EntityKind::Owner, 2, json!("garbage"));
        assert_eq!(serde_json::to_value(&rec).unwrap(), json!({ "id": 2 }));
        assert_eq!(rec.entity_ref(), ForeignEntityRef::owner(2));
    }

    #[test]
    fn drift_reports_missing_expected_fields() {
        let rec = property_doc();
        assert_eq!(
            rec.drifted_fields(&["name", "photos", "location", "pricing"]),
            vec!["photos"]
        );
    }
}
