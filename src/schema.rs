//! Read-only view of per-class field types, supplied by the schema layer.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    Pointer,
    Relation,
    File,
    GeoPoint,
    Bytes,
}

impl FieldType {
    /// Parses a declared type name such as `"Number"` or `"Pointer"`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "String" => Self::String,
            "Number" => Self::Number,
            "Boolean" => Self::Boolean,
            "Date" => Self::Date,
            "Object" => Self::Object,
            "Array" => Self::Array,
            "Pointer" => Self::Pointer,
            "Relation" => Self::Relation,
            "File" => Self::File,
            "GeoPoint" => Self::GeoPoint,
            "Bytes" => Self::Bytes,
            _ => return None,
        })
    }
}

pub trait SchemaLookup: Send + Sync {
    fn field_type(&self, class_name: &str, field: &str) -> Option<FieldType>;
}

/// In-memory schema: class name -> field -> declared type.
#[derive(Default)]
pub struct StaticSchema {
    classes: RwLock<HashMap<String, HashMap<String, FieldType>>>,
}

impl StaticSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(self, class_name: &str, field: &str, ty: FieldType) -> Self {
        self.set_field(class_name, field, ty);
        self
    }

    pub fn set_field(&self, class_name: &str, field: &str, ty: FieldType) {
        self.classes
            .write()
            .entry(class_name.to_string())
            .or_default()
            .insert(field.to_string(), ty);
    }

    /// Builds a schema from JSON of the form `{"Class": {"field": "Number", ...}, ...}`.
    /// Unknown type names are skipped.
    ///
    /// # Errors
    /// Returns an error if the JSON does not have that shape.
    pub fn from_json(json: &str) -> Result<Self, crate::errors::DbError> {
        let raw: HashMap<String, HashMap<String, String>> = serde_json::from_str(json)?;
        let schema = Self::new();
        for (class_name, fields) in raw {
            for (field, ty) in fields {
                if let Some(t) = FieldType::from_name(&ty) {
                    schema.set_field(&class_name, &field, t);
                } else {
                    log::warn!("schema {class_name}.{field}: unknown type {ty}");
                }
            }
        }
        Ok(schema)
    }
}

impl SchemaLookup for StaticSchema {
    fn field_type(&self, class_name: &str, field: &str) -> Option<FieldType> {
        self.classes.read().get(class_name).and_then(|f| f.get(field)).copied()
    }
}
