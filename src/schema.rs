//! Ordered schemas and the request instances validated against them.

use crate::fields::{is_empty, FieldSpec, ValidationError};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// An ordered, immutable table of field rules describing one request shape.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    /// Runs every field rule in declaration order and stops at the first failure.
    pub fn validate(&self, values: &Map<String, Value>) -> Result<(), ValidationError> {
        for spec in self.fields {
            if let Err(err) = spec.validate(values.get(spec.name)) {
                tracing::debug!(schema = self.name, field = spec.name, "Validation failed: {}", err);
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// True when no two rules share a name.
    pub fn has_unique_names(&self) -> bool {
        let mut seen = HashSet::new();
        self.fields.iter().all(|spec| seen.insert(spec.name))
    }
}

/// A mapping of name to value bound to a schema.
///
/// Keys the caller never set stay absent: [`RequestModel::get`] returns `None`
/// for them rather than a default value.
#[derive(Debug, Clone)]
pub struct RequestModel {
    schema: &'static Schema,
    values: Map<String, Value>,
}

impl RequestModel {
    pub fn new(schema: &'static Schema, values: Map<String, Value>) -> Self {
        Self { schema, values }
    }

    /// Builds a model from an arbitrary JSON value, which must be an object.
    pub fn from_value(schema: &'static Schema, value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(values) => Ok(Self::new(schema, values)),
            _ => Err(ValidationError::WrongType {
                field: schema.name,
                reason: "request should be an object",
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String value of a field, `None` when absent, null or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// True when the field is set to a non-empty value.
    pub fn is_present(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !is_empty(value))
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.schema.validate(&self.values)
    }
}
