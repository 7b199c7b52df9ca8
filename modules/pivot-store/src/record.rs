use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::predicate::parse_datetime;

/// A stored row: opaque id plus the field map. Unknown fields ride along
/// untouched; updates are patches that only replace named fields.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn str_field(&self, name: &str) -> &str {
        self.fields.get(name).and_then(Value::as_str).unwrap_or("")
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn f64_field(&self, name: &str) -> f64 {
        self.fields.get(name).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn u8_field(&self, name: &str) -> u8 {
        match self.fields.get(name) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u8,
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn bool_field(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn datetime_field(&self, name: &str) -> Option<DateTime<Utc>> {
        self.opt_str(name).and_then(parse_datetime)
    }
}
