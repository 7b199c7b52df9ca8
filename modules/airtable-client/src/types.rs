use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single Airtable record: opaque id plus a free-form field map.
/// Unknown fields round-trip untouched; typed projection happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(rename = "createdTime", skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<ApiRecord>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Query options for a list call. `formula` is an Airtable filter formula
/// string, already compiled by the caller.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub formula: Option<String>,
    pub sort: Vec<(String, SortDirection)>,
    pub fields: Vec<String>,
    pub max_records: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.push((field.into(), SortDirection::Desc));
        self
    }

    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort.push((field.into(), SortDirection::Asc));
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn max_records(mut self, max: u32) -> Self {
        self.max_records = Some(max);
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePayload {
    pub records: Vec<CreateRecord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRecord {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdatePayload {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordList {
    #[serde(default)]
    pub records: Vec<ApiRecord>,
}
