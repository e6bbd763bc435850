use serde::{Deserialize, Serialize};

/// Date subrecord attached to ArchivesSpace descriptions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRecord {
    #[serde(default)]
    pub begin: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    pub date_type: String,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl DateRecord {
    pub fn single(begin: impl Into<String>) -> Self {
        Self {
            begin: Some(begin.into()),
            end: None,
            date_type: "single".to_string(),
            expression: None,
            label: Some("creation".to_string()),
        }
    }

    pub fn inclusive(begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            begin: Some(begin.into()),
            end: Some(end.into()),
            date_type: "inclusive".to_string(),
            expression: None,
            label: Some("creation".to_string()),
        }
    }

    pub fn is_single(&self) -> bool {
        self.date_type == "single"
    }
}

/// Reference to another record, as returned in `ref` fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordRef {
    #[serde(rename = "ref")]
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FindByIdResponse {
    #[serde(default)]
    pub archival_objects: Vec<RecordRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionResponse {
    pub session: String,
}

/// Archival object fetched with `resolve[]=ancestors`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivalObject {
    pub uri: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub dates: Vec<DateRecord>,
    #[serde(default)]
    pub ancestors: Vec<Ancestor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ancestor {
    #[serde(rename = "ref")]
    pub uri: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(rename = "_resolved", default)]
    pub resolved: Option<ResolvedAncestor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAncestor {
    #[serde(default)]
    pub dates: Vec<DateRecord>,
}

impl ArchivalObject {
    /// Dates on this object, or on its nearest ancestor that has any.
    /// Ancestors are ordered nearest first.
    pub fn closest_dates(&self) -> Option<&[DateRecord]> {
        if !self.dates.is_empty() {
            return Some(&self.dates);
        }
        self.ancestors
            .iter()
            .filter_map(|ancestor| ancestor.resolved.as_ref())
            .map(|resolved| resolved.dates.as_slice())
            .find(|dates| !dates.is_empty())
    }
}
