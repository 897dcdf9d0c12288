use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{CustomFieldMapping, FieldSelector};
use crate::date_util::parse_remote_date;
use crate::redmine::RawIssue;

/// The stable field set persisted for every issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedIssue {
    pub remote_id: i64,
    pub subject: String,
    pub jp_request: Option<String>,
    pub difficulty_level: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
    pub estimate: Option<f64>,
    pub spent_time: Option<f64>,
    pub project_id: Option<i64>,
}

/// Turns raw remote issues into [`NormalizedIssue`]s using the configured
/// custom-field selectors.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    mapping: CustomFieldMapping,
}

impl FieldExtractor {
    pub fn new(mapping: CustomFieldMapping) -> Self {
        Self { mapping }
    }

    pub fn extract(&self, raw: &RawIssue) -> NormalizedIssue {
        NormalizedIssue {
            jp_request: extract_custom_field(raw, &self.mapping.jp_request),
            difficulty_level: extract_custom_field(raw, &self.mapping.difficulty_level),
            ..extract_core_fields(raw)
        }
    }
}

/// Map the fixed attributes. Totals win over direct values because they
/// include subtask roll-ups.
pub fn extract_core_fields(raw: &RawIssue) -> NormalizedIssue {
    NormalizedIssue {
        remote_id: raw.id,
        subject: raw.subject.clone().unwrap_or_default(),
        jp_request: None,
        difficulty_level: None,
        start_date: parse_remote_date(raw.start_date.as_deref()),
        due_date: parse_remote_date(raw.due_date.as_deref()),
        assignee: raw.assigned_to.as_ref().and_then(|a| a.name.clone()),
        estimate: raw.total_estimated_hours.or(raw.estimated_hours),
        spent_time: raw.total_spent_hours.or(raw.spent_hours),
        project_id: raw.project.as_ref().map(|p| p.id),
    }
}

/// Value of the first custom field matching `selector`, rendered as text.
/// A missing field is `None`, never an error.
pub fn extract_custom_field(raw: &RawIssue, selector: &FieldSelector) -> Option<String> {
    raw.custom_fields
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|cf| selector.matches(cf.id, &cf.name))
        .and_then(|cf| value_to_text(&cf.value))
}

fn value_to_text(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // Multi-value fields
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(_) => Some(value.to_string()),
    }
}
