use serde::{Deserialize, Serialize};

/// `{ "id": .., "name": .. }` reference used for projects, users, trackers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// A user-defined field attached to an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomField {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// An issue as returned by `/issues.json` or `/issues/{id}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIssue {
    pub id: i64,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub project: Option<NamedRef>,
    #[serde(default)]
    pub tracker: Option<NamedRef>,
    #[serde(default)]
    pub assigned_to: Option<NamedRef>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub total_estimated_hours: Option<f64>,
    #[serde(default)]
    pub spent_hours: Option<f64>,
    #[serde(default)]
    pub total_spent_hours: Option<f64>,
    /// Absent and explicit `null` both deserialize to `None`.
    #[serde(default)]
    pub custom_fields: Option<Vec<CustomField>>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub updated_on: Option<String>,
}

/// One page of `/issues.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuePage {
    #[serde(default)]
    pub issues: Vec<RawIssue>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Wrapper around the single-issue payload.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueEnvelope {
    pub issue: RawIssue,
}
