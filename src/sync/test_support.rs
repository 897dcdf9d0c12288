//! In-memory stand-in for the Redmine API used by pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::redmine::RemoteApi;

#[derive(Default)]
struct Calls {
    list_offsets: Vec<u32>,
    detail_ids: Vec<i64>,
    last_detail_query: Option<Vec<(String, String)>>,
}

pub(crate) struct FakeRedmine {
    issues: Vec<Value>,
    report_total: bool,
    list_status: Option<u16>,
    detail_status: HashMap<i64, u16>,
    queued_details: Mutex<HashMap<i64, VecDeque<Value>>>,
    calls: Mutex<Calls>,
}

impl FakeRedmine {
    pub fn new(issues: Vec<Value>) -> Self {
        Self {
            issues,
            report_total: true,
            list_status: None,
            detail_status: HashMap::new(),
            queued_details: Mutex::new(HashMap::new()),
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Issues `1..=count`, each with subject "Issue {id}".
    pub fn with_issues(count: i64) -> Self {
        Self::new((1..=count).map(|id| issue_json(id, &format!("Issue {id}"))).collect())
    }

    pub fn without_total_count(mut self) -> Self {
        self.report_total = false;
        self
    }

    pub fn failing_list(mut self, status: u16) -> Self {
        self.list_status = Some(status);
        self
    }

    pub fn failing_detail(mut self, issue_id: i64, status: u16) -> Self {
        self.detail_status.insert(issue_id, status);
        self
    }

    /// Queue detail payloads returned in order for `issue_id`.
    pub fn queue_details(self, issue_id: i64, details: Vec<Value>) -> Self {
        self.queued_details
            .lock()
            .unwrap()
            .insert(issue_id, details.into());
        self
    }

    pub fn list_offsets(&self) -> Vec<u32> {
        self.calls.lock().unwrap().list_offsets.clone()
    }

    pub fn detail_ids(&self) -> Vec<i64> {
        self.calls.lock().unwrap().detail_ids.clone()
    }

    pub fn total_calls(&self) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.list_offsets.len() + calls.detail_ids.len()
    }

    pub fn last_detail_query(&self) -> Option<Vec<(String, String)>> {
        self.calls.lock().unwrap().last_detail_query.clone()
    }

    fn list(&self, query: &[(String, String)]) -> Result<Value> {
        let param = |key: &str| -> usize {
            query
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0)
        };
        let offset = param("offset");
        let limit = param("limit");
        self.calls.lock().unwrap().list_offsets.push(offset as u32);

        if let Some(status) = self.list_status {
            return Err(status_error(status, "/issues.json"));
        }

        let start = offset.min(self.issues.len());
        let end = (offset + limit).min(self.issues.len());
        let mut page = json!({
            "issues": self.issues[start..end].to_vec(),
            "offset": offset,
            "limit": limit,
        });
        if self.report_total {
            page["total_count"] = json!(self.issues.len());
        }
        Ok(page)
    }

    fn detail(&self, path: &str, issue_id: i64, query: &[(String, String)]) -> Result<Value> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.detail_ids.push(issue_id);
            calls.last_detail_query = Some(query.to_vec());
        }

        if let Some(&status) = self.detail_status.get(&issue_id) {
            return Err(status_error(status, path));
        }
        if let Some(queued) = self.queued_details.lock().unwrap().get_mut(&issue_id) {
            if let Some(issue) = queued.pop_front() {
                return Ok(json!({ "issue": issue }));
            }
        }
        self.issues
            .iter()
            .find(|i| i["id"] == issue_id)
            .map(|issue| json!({ "issue": issue }))
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })
    }
}

#[async_trait]
impl RemoteApi for FakeRedmine {
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        if path == "/issues.json" {
            return self.list(query);
        }
        let issue_id = path
            .strip_prefix("/issues/")
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })?;
        self.detail(path, issue_id, query)
    }
}

pub(crate) fn issue_json(id: i64, subject: &str) -> Value {
    json!({
        "id": id,
        "subject": subject,
        "project": { "id": 12, "name": "minden2" },
        "assigned_to": { "id": 5, "name": "Sato Yuki" },
        "start_date": "2025-10-01",
        "due_date": "2025-10-20",
        "estimated_hours": 3.0,
        "total_estimated_hours": 5.0,
        "total_spent_hours": 2.5,
        "custom_fields": [
            { "id": 16, "name": "JP Request", "value": format!("JP-{id}") },
            { "id": 30, "name": "Difficulty Level", "value": "3" }
        ]
    })
}

fn status_error(status: u16, path: &str) -> Error {
    match status {
        401 => Error::Unauthorized,
        404 => Error::NotFound {
            path: path.to_string(),
        },
        _ => Error::Remote {
            status,
            body: "fake failure".into(),
        },
    }
}
