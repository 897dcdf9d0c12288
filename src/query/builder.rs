use crate::error::Result;
use crate::storage::repository::{self, StoredIssue, ISSUE_COLUMNS};
use crate::storage::Database;

const DEFAULT_LIMIT: u32 = 100;

/// Builder for listing stored issues with optional filters.
#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    project_id: Option<i64>,
    start_from: Option<String>,
    due_to: Option<String>,
    limit: Option<u32>,
}

impl IssueQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Only issues starting on or after `date` (YYYY-MM-DD).
    pub fn start_from(mut self, date: &str) -> Self {
        self.start_from = Some(date.to_string());
        self
    }

    /// Only issues due on or before `date` (YYYY-MM-DD).
    pub fn due_to(mut self, date: &str) -> Self {
        self.due_to = Some(date.to_string());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Build and execute the query, most recently created first.
    pub async fn issues(self, db: &Database) -> Result<Vec<StoredIssue>> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (sql, params) = builder.build_sql();
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), repository::issue_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
            })
            .await
            .map_err(|e| crate::error::Error::Database(e.to_string()))
    }

    /// Build and execute the query, returning results as JSON.
    pub async fn to_json(self, db: &Database) -> Result<String> {
        let rows = self.issues(db).await?;
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    /// Build and execute the query, returning results as CSV.
    pub async fn to_csv(self, db: &Database) -> Result<String> {
        let rows = self.issues(db).await?;
        let mut out = String::new();
        out.push_str("remote_id,subject,jp_request,difficulty_level,start_date,due_date,assignee,estimate,spent_time,project_id,updated_at\n");
        for row in &rows {
            let issue = &row.issue;
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                issue.remote_id,
                csv_escape(&issue.subject),
                csv_escape(issue.jp_request.as_deref().unwrap_or("")),
                csv_escape(issue.difficulty_level.as_deref().unwrap_or("")),
                issue.start_date.map_or(String::new(), |d| d.to_string()),
                issue.due_date.map_or(String::new(), |d| d.to_string()),
                csv_escape(issue.assignee.as_deref().unwrap_or("")),
                issue.estimate.map_or(String::new(), |h| h.to_string()),
                issue.spent_time.map_or(String::new(), |h| h.to_string()),
                issue.project_id.map_or(String::new(), |p| p.to_string()),
                row.updated_at,
            ));
        }
        Ok(out)
    }

    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();
        let mut param_idx = 1;

        if let Some(project_id) = self.project_id {
            wheres.push(format!("project_id = ?{param_idx}"));
            params.push(Box::new(project_id));
            param_idx += 1;
        }
        if let Some(ref date) = self.start_from {
            wheres.push(format!("start_date >= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }
        if let Some(ref date) = self.due_to {
            wheres.push(format!("due_date <= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }

        let mut sql = format!("SELECT {ISSUE_COLUMNS} FROM issues");
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, remote_id DESC");
        sql.push_str(&format!(" LIMIT ?{param_idx}"));
        params.push(Box::new(self.limit.unwrap_or(DEFAULT_LIMIT)));

        (sql, params)
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
