use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::date_util::{format_date, parse_remote_date};
use crate::sync::extract::NormalizedIssue;

/// Columns selected by every issue read, in the order [`issue_from_row`] expects.
pub const ISSUE_COLUMNS: &str = "remote_id, subject, jp_request, difficulty_level, start_date, \
     due_date, assignee, estimate, spent_time, project_id, created_at, updated_at";

/// An issue as persisted, with store-managed timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct StoredIssue {
    #[serde(flatten)]
    pub issue: NormalizedIssue,
    pub created_at: String,
    pub updated_at: String,
}

// ── Issues ─────────────────────────────────────────────────────────

/// Insert or update keyed on `remote_id`. A single statement, so concurrent
/// writers can never produce two rows for one remote issue.
pub fn upsert_issue(conn: &Connection, issue: &NormalizedIssue) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO issues (
            remote_id, subject, jp_request, difficulty_level, start_date, due_date,
            assignee, estimate, spent_time, project_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'), datetime('now'))
        ON CONFLICT(remote_id) DO UPDATE SET
            subject=excluded.subject, jp_request=excluded.jp_request,
            difficulty_level=excluded.difficulty_level, start_date=excluded.start_date,
            due_date=excluded.due_date, assignee=excluded.assignee,
            estimate=excluded.estimate, spent_time=excluded.spent_time,
            project_id=excluded.project_id, updated_at=excluded.updated_at",
        params![
            issue.remote_id,
            issue.subject,
            issue.jp_request,
            issue.difficulty_level,
            issue.start_date.map(format_date),
            issue.due_date.map(format_date),
            issue.assignee,
            issue.estimate,
            issue.spent_time,
            issue.project_id,
        ],
    )?;
    Ok(())
}

pub fn get_issue(conn: &Connection, remote_id: i64) -> Result<Option<StoredIssue>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE remote_id = ?1"),
        params![remote_id],
        issue_from_row,
    )
    .optional()
}

pub fn count_issues(conn: &Connection) -> Result<u64, rusqlite::Error> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Next batch of remote ids strictly greater than `after`, ascending.
/// Used as a keyset cursor so a full walk never holds more than one batch.
pub fn issue_ids_after(
    conn: &Connection,
    after: Option<i64>,
    limit: u32,
) -> Result<Vec<i64>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT remote_id FROM issues
         WHERE ?1 IS NULL OR remote_id > ?1
         ORDER BY remote_id LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![after, limit], |row| row.get(0))?;
    rows.collect()
}

pub fn issue_from_row(row: &Row<'_>) -> Result<StoredIssue, rusqlite::Error> {
    let start_date: Option<String> = row.get(4)?;
    let due_date: Option<String> = row.get(5)?;
    Ok(StoredIssue {
        issue: NormalizedIssue {
            remote_id: row.get(0)?,
            subject: row.get(1)?,
            jp_request: row.get(2)?,
            difficulty_level: row.get(3)?,
            start_date: parse_remote_date(start_date.as_deref()),
            due_date: parse_remote_date(due_date.as_deref()),
            assignee: row.get(6)?,
            estimate: row.get(7)?,
            spent_time: row.get(8)?,
            project_id: row.get(9)?,
        },
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

// ── Sync Jobs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SyncJob {
    pub id: i64,
    pub kind: String,
    pub target: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub synced_items: u64,
    pub failed_items: u64,
    pub error_message: Option<String>,
}

pub fn insert_sync_job(
    conn: &Connection,
    kind: &str,
    target: &str,
    range_start: Option<&str>,
    range_end: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_jobs (kind, target, status, started_at, range_start, range_end)
         VALUES (?1, ?2, 'running', datetime('now'), ?3, ?4)",
        params![kind, target, range_start, range_end],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_sync_job(
    conn: &Connection,
    job_id: i64,
    status: &str,
    synced_items: u64,
    failed_items: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_jobs SET
            status = ?2, completed_at = datetime('now'),
            synced_items = ?3, failed_items = ?4, error_message = ?5
         WHERE id = ?1",
        params![
            job_id,
            status,
            synced_items as i64,
            failed_items as i64,
            error_message,
        ],
    )?;
    Ok(())
}

/// Most recent job of the given kind (`sync` or `refresh`).
pub fn last_sync_job(conn: &Connection, kind: &str) -> Result<Option<SyncJob>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, kind, target, status, started_at, completed_at,
                synced_items, failed_items, error_message
         FROM sync_jobs WHERE kind = ?1 ORDER BY id DESC LIMIT 1",
        params![kind],
        |row| {
            Ok(SyncJob {
                id: row.get(0)?,
                kind: row.get(1)?,
                target: row.get(2)?,
                status: row.get(3)?,
                started_at: row.get(4)?,
                completed_at: row.get(5)?,
                synced_items: row.get::<_, i64>(6)? as u64,
                failed_items: row.get::<_, i64>(7)? as u64,
                error_message: row.get(8)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn issue(remote_id: i64, subject: &str) -> NormalizedIssue {
        NormalizedIssue {
            remote_id,
            subject: subject.to_string(),
            jp_request: Some("JP-1".into()),
            difficulty_level: Some("3".into()),
            start_date: NaiveDate::from_ymd_opt(2025, 10, 1),
            due_date: NaiveDate::from_ymd_opt(2025, 10, 20),
            assignee: Some("Sato Yuki".into()),
            estimate: Some(5.0),
            spent_time: Some(2.5),
            project_id: Some(12),
        }
    }

    #[tokio::test]
    async fn test_issue_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_issue(conn, &issue(106160, "Checkout flow"))?;
                let stored = get_issue(conn, 106160)?.expect("issue stored");
                assert_eq!(stored.issue, issue(106160, "Checkout flow"));
                assert!(!stored.created_at.is_empty());

                assert!(get_issue(conn, 1)?.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_issue(conn, &issue(42, "first"))?;
                let first = get_issue(conn, 42)?.unwrap();

                let mut later = issue(42, "second");
                later.assignee = None;
                later.estimate = None;
                upsert_issue(conn, &later)?;

                assert_eq!(count_issues(conn)?, 1);
                let stored = get_issue(conn, 42)?.unwrap();
                assert_eq!(stored.issue.subject, "second");
                assert_eq!(stored.issue.assignee, None);
                assert_eq!(stored.issue.estimate, None);
                assert_eq!(stored.created_at, first.created_at);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_issue_ids_after_walks_in_batches() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                for id in [5, 1, 9, 3, 7] {
                    upsert_issue(conn, &issue(id, "x"))?;
                }
                assert_eq!(issue_ids_after(conn, None, 2)?, vec![1, 3]);
                assert_eq!(issue_ids_after(conn, Some(3), 2)?, vec![5, 7]);
                assert_eq!(issue_ids_after(conn, Some(7), 2)?, vec![9]);
                assert!(issue_ids_after(conn, Some(9), 2)?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_job_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                assert!(last_sync_job(conn, "sync")?.is_none());

                let job_id = insert_sync_job(
                    conn,
                    "sync",
                    "project:minden2",
                    Some("2025-10-01"),
                    Some("2025-10-31"),
                )?;
                assert!(job_id > 0);

                update_sync_job(conn, job_id, "partial_failure", 8, 2, Some("2 items failed"))?;

                let job = last_sync_job(conn, "sync")?.unwrap();
                assert_eq!(job.id, job_id);
                assert_eq!(job.status, "partial_failure");
                assert_eq!(job.synced_items, 8);
                assert_eq!(job.failed_items, 2);
                assert!(job.completed_at.is_some());
                assert!(last_sync_job(conn, "refresh")?.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
