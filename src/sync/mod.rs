pub mod extract;
pub mod fetch;
pub mod syncer;

#[cfg(test)]
pub(crate) mod test_support;

use chrono::NaiveDate;
use serde::Serialize;

use crate::date_util::{self, DateRange};
use crate::error::{Error, Result};

/// Options controlling a sync operation.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl SyncOptions {
    /// Build options from raw `YYYY-MM-DD` input, rejecting malformed dates.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Ok(Self {
            start_date: date_util::parse_optional_date(start)?,
            end_date: date_util::parse_optional_date(end)?,
        })
    }

    /// The creation-date window to filter on, if any.
    pub fn date_range(&self, today: NaiveDate) -> Result<Option<DateRange>> {
        DateRange::resolve(self.start_date, self.end_date, today)
    }
}

/// One issue that could not be synced.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub issue_id: i64,
    pub error: String,
}

/// Report returned after a project sync completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub target: String,
    pub status: SyncStatus,
    pub total_fetched: u64,
    pub stored_count: u64,
    pub failed_count: u64,
    pub pages_fetched: u32,
    pub errors: Vec<ItemError>,
    /// Set when the run aborted before finishing.
    pub error: Option<String>,
}

impl SyncReport {
    pub fn new(target: String) -> Self {
        Self {
            target,
            status: SyncStatus::Success,
            total_fetched: 0,
            stored_count: 0,
            failed_count: 0,
            pages_fetched: 0,
            errors: Vec::new(),
            error: None,
        }
    }

    pub fn record_failure(&mut self, issue_id: i64, error: &Error) {
        self.failed_count += 1;
        self.errors.push(ItemError {
            issue_id,
            error: error.to_string(),
        });
    }

    /// Report for a run that failed before producing any counts.
    pub fn failed(target: String, error: &Error) -> Self {
        let mut report = Self::new(target);
        report.status = SyncStatus::Failed;
        report.error = Some(error.to_string());
        report
    }

    /// Derive the final status from the accumulated counts.
    pub fn finish(&mut self, cancelled: bool) {
        self.status = SyncStatus::from_counts(self.stored_count, self.failed_count, cancelled);
    }
}

/// Aggregate outcome of refreshing every stored issue.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub status: SyncStatus,
    pub updated_count: u64,
    pub failed_count: u64,
}

impl RefreshReport {
    pub fn new() -> Self {
        Self {
            status: SyncStatus::Success,
            updated_count: 0,
            failed_count: 0,
        }
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.status = SyncStatus::from_counts(self.updated_count, self.failed_count, cancelled);
    }
}

impl Default for RefreshReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
    Cancelled,
}

impl SyncStatus {
    pub fn from_counts(succeeded: u64, failed: u64, cancelled: bool) -> Self {
        if cancelled {
            SyncStatus::Cancelled
        } else if failed == 0 {
            SyncStatus::Success
        } else if succeeded > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "completed",
            SyncStatus::PartialFailure => "partial_failure",
            SyncStatus::Failed => "failed",
            SyncStatus::Cancelled => "cancelled",
        }
    }
}

/// Observer for sync progress. All methods default to no-ops.
pub trait SyncProgress: Send + Sync {
    fn on_page_fetched(&self, _target: &str, _offset: u32, _count: usize, _total: Option<u64>) {}
    fn on_issue_synced(&self, _issue_id: i64) {}
    fn on_issue_failed(&self, _issue_id: i64, _error: &Error) {}
    fn on_refresh_progress(&self, _updated: u64, _failed: u64) {}
}

/// Progress reporter that ignores every event.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}
