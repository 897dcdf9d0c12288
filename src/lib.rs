pub mod config;
pub mod date_util;
pub mod error;
pub mod query;
pub mod redmine;
pub mod storage;
pub mod sync;

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use config::{CustomFieldMapping, FieldSelector, Settings};
pub use error::{Error, Result};
pub use query::builder::IssueQuery;
pub use redmine::{RedmineClient, RemoteApi};
pub use storage::Database;
pub use sync::extract::NormalizedIssue;
pub use sync::{
    NoopProgress, RefreshReport, SyncOptions, SyncProgress, SyncReport, SyncStatus,
};

// Repository types the binary prints directly
pub use storage::repository::{StoredIssue, SyncJob};

use storage::repository;
use sync::syncer;

/// Snapshot of the local store for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub issue_count: u64,
    pub last_sync: Option<SyncJob>,
    pub last_refresh: Option<SyncJob>,
}

/// Main entry point for syncing Redmine issues into the local store.
pub struct RedmineSync {
    db: Database,
    settings: Settings,
    api: Arc<dyn RemoteApi>,
}

impl RedmineSync {
    pub fn new(db: Database, settings: Settings, api: Arc<dyn RemoteApi>) -> Self {
        Self { db, settings, api }
    }

    /// Build with an HTTP client configured from `settings`.
    pub fn from_settings(db: Database, settings: Settings) -> Result<Self> {
        let client = RedmineClient::new(&settings)?;
        Ok(Self::new(db, settings, Arc::new(client)))
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ── Sync commands ──────────────────────────────────────────────

    /// Sync one project. The identifier must be in the configured allow-list;
    /// otherwise nothing is fetched.
    pub async fn start_sync(
        &self,
        project: &str,
        options: &SyncOptions,
        progress: &dyn SyncProgress,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let project = project.trim();
        if project.is_empty() || !self.settings.is_allowed_project(project) {
            return Err(Error::Validation(format!(
                "Invalid project identifier '{project}'. Allowed: {}",
                self.settings.projects.join(", ")
            )));
        }

        let range = options.date_range(chrono::Local::now().date_naive())?;
        log::info!(
            "Starting sync of {project}{}",
            range.map_or(String::new(), |r| format!(" created {}..{}", r.start, r.end))
        );
        syncer::sync_project(
            &self.db,
            self.api.as_ref(),
            &self.settings,
            project,
            range,
            progress,
            cancel,
        )
        .await
    }

    /// Sync every configured project in turn.
    ///
    /// A project whose run fails outright yields a `Failed` report and the
    /// next project is still attempted. Fatal errors (bad credentials, bad
    /// dates) stop the whole batch.
    pub async fn sync_all(
        &self,
        options: &SyncOptions,
        progress: &dyn SyncProgress,
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncReport>> {
        let range = options.date_range(chrono::Local::now().date_naive())?;

        let mut reports = Vec::with_capacity(self.settings.projects.len());
        for project in &self.settings.projects {
            if cancel.is_cancelled() {
                break;
            }
            log::info!("Syncing project {project}");
            let result = syncer::sync_project(
                &self.db,
                self.api.as_ref(),
                &self.settings,
                project,
                range,
                progress,
                cancel,
            )
            .await;
            match result {
                Ok(report) => reports.push(report),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("Failed to sync {project}: {e}");
                    reports.push(SyncReport::failed(format!("project:{project}"), &e));
                }
            }
        }
        Ok(reports)
    }

    /// Re-fetch every stored issue and overwrite it with the current remote state.
    pub async fn refresh_all_details(
        &self,
        progress: &dyn SyncProgress,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport> {
        syncer::refresh_all_details(&self.db, self.api.as_ref(), &self.settings, progress, cancel)
            .await
    }

    // ── Read commands ──────────────────────────────────────────────

    pub async fn list_issues(&self, query: IssueQuery) -> Result<Vec<StoredIssue>> {
        query.issues(&self.db).await
    }

    pub async fn status(&self) -> Result<StoreStatus> {
        status(&self.db).await
    }
}

/// Read the store summary without needing remote credentials.
pub async fn status(db: &Database) -> Result<StoreStatus> {
    db.reader()
        .call(|conn| {
            Ok::<_, rusqlite::Error>(StoreStatus {
                issue_count: repository::count_issues(conn)?,
                last_sync: repository::last_sync_job(conn, "sync")?,
                last_refresh: repository::last_sync_job(conn, "refresh")?,
            })
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))
}
