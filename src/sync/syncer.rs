use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::date_util::{format_date, DateRange};
use crate::error::{Error, Result};
use crate::redmine::RemoteApi;
use crate::storage::repository;
use crate::storage::Database;
use crate::sync::extract::FieldExtractor;
use crate::sync::fetch::{self, ListParams};
use crate::sync::{RefreshReport, SyncProgress, SyncReport, SyncStatus};

/// Stored issues read per cursor step during a refresh.
const REFRESH_BATCH_SIZE: u32 = 200;

/// Sync every issue of `project` created within `created_on` (if given).
///
/// Pages are fetched sequentially. Each listed issue is enriched with its
/// detail representation and upserted; a failure on one issue is recorded in
/// the report and the run continues. A failing page fetch, an authentication
/// failure, or a storage error while recording the job aborts the run.
pub async fn sync_project(
    db: &Database,
    api: &dyn RemoteApi,
    settings: &Settings,
    project: &str,
    created_on: Option<DateRange>,
    progress: &dyn SyncProgress,
    cancel: &CancellationToken,
) -> Result<SyncReport> {
    let target = format!("project:{project}");

    let job_id = db
        .writer()
        .call({
            let target = target.clone();
            let range_start = created_on.map(|r| format_date(r.start));
            let range_end = created_on.map(|r| format_date(r.end));
            move |conn| {
                repository::insert_sync_job(
                    conn,
                    "sync",
                    &target,
                    range_start.as_deref(),
                    range_end.as_deref(),
                )
            }
        })
        .await?;

    let params = ListParams::new(settings, project, created_on);
    let mut report = SyncReport::new(target);
    let result = run_pages(db, api, settings, &params, &mut report, progress, cancel).await;

    // Counts reflect the issues handled before a fatal error, too.
    let (synced, failed) = (report.stored_count, report.failed_count);
    let (status, error) = match &result {
        Ok(()) => (
            report.status.as_str(),
            (failed > 0).then(|| format!("{failed} issues failed")),
        ),
        Err(e) => (SyncStatus::Failed.as_str(), Some(e.to_string())),
    };
    db.writer()
        .call(move |conn| {
            repository::update_sync_job(conn, job_id, status, synced, failed, error.as_deref())
        })
        .await?;

    result.map(|()| report)
}

async fn run_pages(
    db: &Database,
    api: &dyn RemoteApi,
    settings: &Settings,
    params: &ListParams,
    report: &mut SyncReport,
    progress: &dyn SyncProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let page_size = settings.effective_page_size();
    let extractor = FieldExtractor::new(settings.custom_fields.clone());
    let mut offset: u32 = 0;
    let mut cancelled = false;

    'paging: loop {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let page = fetch::fetch_page(api, params, offset, page_size).await?;
        report.pages_fetched += 1;

        let count = page.issues.len();
        if count == 0 {
            break;
        }
        report.total_fetched += count as u64;
        log::info!(
            "{}: fetched {count} issues at offset {offset} ({}/{})",
            report.target,
            report.total_fetched,
            page.total_count.map_or("?".to_string(), |t| t.to_string())
        );
        progress.on_page_fetched(&report.target, offset, count, page.total_count);

        for listed in &page.issues {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'paging;
            }
            match sync_issue(db, api, &extractor, &settings.detail_include, listed.id).await {
                Ok(()) => {
                    report.stored_count += 1;
                    progress.on_issue_synced(listed.id);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to sync issue {}: {e}", listed.id);
                    progress.on_issue_failed(listed.id, &e);
                    report.record_failure(listed.id, &e);
                }
            }
        }

        // A short page means the listing is exhausted even without total_count.
        if count < page_size as usize {
            break;
        }
        if page.total_count.is_some_and(|total| report.total_fetched >= total) {
            break;
        }
        offset += page_size;
    }

    if cancelled {
        log::info!("{}: cancelled after {} issues", report.target, report.total_fetched);
    }
    report.finish(cancelled);
    Ok(())
}

/// Re-fetch and overwrite every stored issue.
///
/// Stored ids are walked with a keyset cursor in ascending order. Per-record
/// failures are logged and counted; only authentication failures and storage
/// errors while reading the cursor abort the batch.
pub async fn refresh_all_details(
    db: &Database,
    api: &dyn RemoteApi,
    settings: &Settings,
    progress: &dyn SyncProgress,
    cancel: &CancellationToken,
) -> Result<RefreshReport> {
    let job_id = db
        .writer()
        .call(|conn| repository::insert_sync_job(conn, "refresh", "all", None, None))
        .await?;

    let mut report = RefreshReport::new();
    let result = run_refresh(db, api, settings, &mut report, progress, cancel).await;

    let (updated, failed) = (report.updated_count, report.failed_count);
    let (status, error) = match &result {
        Ok(()) => (
            report.status.as_str(),
            (failed > 0).then(|| format!("{failed} issues failed")),
        ),
        Err(e) => (SyncStatus::Failed.as_str(), Some(e.to_string())),
    };
    db.writer()
        .call(move |conn| {
            repository::update_sync_job(conn, job_id, status, updated, failed, error.as_deref())
        })
        .await?;

    result.map(|()| report)
}

async fn run_refresh(
    db: &Database,
    api: &dyn RemoteApi,
    settings: &Settings,
    report: &mut RefreshReport,
    progress: &dyn SyncProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let extractor = FieldExtractor::new(settings.custom_fields.clone());
    let mut cursor: Option<i64> = None;
    let mut cancelled = false;

    'batches: loop {
        let batch: Vec<i64> = db
            .reader()
            .call(move |conn| repository::issue_ids_after(conn, cursor, REFRESH_BATCH_SIZE))
            .await?;
        if batch.is_empty() {
            break;
        }

        for remote_id in batch {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'batches;
            }
            cursor = Some(remote_id);
            match sync_issue(db, api, &extractor, &settings.detail_include, remote_id).await {
                Ok(()) => report.updated_count += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("Failed to update issue {remote_id}: {e}");
                    progress.on_issue_failed(remote_id, &e);
                    report.failed_count += 1;
                }
            }
            progress.on_refresh_progress(report.updated_count, report.failed_count);
        }
    }

    log::info!(
        "Refresh finished: {} updated, {} failed",
        report.updated_count,
        report.failed_count
    );
    report.finish(cancelled);
    Ok(())
}

/// Fetch one issue's detail, normalize it, and upsert it.
async fn sync_issue(
    db: &Database,
    api: &dyn RemoteApi,
    extractor: &FieldExtractor,
    include: &[String],
    issue_id: i64,
) -> Result<()> {
    let raw = fetch::fetch_detail(api, issue_id, include).await?;
    if raw.id != issue_id {
        return Err(Error::Remote {
            status: 200,
            body: format!("requested issue {issue_id} but received {}", raw.id),
        });
    }
    let issue = extractor.extract(&raw);
    log::debug!("Upserting issue {} ({})", issue.remote_id, issue.subject);
    db.writer()
        .call(move |conn| repository::upsert_issue(conn, &issue))
        .await?;
    Ok(())
}
