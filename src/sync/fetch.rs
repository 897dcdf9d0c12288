use crate::config::Settings;
use crate::date_util::DateRange;
use crate::error::Result;
use crate::redmine::{IssueEnvelope, IssuePage, RawIssue, RemoteApi};

const ISSUES_PATH: &str = "/issues.json";

/// Filters applied to every page of a project's issue list.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub project: String,
    pub tracker_id: Option<i64>,
    pub created_on: Option<DateRange>,
    pub include_subprojects: bool,
}

impl ListParams {
    pub fn new(settings: &Settings, project: &str, created_on: Option<DateRange>) -> Self {
        Self {
            project: project.to_string(),
            tracker_id: settings.tracker_id,
            created_on,
            include_subprojects: settings.include_subprojects,
        }
    }

    /// Query string for one page.
    pub fn query(&self, offset: u32, limit: u32) -> Vec<(String, String)> {
        let mut query = vec![("project_id".to_string(), self.project.clone())];
        if let Some(tracker) = self.tracker_id {
            query.push(("tracker_id".into(), tracker.to_string()));
        }
        if let Some(ref range) = self.created_on {
            query.push(("created_on".into(), range.created_on_filter()));
        }
        if !self.include_subprojects {
            query.push(("subproject_id".into(), "!*".into()));
        }
        query.push(("limit".into(), limit.to_string()));
        query.push(("offset".into(), offset.to_string()));
        query
    }
}

/// Fetch one page of issues. The page is returned as-is; deciding whether to
/// continue is the caller's job.
pub async fn fetch_page(
    api: &dyn RemoteApi,
    params: &ListParams,
    offset: u32,
    limit: u32,
) -> Result<IssuePage> {
    let value = api.get_json(ISSUES_PATH, &params.query(offset, limit)).await?;
    Ok(serde_json::from_value(value)?)
}

/// Fetch the single-issue representation, optionally with nested data such
/// as `journals` or `time_entries`.
pub async fn fetch_detail(api: &dyn RemoteApi, issue_id: i64, include: &[String]) -> Result<RawIssue> {
    let path = format!("/issues/{issue_id}.json");
    let mut query = Vec::new();
    if !include.is_empty() {
        query.push(("include".to_string(), include.join(",")));
    }
    let value = api.get_json(&path, &query).await?;
    let envelope: IssueEnvelope = serde_json::from_value(value)?;
    Ok(envelope.issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sync::test_support::FakeRedmine;
    use chrono::NaiveDate;

    fn params(created_on: Option<DateRange>, include_subprojects: bool) -> ListParams {
        ListParams {
            project: "minden2".into(),
            tracker_id: Some(7),
            created_on,
            include_subprojects,
        }
    }

    fn lookup<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
        query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_query_without_dates() {
        let query = params(None, true).query(200, 100);
        assert_eq!(lookup(&query, "project_id"), Some("minden2"));
        assert_eq!(lookup(&query, "tracker_id"), Some("7"));
        assert_eq!(lookup(&query, "limit"), Some("100"));
        assert_eq!(lookup(&query, "offset"), Some("200"));
        assert_eq!(lookup(&query, "created_on"), None);
        assert_eq!(lookup(&query, "subproject_id"), None);
    }

    #[test]
    fn test_query_with_dates_and_no_subprojects() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
        )
        .unwrap();
        let query = params(Some(range), false).query(0, 50);
        assert_eq!(lookup(&query, "created_on"), Some("><2025-10-01|2025-10-31"));
        assert_eq!(lookup(&query, "subproject_id"), Some("!*"));
    }

    #[tokio::test]
    async fn test_fetch_page_surfaces_total_count() {
        let fake = FakeRedmine::with_issues(5);
        let page = fetch_page(&fake, &params(None, true), 0, 3).await.unwrap();
        assert_eq!(page.issues.len(), 3);
        assert_eq!(page.total_count, Some(5));
        assert_eq!(fake.list_offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_fetch_detail_passes_include() {
        let fake = FakeRedmine::with_issues(2);
        let issue = fetch_detail(&fake, 2, &["journals".into(), "time_entries".into()])
            .await
            .unwrap();
        assert_eq!(issue.id, 2);
        assert_eq!(
            fake.last_detail_query(),
            Some(vec![("include".to_string(), "journals,time_entries".to_string())])
        );
    }

    #[tokio::test]
    async fn test_fetch_detail_not_found() {
        let fake = FakeRedmine::with_issues(1);
        let result = fetch_detail(&fake, 999, &[]).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
