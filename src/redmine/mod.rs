pub mod types;

use async_trait::async_trait;

use crate::config::{BasicAuth, Settings};
use crate::error::{Error, Result};

pub use types::{CustomField, IssueEnvelope, IssuePage, NamedRef, RawIssue};

const API_KEY_HEADER: &str = "X-Redmine-API-Key";

/// Authenticated read access to the tracker API.
///
/// Implementations perform exactly one request per call and never retry;
/// retrying or skipping is up to the caller.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<serde_json::Value>;
}

/// HTTP client for the Redmine REST API.
pub struct RedmineClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    basic_auth: Option<BasicAuth>,
}

impl RedmineClient {
    /// Build a client from validated settings. Fails with `Error::Config`
    /// before any network traffic if credentials or the URL are unusable.
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            basic_auth: settings.basic_auth.clone(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteApi for RedmineClient {
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<serde_json::Value> {
        let url = self.url_for(path);
        log::trace!("GET {url} {query:?}");

        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(ref auth) = self.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        classify_response(status.as_u16(), path, body)
    }
}

/// Map an HTTP status and body onto the client's error taxonomy.
fn classify_response(status: u16, path: &str, body: String) -> Result<serde_json::Value> {
    match status {
        200..=299 => Ok(serde_json::from_str(&body)?),
        401 => Err(Error::Unauthorized),
        404 => Err(Error::NotFound {
            path: path.to_string(),
        }),
        _ => Err(Error::Remote { status, body }),
    }
}
