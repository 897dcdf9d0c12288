use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound the Redmine API accepts for `limit`.
pub const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Identifies a custom field either by its numeric id or by its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSelector {
    Id(i64),
    Name(String),
}

impl FieldSelector {
    pub fn matches(&self, id: i64, name: &str) -> bool {
        match self {
            FieldSelector::Id(want) => *want == id,
            FieldSelector::Name(want) => want == name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldMapping {
    #[serde(default = "default_jp_request")]
    pub jp_request: FieldSelector,
    #[serde(default = "default_difficulty_level")]
    pub difficulty_level: FieldSelector,
}

impl Default for CustomFieldMapping {
    fn default() -> Self {
        Self {
            jp_request: default_jp_request(),
            difficulty_level: default_difficulty_level(),
        }
    }
}

fn default_jp_request() -> FieldSelector {
    FieldSelector::Name("JP Request".into())
}

fn default_difficulty_level() -> FieldSelector {
    FieldSelector::Name("Difficulty Level".into())
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// Deployment settings. Loaded once and handed to each component explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,
    /// Project identifiers a sync may be started for.
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub tracker_id: Option<i64>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub include_subprojects: bool,
    /// Values passed as `include=` on single-issue fetches.
    #[serde(default)]
    pub detail_include: Vec<String>,
    #[serde(default)]
    pub custom_fields: CustomFieldMapping,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            basic_auth: None,
            projects: Vec::new(),
            tracker_id: None,
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            include_subprojects: true,
            detail_include: Vec::new(),
            custom_fields: CustomFieldMapping::default(),
        }
    }
}

impl Settings {
    /// Default config location (`~/.redminesync/config.toml`).
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".redminesync")
            .join("config.toml"))
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path()?)
    }

    /// Load from `path` (a missing file yields defaults), then apply
    /// environment overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            Self::from_toml(&contents)?
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    /// Override individual keys from the environment. `lookup` is injected so
    /// tests don't have to mutate the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("REDMINE_URL") {
            self.url = url;
        }
        if let Some(key) = lookup("REDMINE_API_KEY") {
            self.api_key = key;
        }
        match (lookup("REDMINE_USERNAME"), lookup("REDMINE_PASSWORD")) {
            (Some(username), Some(password)) => {
                self.basic_auth = Some(BasicAuth { username, password });
            }
            (Some(username), None) => {
                let password = self
                    .basic_auth
                    .as_ref()
                    .map(|a| a.password.clone())
                    .unwrap_or_default();
                self.basic_auth = Some(BasicAuth { username, password });
            }
            (None, Some(password)) => {
                if let Some(ref mut auth) = self.basic_auth {
                    auth.password = password;
                }
            }
            (None, None) => {}
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("Redmine url is not set (REDMINE_URL)".into()));
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid Redmine url '{}': {e}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Redmine url must be http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is not set (REDMINE_API_KEY)".into()));
        }
        if self.projects.is_empty() {
            return Err(Error::Config("no allowed projects configured".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than zero".into()));
        }
        Ok(())
    }

    /// Page size clamped to what the remote API accepts.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_allowed_project(&self, identifier: &str) -> bool {
        self.projects.iter().any(|p| p == identifier)
    }
}
