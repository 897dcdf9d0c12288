use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Unauthorized: invalid API key or credentials")]
    Unauthorized,

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Redmine API error ({status}): {body}")]
    Remote { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl Error {
    /// Whether this error should end the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Validation(_) | Error::Unauthorized
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Unauthorized.is_fatal());
        assert!(Error::Config("missing url".into()).is_fatal());
        assert!(Error::Validation("bad project".into()).is_fatal());
        assert!(!Error::NotFound { path: "/issues/1.json".into() }.is_fatal());
        assert!(!Error::Remote { status: 500, body: "boom".into() }.is_fatal());
        assert!(!Error::Database("locked".into()).is_fatal());
    }

    #[test]
    fn test_remote_error_message() {
        let e = Error::Remote { status: 503, body: "maintenance".into() };
        assert_eq!(e.to_string(), "Redmine API error (503): maintenance");
    }
}
