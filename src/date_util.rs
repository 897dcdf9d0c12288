use chrono::{Duration, NaiveDate};

use crate::error::{Error, Result};

/// Days covered when only the end of a window is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Inclusive creation-date window for the list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::Validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Resolve optional trigger bounds into a window carrying both ends.
    ///
    /// Neither bound given means no filter. A lone end date opens the window
    /// [`DEFAULT_WINDOW_DAYS`] earlier; a lone start date closes it at `today`.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Option<Self>> {
        match (start, end) {
            (None, None) => Ok(None),
            (Some(s), Some(e)) => Self::new(s, e).map(Some),
            (Some(s), None) => Self::new(s, today).map(Some),
            (None, Some(e)) => Self::new(e - Duration::days(DEFAULT_WINDOW_DAYS), e).map(Some),
        }
    }

    /// Redmine's "between" operator for `created_on`.
    pub fn created_on_filter(&self) -> String {
        format!(
            "><{}|{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Parse a user-supplied `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("invalid date '{s}': {e}")))
}

/// Parse an optional user-supplied date, treating blank input as absent.
pub fn parse_optional_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    match s.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s).map(Some),
    }
}

/// Lenient parse of a date field from the remote payload.
pub fn parse_remote_date(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?;
    match NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(e) => {
            log::debug!("Ignoring unparseable date '{s}': {e}");
            None
        }
    }
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
