//! Pure input checks applied before any write. No I/O here; every function
//! either normalizes a value or returns a `Validation` error the caller can
//! surface directly.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use url::Url;

use crate::error::{Result, TrackerError};
use crate::schema::StatusVocabulary;

/// Trim a required string field; empty or missing is an error.
pub fn required_string(value: Option<&str>, field: &str) -> Result<String> {
    let trimmed = value.unwrap_or("").trim();
    if trimmed.is_empty() {
        return Err(TrackerError::Validation(format!("'{field}' is required")));
    }
    Ok(trimmed.to_string())
}

/// Like `required_string` but phrased for patches, where the field was
/// supplied explicitly and must not be blanked out.
pub fn non_empty_string(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::Validation(format!(
            "'{field}' cannot be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional string; empty collapses to `None` (stored as NULL).
pub fn optional_string(value: Option<&str>) -> Option<String> {
    let trimmed = value.unwrap_or("").trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A status must be a member of the active vocabulary.
pub fn validate_status(value: &str, vocab: &StatusVocabulary) -> Result<String> {
    let status = value.trim().to_string();
    if !vocab.contains(&status) {
        return Err(TrackerError::Validation(format!(
            "Invalid status '{status}'. Allowed: {}",
            vocab.allowed_list()
        )));
    }
    Ok(status)
}

/// Absolute http(s) URL check, applied to application URLs and contact
/// LinkedIn profiles.
pub fn is_http_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(parsed) => parsed.scheme() == "http" || parsed.scheme() == "https",
        Err(_) => false,
    }
}

/// Validate an optional application URL. Empty is fine (NULL); anything else
/// must be an absolute http(s) URL.
pub fn validate_application_url(value: Option<&str>) -> Result<Option<String>> {
    let url = optional_string(value);
    if let Some(u) = &url {
        if !is_http_url(u) {
            return Err(TrackerError::Validation(
                "Invalid URL: must start with http(s) and be absolute".to_string(),
            ));
        }
    }
    Ok(url)
}

/// Validate an optional LinkedIn URL with the contact-specific message.
pub fn validate_linkedin_url(value: Option<&str>) -> Result<Option<String>> {
    let url = optional_string(value);
    if let Some(u) = &url {
        if !is_http_url(u) {
            return Err(TrackerError::Validation(
                "LinkedIn must be a valid http(s) URL".to_string(),
            ));
        }
    }
    Ok(url)
}

/// Parse an activity date and normalize it to UTC ISO-8601 with milliseconds.
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, and bare
/// `YYYY-MM-DD`. An empty value means "no date scheduled" and maps to `None`;
/// an unparseable value is an error, never silently dropped.
pub fn normalize_date(value: Option<&str>) -> Result<Option<String>> {
    let raw = match optional_string(value) {
        Some(r) => r,
        None => return Ok(None),
    };

    let utc: DateTime<Utc> = if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        Utc.from_utc_datetime(&naive)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S") {
        Utc.from_utc_datetime(&naive)
    } else if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        match date.and_hms_opt(0, 0, 0) {
            Some(naive) => Utc.from_utc_datetime(&naive),
            None => return Err(TrackerError::Validation("Invalid date".to_string())),
        }
    } else {
        return Err(TrackerError::Validation("Invalid date".to_string()));
    };

    Ok(Some(utc.to_rfc3339_opts(SecondsFormat::Millis, true)))
}

/// Ids and foreign keys must be positive.
pub fn positive_id(value: i64, what: &str) -> Result<i64> {
    if value <= 0 {
        return Err(TrackerError::Validation(format!("Invalid {what}")));
    }
    Ok(value)
}
