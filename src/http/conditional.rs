//! Conditional request module
//!
//! HTTP-date handling and evaluation of `If-Unmodified-Since`,
//! `If-Modified-Since` and `If-Range` against a file's modification time.
//! Comparisons use whole seconds, the resolution of an HTTP-date.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Conditional request headers as sent by the client
#[derive(Debug, Default, Clone, Copy)]
pub struct Conditions<'a> {
    pub if_modified_since: Option<&'a str>,
    pub if_unmodified_since: Option<&'a str>,
    pub if_range: Option<&'a str>,
}

/// Result of evaluating the preconditions of a request
#[derive(Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Serve the representation; `range_allowed` is false when `If-Range` failed
    Proceed { range_allowed: bool },
    /// 304 Not Modified
    NotModified,
    /// 412 Precondition Failed
    Failed,
}

/// Format a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP-date in any of the three formats allowed by RFC 7231
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc2822(value) {
        return Some(time.with_timezone(&Utc));
    }
    // RFC 850 and asctime forms
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Evaluate preconditions in RFC 7232 order
///
/// Callers only pass GET and HEAD requests. `last_modified` is `None` when
/// the modification time is unknown, in which case every condition is
/// ignored. An `If-Range` that is not a date is an entity tag; no entity tag
/// is ever sent, so it never matches.
pub fn evaluate(conditions: &Conditions<'_>, last_modified: Option<DateTime<Utc>>) -> Precondition {
    let Some(modified) = last_modified.map(|t| t.timestamp()) else {
        return Precondition::Proceed {
            range_allowed: true,
        };
    };

    if let Some(since) = conditions.if_unmodified_since.and_then(parse_http_date) {
        if modified > since.timestamp() {
            return Precondition::Failed;
        }
    }

    if let Some(since) = conditions.if_modified_since.and_then(parse_http_date) {
        if modified <= since.timestamp() {
            return Precondition::NotModified;
        }
    }

    let range_allowed = match conditions.if_range {
        None => true,
        Some(value) => parse_http_date(value).is_some_and(|date| date.timestamp() == modified),
    };

    Precondition::Proceed { range_allowed }
}
