//! Lenient sold-date parsing and chronological column ordering

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::DateError;
use crate::types::DateKey;

/// Date-only layouts, tried in order. Two-digit years go before four-digit
/// ones so "01/02/24" is not read as the year 24.
const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%b %d %Y",
];

/// Layouts carrying a time of day, which is discarded
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%b %d, %Y %H:%M",
];

/// Header format for DateKey columns in the output table
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Parse sold-date text like "Sold  Oct 12, 2024" into a calendar day
pub fn parse_date_key(text: &str) -> Result<DateKey, DateError> {
    let cleaned = clean(text);
    if cleaned.is_empty() {
        return Err(DateError::Empty);
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Ok(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Ok(datetime.date());
        }
    }

    Err(DateError::Unrecognized(text.trim().to_string()))
}

pub fn format_date_key(date: &DateKey) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Drop a leading "Sold" marker and collapse runs of whitespace
fn clean(text: &str) -> String {
    let mut words = text.split_whitespace().peekable();
    if words
        .peek()
        .is_some_and(|w| w.eq_ignore_ascii_case("sold"))
    {
        words.next();
    }
    words.collect::<Vec<_>>().join(" ")
}

/// Display order for date-text column headers.
///
/// Returns indices into `headers`. Headers that parse come first, ordered by
/// date and then lexically; the rest follow in lexical order. Every index
/// appears exactly once.
pub fn column_order(headers: &[String]) -> Vec<usize> {
    let mut keyed: Vec<(Option<DateKey>, &str, usize)> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (parse_date_key(h).ok(), h.as_str(), i))
        .collect();

    keyed.sort_by_key(|(date, text, _)| (date.is_none(), *date, *text));
    keyed.into_iter().map(|(_, _, i)| i).collect()
}
