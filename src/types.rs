//! Core records passed between the scrape, filter and aggregate stages

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

/// Calendar day a listing sold on; aggregation and column key
pub type DateKey = NaiveDate;

/// Keyword set identifying one tracked product
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchTerm {
    name: String,
    keywords: Vec<String>,
}

impl SearchTerm {
    /// Build a term from one input record. Returns None for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let name = raw.trim();
        if name.is_empty() {
            return None;
        }
        let keywords = name
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        Some(Self {
            name: name.to_string(),
            keywords,
        })
    }

    /// The term as supplied, used as the row key in the output table
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-cased keywords used for title matching and the search query
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One sold-listing node as it appeared on a results page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    /// Lower-cased listing title
    pub title: String,
    pub price_text: String,
    /// Sold-date text with the "Sold" marker removed
    pub date_text: String,
    /// Listing URL without query parameters
    pub link: String,
    /// Lower-cased condition subtitle, or "Unknown"
    pub condition: String,
}

/// An admitted listing reduced to what the aggregator needs
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: DateKey,
    pub price: f64,
    /// Kept so repeated listings can be recognised across pages
    pub link: String,
}

/// Mean admitted price per sold date for one term. Built by
/// `TermAggregator::finalize` and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermDailyAverages {
    averages: BTreeMap<DateKey, f64>,
}

impl TermDailyAverages {
    pub(crate) fn from_map(averages: BTreeMap<DateKey, f64>) -> Self {
        Self { averages }
    }

    pub fn get(&self, date: &DateKey) -> Option<f64> {
        self.averages.get(date).copied()
    }

    /// Dates in ascending order
    pub fn dates(&self) -> impl Iterator<Item = &DateKey> {
        self.averages.keys()
    }

    pub fn len(&self) -> usize {
        self.averages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.averages.is_empty()
    }
}
