//! Run configuration: defaults, optional JSON file, CLI overrides applied in main

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extract::ListingSelectors;
use crate::price::{PriceBounds, RangePolicy};
use crate::table::DEFAULT_ENTITY_COLUMN;

pub const SOLD_SEARCH_URL: &str = "https://www.ebay.com/sch/i.html";
pub const MAX_PAGES: u32 = 13;
pub const DEFAULT_WORKERS: usize = 4;
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; SoldPriceTracker/1.0)";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub base_url: String,
    /// Pages 1..=max_pages are requested for every term
    pub max_pages: u32,
    /// Concurrent page fetches
    pub workers: usize,
    pub timeout_secs: u64,
    /// Pause each worker takes after a request
    pub request_delay_ms: u64,
    pub user_agent: String,
    pub price_bounds: PriceBounds,
    pub range_policy: RangePolicy,
    /// Count an identical sale (link, date, price) only once per term
    pub dedupe_links: bool,
    pub entity_column: String,
    pub cache_dir: Option<PathBuf>,
    pub selectors: ListingSelectors,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: SOLD_SEARCH_URL.to_string(),
            max_pages: MAX_PAGES,
            workers: DEFAULT_WORKERS,
            timeout_secs: 30,
            request_delay_ms: 0,
            user_agent: USER_AGENT.to_string(),
            price_bounds: PriceBounds::default(),
            range_policy: RangePolicy::default(),
            dedupe_links: false,
            entity_column: DEFAULT_ENTITY_COLUMN.to_string(),
            cache_dir: None,
            selectors: ListingSelectors::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}
