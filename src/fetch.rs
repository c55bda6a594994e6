use anyhow::{Context, Result};
use reqwest::Url;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::SearchTerm;

/// Fetches the raw body of one results page
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<String>;
}

/// Sold/completed search URL for one page of a term's results
pub fn search_url(base: &str, term: &SearchTerm, page: u32) -> Result<Url> {
    let params = [
        ("_nkw", term.keywords().join(" ")),
        ("_sacat", "0".to_string()),
        ("rt", "nc".to_string()),
        ("LH_Sold", "1".to_string()),
        ("LH_Complete", "1".to_string()),
        ("_pgn", page.to_string()),
    ];
    Url::parse_with_params(base, &params)
        .with_context(|| format!("Invalid marketplace URL: {}", base))
}

/// Blocking HTTP fetcher with an optional on-disk response cache
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    cache_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, cache_dir: Option<PathBuf>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, cache_dir })
    }

    fn url_to_cache_path(&self, url: &Url) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let mut path = dir.join(url.host_str().unwrap_or("unknown-host"));
        for segment in url.path_segments().into_iter().flatten() {
            if !segment.is_empty() {
                path.push(segment);
            }
        }
        // Pages of one search differ only by query, so it becomes the file name
        let query: String = url
            .query()
            .unwrap_or("index")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Some(path.join(format!("{}.html", query)))
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<String> {
        let cache_path = self.url_to_cache_path(url);

        if let Some(path) = cache_path.as_ref().filter(|p| p.exists()) {
            return fs::read_to_string(path)
                .with_context(|| format!("Failed to read cache: {:?}", path));
        }

        let text = self
            .client
            .get(url.clone())
            .send()
            .with_context(|| format!("Failed to fetch: {}", url))?
            .error_for_status()
            .with_context(|| format!("Bad response: {}", url))?
            .text()
            .with_context(|| format!("Failed to read response: {}", url))?;

        if let Some(path) = cache_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &text)?;
        }

        Ok(text)
    }
}
