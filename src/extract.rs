//! Listing extraction from sold-search result pages

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::error::ListingError;
use crate::types::RawListing;

pub const UNKNOWN_CONDITION: &str = "Unknown";

/// CSS selectors describing where listing fields live on a results page
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// Results list; absent on empty, exhausted or blocked pages
    pub container: String,
    /// One sold listing inside the container
    pub item: String,
    pub title: String,
    pub price: String,
    pub sold_date: String,
    /// Anchor carrying the listing URL in `href`
    pub link: String,
    pub condition: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            container: ".srp-results.srp-list".to_string(),
            item: "li.s-item.s-item__pl-on-bottom".to_string(),
            title: ".s-item__title".to_string(),
            price: ".s-item__price".to_string(),
            sold_date: ".POSITIVE".to_string(),
            link: "a.s-item__link".to_string(),
            condition: ".s-item__subtitle".to_string(),
        }
    }
}

/// Turns one parsed results document into listing records
pub trait ListingExtractor: Send + Sync {
    /// Whether the page has a results container at all
    fn has_results(&self, document: &Html) -> bool;

    /// Listings on the page, one result per listing node. A page without a
    /// results container yields nothing.
    fn listings<'a>(
        &'a self,
        document: &'a Html,
    ) -> Box<dyn Iterator<Item = Result<RawListing, ListingError>> + 'a>;
}

pub struct SoldListingExtractor {
    container: Selector,
    item: Selector,
    title: Selector,
    price: Selector,
    sold_date: Selector,
    link: Selector,
    condition: Selector,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {}", css, e))
}

impl SoldListingExtractor {
    pub fn new(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            container: parse_selector(&selectors.container)?,
            item: parse_selector(&selectors.item)?,
            title: parse_selector(&selectors.title)?,
            price: parse_selector(&selectors.price)?,
            sold_date: parse_selector(&selectors.sold_date)?,
            link: parse_selector(&selectors.link)?,
            condition: parse_selector(&selectors.condition)?,
        })
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Result<RawListing, ListingError> {
        let title = text_of(item, &self.title)
            .ok_or(ListingError::MissingField("title"))?
            .to_lowercase();
        let price_text = text_of(item, &self.price).ok_or(ListingError::MissingField("price"))?;
        let date_text = text_of(item, &self.sold_date)
            .map(|d| strip_sold_marker(&d))
            .ok_or(ListingError::MissingField("sold date"))?;
        let href = item
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or(ListingError::MissingField("link"))?;
        let link = href.split('?').next().unwrap_or(href).to_string();
        let condition = text_of(item, &self.condition)
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| UNKNOWN_CONDITION.to_string());

        Ok(RawListing {
            title,
            price_text,
            date_text,
            link,
            condition,
        })
    }
}

impl ListingExtractor for SoldListingExtractor {
    fn has_results(&self, document: &Html) -> bool {
        document.select(&self.container).next().is_some()
    }

    fn listings<'a>(
        &'a self,
        document: &'a Html,
    ) -> Box<dyn Iterator<Item = Result<RawListing, ListingError>> + 'a> {
        match document.select(&self.container).next() {
            Some(container) => Box::new(
                container
                    .select(&self.item)
                    .map(move |item| self.parse_item(item)),
            ),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// Text content of the first match, whitespace collapsed
fn text_of(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(|e| {
        e.text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    })
}

fn strip_sold_marker(text: &str) -> String {
    let text = text.trim();
    text.strip_prefix("Sold")
        .unwrap_or(text)
        .trim()
        .to_string()
}
