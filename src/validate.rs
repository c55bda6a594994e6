//! Admission filter: title relevance plus price bounds

use std::collections::HashSet;
use thiserror::Error;

use crate::date::parse_date_key;
use crate::error::{DateError, PriceError};
use crate::price::{parse_price, PriceBounds, RangePolicy};
use crate::types::{Observation, RawListing, SearchTerm};

/// Why a well-formed listing did not become an observation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Rejection {
    #[error("title does not contain every keyword")]
    OffTarget,

    #[error(transparent)]
    BadPrice(#[from] PriceError),

    #[error("price {0:.2} outside admission bounds")]
    OutOfBounds(f64),

    #[error(transparent)]
    BadDate(#[from] DateError),
}

/// True when every keyword of `term` appears in `title` as a standalone word.
///
/// Marketplace search is fuzzy, so "ryzen 5" also returns "ryzen 7" and
/// "ryzen5" listings. Word order does not matter.
pub fn title_matches(title: &str, term: &SearchTerm) -> bool {
    let words: HashSet<String> = title
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    term.keywords().iter().all(|k| words.contains(k))
}

/// Run a listing through the whole admission filter for `term`
pub fn admit_listing(
    listing: &RawListing,
    term: &SearchTerm,
    bounds: &PriceBounds,
    policy: RangePolicy,
) -> Result<Observation, Rejection> {
    if !title_matches(&listing.title, term) {
        return Err(Rejection::OffTarget);
    }
    let price = parse_price(&listing.price_text, policy)?;
    if !bounds.admits(price) {
        return Err(Rejection::OutOfBounds(price));
    }
    let date = parse_date_key(&listing.date_text)?;
    Ok(Observation {
        date,
        price,
        link: listing.link.clone(),
    })
}
