//! Price text normalization ("$1,234.50", "$10.00 to $20.00")

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::PriceError;

const CURRENCY_SYMBOLS: &[char] = &['$', '£', '€', '¥'];

/// How a price range ("$10.00 to $20.00") collapses to one value.
///
/// Ranges show up on multi-quantity and auction listings. The midpoint is the
/// default point estimate; the others exist so the choice can be changed per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    #[default]
    Midpoint,
    Low,
    High,
    /// Treat ranged listings as unparsable
    Discard,
}

/// Admission bounds for a normalized price, both exclusive
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PriceBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: 10.0,
            max: 900.0,
        }
    }
}

impl PriceBounds {
    pub fn admits(&self, price: f64) -> bool {
        self.min < price && price < self.max
    }
}

/// Parse marketplace price text into a value rounded to cents
pub fn parse_price(text: &str, policy: RangePolicy) -> Result<f64, PriceError> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(PriceError::Empty);
    }

    let value = match cleaned.split_once(" to ") {
        Some((low, high)) => {
            let low = parse_number(low, text)?;
            let high = parse_number(high, text)?;
            match policy {
                RangePolicy::Midpoint => (low + high) / 2.0,
                RangePolicy::Low => low.min(high),
                RangePolicy::High => low.max(high),
                RangePolicy::Discard => return Err(PriceError::RangeDiscarded(text.to_string())),
            }
        }
        None => parse_number(cleaned, text)?,
    };

    Ok(round_cents(value))
}

fn parse_number(s: &str, original: &str) -> Result<f64, PriceError> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PriceError::NotNumeric(original.to_string()))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
