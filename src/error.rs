//! Typed failures for per-listing work.
//!
//! None of these abort a run: the orchestrator counts them and moves on.
//! Run-level failures (missing term list, unwritable output) use `anyhow`.

use thiserror::Error;

/// A listing node was matched but a required sub-field is missing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListingError {
    #[error("listing has no {0}")]
    MissingField(&'static str),
}

/// Price text could not be turned into a number
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("empty price text")]
    Empty,

    #[error("price is not numeric: {0:?}")]
    NotNumeric(String),

    /// The text was a range and the active policy drops ranges
    #[error("price range discarded: {0:?}")]
    RangeDiscarded(String),
}

/// Sold-date text matched none of the accepted formats
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("empty date text")]
    Empty,

    #[error("unrecognised date format: {0:?}")]
    Unrecognized(String),
}
