//! Search-term input

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::types::SearchTerm;

/// Supplies the terms for one run, in the order their rows should appear
pub trait TermSource {
    fn load_terms(&self) -> Result<Vec<SearchTerm>>;
}

/// Term list stored as CSV; the first column of each record is a term.
/// Blank records are ignored.
pub struct CsvTermFile {
    path: PathBuf,
}

impl CsvTermFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TermSource for CsvTermFile {
    fn load_terms(&self) -> Result<Vec<SearchTerm>> {
        if !self.path.exists() {
            bail!(
                "Term list '{}' not found. Make sure the file exists.",
                self.path.display()
            );
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open term list: {}", self.path.display()))?;

        let mut terms = Vec::new();
        for record in reader.records() {
            let record = record
                .with_context(|| format!("Failed to read term list: {}", self.path.display()))?;
            if let Some(term) = record.get(0).and_then(SearchTerm::new) {
                terms.push(term);
            }
        }
        Ok(terms)
    }
}

/// Fixed in-memory term list
impl TermSource for Vec<String> {
    fn load_terms(&self) -> Result<Vec<SearchTerm>> {
        Ok(self.iter().filter_map(|t| SearchTerm::new(t)).collect())
    }
}
