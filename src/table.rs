//! Wide price table: one row per term, one column per sold date

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::date::{column_order, format_date_key};
use crate::types::{DateKey, SearchTerm, TermDailyAverages};

pub const DEFAULT_ENTITY_COLUMN: &str = "CPU Name";

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub term: String,
    /// One cell per table date, None where the term had no sale that day
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    pub entity_column: String,
    /// Ascending, no duplicates
    pub dates: Vec<DateKey>,
    /// In term input order
    pub rows: Vec<PriceRow>,
}

impl PriceTable {
    /// Build the table from finalized per-term averages.
    ///
    /// Columns are the sorted union of every term's dates; rows keep the
    /// order of `terms`.
    pub fn assemble(entity_column: &str, terms: &[(SearchTerm, TermDailyAverages)]) -> Self {
        let dates: Vec<DateKey> = terms
            .iter()
            .flat_map(|(_, averages)| averages.dates().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = terms
            .iter()
            .map(|(term, averages)| PriceRow {
                term: term.name().to_string(),
                cells: dates.iter().map(|d| averages.get(d)).collect(),
            })
            .collect();

        Self {
            entity_column: entity_column.to_string(),
            dates,
            rows,
        }
    }

    pub fn header(&self) -> Vec<String> {
        std::iter::once(self.entity_column.clone())
            .chain(self.dates.iter().map(format_date_key))
            .collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.header())?;
        for row in &self.rows {
            let record = std::iter::once(row.term.clone()).chain(
                row.cells
                    .iter()
                    .map(|c| c.map(|v| format!("{:.2}", v)).unwrap_or_default()),
            );
            csv.write_record(record)?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// Destination for the finished table. Called once per run.
pub trait TableSink {
    fn write_table(&mut self, table: &PriceTable) -> Result<()>;
}

/// Writes the table as CSV at `path`, going through a temporary sibling file
/// so an interrupted write never leaves a partial table behind.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableSink for CsvFileSink {
    fn write_table(&mut self, table: &PriceTable) -> Result<()> {
        replace_file(&self.path, |file| table.write_csv(file))
    }
}

/// Write `path` through a `.csv.tmp` sibling that is renamed into place once
/// `write` succeeds. On failure the sibling is removed and `path` is untouched.
fn replace_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(fs::File) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    let file = fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    if let Err(e) = write(file) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move table into {}", path.display()))
}

/// Re-order a persisted table's date columns chronologically.
///
/// Column 0 is the entity key and stays first. Header text in any accepted
/// date format is ordered by its parsed day; headers that do not parse are
/// kept and placed after the dated ones.
pub fn sort_table_columns<R: io::Read, W: Write>(input: R, output: W) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.is_empty() {
        return Ok(());
    }

    let order: Vec<usize> = std::iter::once(0)
        .chain(column_order(&headers[1..]).into_iter().map(|i| i + 1))
        .collect();

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(order.iter().map(|&i| headers[i].as_str()))?;
    for record in reader.records() {
        let record = record?;
        writer.write_record(order.iter().map(|&i| record.get(i).unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}

/// `sort_table_columns` from one file to another. `output` may be `input`:
/// the sorted table is written beside it and renamed over it at the end.
pub fn sort_table_file(input: &Path, output: &Path) -> Result<()> {
    let file = fs::File::open(input)
        .with_context(|| format!("Failed to open table: {}", input.display()))?;
    replace_file(output, |out| sort_table_columns(file, out))
}
