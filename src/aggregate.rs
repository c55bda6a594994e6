//! Per-term running sums of admitted prices

use std::collections::BTreeMap;

use crate::price::round_cents;
use crate::types::{DateKey, TermDailyAverages};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct DaySum {
    total: f64,
    count: u32,
}

/// Accumulates (date, price) pairs for one term.
///
/// Sums and counts are order independent, so partial aggregators built from
/// different pages can be merged in any order.
#[derive(Debug, Clone, Default)]
pub struct TermAggregator {
    days: BTreeMap<DateKey, DaySum>,
}

impl TermAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, date: DateKey, price: f64) {
        let day = self.days.entry(date).or_default();
        day.total += price;
        day.count += 1;
    }

    /// Fold another partial aggregate into this one
    pub fn merge(&mut self, other: TermAggregator) {
        for (date, sum) in other.days {
            let day = self.days.entry(date).or_default();
            day.total += sum.total;
            day.count += sum.count;
        }
    }

    /// Mean price per date, rounded to cents
    pub fn finalize(self) -> TermDailyAverages {
        let averages = self
            .days
            .into_iter()
            .filter(|(_, d)| d.count > 0)
            .map(|(date, d)| (date, round_cents(d.total / d.count as f64)))
            .collect();
        TermDailyAverages::from_map(averages)
    }
}
