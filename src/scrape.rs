//! Scrape orchestration: every term × page, fetched on a bounded worker pool

use anyhow::Result;
use scraper::Html;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

use crate::aggregate::TermAggregator;
use crate::config::ScrapeConfig;
use crate::extract::ListingExtractor;
use crate::fetch::{search_url, PageFetcher};
use crate::table::{PriceTable, TableSink};
use crate::terms::TermSource;
use crate::types::{DateKey, Observation, SearchTerm, TermDailyAverages};
use crate::validate::{admit_listing, Rejection};

/// Counters for one term or a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    pub pages_fetched: u32,
    pub pages_failed: u32,
    /// Fetched pages that had no results container
    pub pages_without_results: u32,
    pub listings_seen: u32,
    pub listings_malformed: u32,
    pub off_target: u32,
    pub bad_price: u32,
    pub out_of_bounds: u32,
    pub bad_date: u32,
    pub duplicates: u32,
    pub admitted: u32,
}

impl ScrapeStats {
    pub fn add(&mut self, other: &ScrapeStats) {
        self.pages_fetched += other.pages_fetched;
        self.pages_failed += other.pages_failed;
        self.pages_without_results += other.pages_without_results;
        self.listings_seen += other.listings_seen;
        self.listings_malformed += other.listings_malformed;
        self.off_target += other.off_target;
        self.bad_price += other.bad_price;
        self.out_of_bounds += other.out_of_bounds;
        self.bad_date += other.bad_date;
        self.duplicates += other.duplicates;
        self.admitted += other.admitted;
    }

    fn reject(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::OffTarget => self.off_target += 1,
            Rejection::BadPrice(_) => self.bad_price += 1,
            Rejection::OutOfBounds(_) => self.out_of_bounds += 1,
            Rejection::BadDate(_) => self.bad_date += 1,
        }
    }
}

/// Everything one page contributed, before de-duplication
#[derive(Debug, Default)]
struct PageHarvest {
    observations: Vec<Observation>,
    stats: ScrapeStats,
}

struct PageResult {
    term_index: usize,
    page: u32,
    harvest: Result<PageHarvest>,
}

/// Identity of one sale: link, sold date and price in cents. Two copies of
/// the same key are the same sale whichever page delivered them.
type SaleKey = (String, DateKey, i64);

/// Accumulation state for one term while its pages are in flight
struct TermProgress {
    aggregator: TermAggregator,
    seen_sales: HashSet<SaleKey>,
    stats: ScrapeStats,
    pages_pending: u32,
    finished: Option<TermDailyAverages>,
}

impl TermProgress {
    fn new(pages: u32) -> Self {
        Self {
            aggregator: TermAggregator::new(),
            seen_sales: HashSet::new(),
            stats: ScrapeStats::default(),
            pages_pending: pages,
            finished: None,
        }
    }

    /// Fold one page into the term as a partial sum. With `dedupe_sales` set,
    /// a sale already counted from another page is skipped. Other sales of
    /// the same listing link differ in date or price and are kept.
    fn absorb(&mut self, harvest: PageHarvest, dedupe_sales: bool) {
        self.stats.add(&harvest.stats);
        let mut partial = TermAggregator::new();
        for obs in harvest.observations {
            let key = (obs.link, obs.date, (obs.price * 100.0).round() as i64);
            if dedupe_sales && !self.seen_sales.insert(key) {
                self.stats.duplicates += 1;
                continue;
            }
            partial.add(obs.date, obs.price);
            self.stats.admitted += 1;
        }
        self.aggregator.merge(partial);
    }
}

/// Result of scraping every term, ready for table assembly
#[derive(Debug)]
pub struct ScrapeReport {
    /// In term input order
    pub averages: Vec<(SearchTerm, TermDailyAverages)>,
    pub stats: ScrapeStats,
}

pub struct ScrapeOrchestrator<'a> {
    config: &'a ScrapeConfig,
    fetcher: &'a dyn PageFetcher,
    extractor: &'a dyn ListingExtractor,
}

impl<'a> ScrapeOrchestrator<'a> {
    pub fn new(
        config: &'a ScrapeConfig,
        fetcher: &'a dyn PageFetcher,
        extractor: &'a dyn ListingExtractor,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
        }
    }

    /// Load terms, scrape them all, and hand the finished table to `sink`.
    ///
    /// A missing term list fails before anything is fetched or written.
    pub fn run(&self, source: &dyn TermSource, sink: &mut dyn TableSink) -> Result<ScrapeStats> {
        let terms = source.load_terms()?;
        if terms.is_empty() {
            warn!("Term list is empty; writing a table with no rows");
        }

        let report = self.scrape_terms(&terms);
        let table = PriceTable::assemble(&self.config.entity_column, &report.averages);
        sink.write_table(&table)?;
        info!(
            terms = table.rows.len(),
            dates = table.dates.len(),
            "Price table written"
        );
        Ok(report.stats)
    }

    /// Scrape pages 1..=max_pages for every term. Page failures are logged
    /// and counted, never returned.
    pub fn scrape_terms(&self, terms: &[SearchTerm]) -> ScrapeReport {
        let pages = self.config.max_pages;
        let jobs: Vec<(usize, u32)> = (0..terms.len())
            .flat_map(|t| (1..=pages).map(move |p| (t, p)))
            .collect();
        let workers = self.config.workers.clamp(1, jobs.len().max(1));
        info!(
            terms = terms.len(),
            pages = jobs.len(),
            workers,
            "Scraping sold listings"
        );

        let mut progress: Vec<TermProgress> = terms.iter().map(|_| TermProgress::new(pages)).collect();
        let next_job = AtomicUsize::new(0);
        let (result_tx, result_rx) = mpsc::channel::<PageResult>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let result_tx = result_tx.clone();
                let jobs = &jobs;
                let next_job = &next_job;
                scope.spawn(move || {
                    while let Some(&(term_index, page)) = jobs.get(next_job.fetch_add(1, Ordering::Relaxed)) {
                        let harvest = self.scrape_page(&terms[term_index], page);
                        if result_tx
                            .send(PageResult {
                                term_index,
                                page,
                                harvest,
                            })
                            .is_err()
                        {
                            break;
                        }
                        if !self.config.request_delay().is_zero() {
                            thread::sleep(self.config.request_delay());
                        }
                    }
                });
            }
            drop(result_tx);

            for result in result_rx {
                let term = &terms[result.term_index];
                let state = &mut progress[result.term_index];
                match result.harvest {
                    Ok(harvest) => {
                        debug!(
                            term = %term,
                            page = result.page,
                            candidates = harvest.observations.len(),
                            "Page done"
                        );
                        state.absorb(harvest, self.config.dedupe_links);
                    }
                    Err(e) => {
                        warn!(term = %term, page = result.page, "Page failed, counting it as empty: {:#}", e);
                        state.stats.pages_failed += 1;
                    }
                }

                state.pages_pending -= 1;
                if state.pages_pending == 0 {
                    let averages = std::mem::take(&mut state.aggregator).finalize();
                    log_term(term, &state.stats, &averages);
                    state.finished = Some(averages);
                }
            }
        });

        let mut stats = ScrapeStats::default();
        let averages = terms
            .iter()
            .zip(progress)
            .map(|(term, state)| {
                stats.add(&state.stats);
                let averages = state
                    .finished
                    .unwrap_or_else(|| state.aggregator.finalize());
                (term.clone(), averages)
            })
            .collect();

        ScrapeReport { averages, stats }
    }

    fn scrape_page(&self, term: &SearchTerm, page: u32) -> Result<PageHarvest> {
        let url = search_url(&self.config.base_url, term, page)?;
        let body = self.fetcher.fetch(&url)?;
        let document = Html::parse_document(&body);

        let mut harvest = PageHarvest::default();
        harvest.stats.pages_fetched = 1;

        if !self.extractor.has_results(&document) {
            debug!(term = %term, page, "No results container");
            harvest.stats.pages_without_results = 1;
            return Ok(harvest);
        }

        for listing in self.extractor.listings(&document) {
            harvest.stats.listings_seen += 1;
            let listing = match listing {
                Ok(listing) => listing,
                Err(e) => {
                    debug!(term = %term, page, "Skipping listing: {}", e);
                    harvest.stats.listings_malformed += 1;
                    continue;
                }
            };

            match admit_listing(
                &listing,
                term,
                &self.config.price_bounds,
                self.config.range_policy,
            ) {
                Ok(obs) => harvest.observations.push(obs),
                Err(rejection) => {
                    debug!(
                        term = %term,
                        page,
                        link = %listing.link,
                        condition = %listing.condition,
                        "Rejected: {}",
                        rejection
                    );
                    harvest.stats.reject(&rejection);
                }
            }
        }

        Ok(harvest)
    }
}

fn log_term(term: &SearchTerm, stats: &ScrapeStats, averages: &TermDailyAverages) {
    if averages.is_empty() {
        warn!(term = %term, seen = stats.listings_seen, "No admitted listings; row will be blank");
        return;
    }
    info!(
        term = %term,
        dates = averages.len(),
        admitted = stats.admitted,
        seen = stats.listings_seen,
        failed_pages = stats.pages_failed,
        "Finished term"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_PAGES;
    use crate::extract::{ListingSelectors, SoldListingExtractor};
    use crate::fixtures::{listing_html, results_page};
    use anyhow::bail;
    use chrono::NaiveDate;
    use reqwest::Url;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages keyed by (search keywords, page number)
    #[derive(Default)]
    struct FakeMarketplace {
        pages: HashMap<(String, u32), String>,
        failing: HashSet<(String, u32)>,
        requests: Mutex<Vec<Url>>,
    }

    impl FakeMarketplace {
        fn page(mut self, query: &str, page: u32, items: &[String]) -> Self {
            self.pages.insert((query.to_string(), page), results_page(items));
            self
        }

        fn raw_page(mut self, query: &str, page: u32, body: &str) -> Self {
            self.pages.insert((query.to_string(), page), body.to_string());
            self
        }

        fn failing(mut self, query: &str, page: u32) -> Self {
            self.failing.insert((query.to_string(), page));
            self
        }
    }

    impl PageFetcher for FakeMarketplace {
        fn fetch(&self, url: &Url) -> Result<String> {
            self.requests.lock().unwrap().push(url.clone());
            let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
            let key = (params["_nkw"].clone(), params["_pgn"].parse::<u32>()?);
            if self.failing.contains(&key) {
                bail!("connection reset");
            }
            Ok(self
                .pages
                .get(&key)
                .cloned()
                .unwrap_or_else(|| "<html><body>No exact matches found</body></html>".to_string()))
        }
    }

    struct MemorySink(Option<String>);

    impl TableSink for MemorySink {
        fn write_table(&mut self, table: &PriceTable) -> Result<()> {
            let mut out = Vec::new();
            table.write_csv(&mut out)?;
            self.0 = Some(String::from_utf8(out)?);
            Ok(())
        }
    }

    struct MissingTerms;

    impl TermSource for MissingTerms {
        fn load_terms(&self) -> Result<Vec<SearchTerm>> {
            bail!("Term list 'search_terms.csv' not found. Make sure the file exists.")
        }
    }

    fn config(pages: u32, workers: usize) -> ScrapeConfig {
        ScrapeConfig {
            max_pages: pages,
            workers,
            ..ScrapeConfig::default()
        }
    }

    fn item(title: &str, price: &str, sold: &str, id: u32) -> String {
        listing_html(
            title,
            price,
            sold,
            &format!("https://www.ebay.com/itm/{}?hash=x", id),
            None,
        )
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn approx_eq(a: Option<f64>, b: f64) -> bool {
        match a {
            Some(v) => (v - b).abs() < 0.001,
            None => false,
        }
    }

    #[test]
    fn test_pages_aggregate_per_term() {
        let market = FakeMarketplace::default()
            .page(
                "ryzen 5",
                1,
                &[
                    item("AMD Ryzen 5 3600", "$100.00", "Sold Jan 1, 2024", 1),
                    item("amd ryzen5 3600", "$999.00", "Sold Jan 1, 2024", 2),
                    item("Ryzen 5 3600 CPU", "$1.00", "Sold Jan 1, 2024", 3),
                ],
            )
            .page(
                "ryzen 5",
                2,
                &[
                    item("ryzen 5 3600", "$190.00 to $210.00", "Sold Jan 1, 2024", 4),
                    item("ryzen 5 3600", "$50.00", "Sold Jan 2, 2024", 5),
                ],
            );
        let extractor = SoldListingExtractor::new(&ListingSelectors::default()).unwrap();
        let cfg = config(3, 2);
        let orchestrator = ScrapeOrchestrator::new(&cfg, &market, &extractor);

        let report = orchestrator.scrape_terms(&[SearchTerm::new("Ryzen 5").unwrap()]);
        let (term, averages) = &report.averages[0];
        assert_eq!(term.name(), "Ryzen 5");
        assert_eq!(averages.get(&ymd(2024, 1, 1)), Some(150.0));
        assert_eq!(averages.get(&ymd(2024, 1, 2)), Some(50.0));
        assert_eq!(averages.len(), 2);

        assert_eq!(report.stats.pages_fetched, 3);
        assert_eq!(report.stats.pages_without_results, 1);
        assert_eq!(report.stats.listings_seen, 5);
        assert_eq!(report.stats.off_target, 1);
        assert_eq!(report.stats.out_of_bounds, 1);
        assert_eq!(report.stats.admitted, 3);
        assert_eq!(market.requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_container_and_failed_fetch_do_not_stop_term() {
        let market = FakeMarketplace::default()
            .failing("ryzen 5", 1)
            .raw_page("ryzen 5", 2, "<html><body>blocked</body></html>")
            .page(
                "ryzen 5",
                3,
                &[item("ryzen 5 3600", "$80.00", "Sold Mar 3, 2024", 1)],
            );
        let extractor = SoldListingExtractor::new(&ListingSelectors::default()).unwrap();
        let cfg = config(3, 1);
        let orchestrator = ScrapeOrchestrator::new(&cfg, &market, &extractor);

        let report = orchestrator.scrape_terms(&[SearchTerm::new("ryzen 5").unwrap()]);
        assert_eq!(report.averages[0].1.get(&ymd(2024, 3, 3)), Some(80.0));
        assert_eq!(report.stats.pages_failed, 1);
        assert_eq!(report.stats.pages_fetched, 2);
        assert_eq!(report.stats.pages_without_results, 1);
    }

    #[test]
    fn test_repeated_sale_counted_once_when_deduping() {
        let repeated = item("ryzen 5 3600", "$100.00", "Sold Jan 1, 2024", 7);
        let market = FakeMarketplace::default()
            .page("ryzen 5", 1, &[repeated.clone()])
            .page(
                "ryzen 5",
                2,
                &[repeated, item("ryzen 5 3600", "$200.00", "Sold Jan 1, 2024", 8)],
            );
        let extractor = SoldListingExtractor::new(&ListingSelectors::default()).unwrap();
        let terms = [SearchTerm::new("ryzen 5").unwrap()];

        let cfg = config(2, 2);
        let report = ScrapeOrchestrator::new(&cfg, &market, &extractor).scrape_terms(&terms);
        assert!(approx_eq(report.averages[0].1.get(&ymd(2024, 1, 1)), 133.33));
        assert_eq!(report.stats.duplicates, 0);

        let cfg = ScrapeConfig {
            dedupe_links: true,
            ..config(2, 2)
        };
        let report = ScrapeOrchestrator::new(&cfg, &market, &extractor).scrape_terms(&terms);
        assert!(approx_eq(report.averages[0].1.get(&ymd(2024, 1, 1)), 150.0));
        assert_eq!(report.stats.duplicates, 1);
    }

    #[test]
    fn test_same_link_different_sales_are_all_kept() {
        // One multi-quantity listing sold on two days
        let link = "https://www.ebay.com/itm/42";
        let market = FakeMarketplace::default()
            .page(
                "ryzen 5",
                1,
                &[listing_html("ryzen 5 3600", "$100.00", "Sold Jan 1, 2024", link, None)],
            )
            .page(
                "ryzen 5",
                2,
                &[listing_html("ryzen 5 3600", "$300.00", "Sold Jan 2, 2024", link, None)],
            );
        let extractor = SoldListingExtractor::new(&ListingSelectors::default()).unwrap();
        let terms = [SearchTerm::new("ryzen 5").unwrap()];

        for dedupe_links in [false, true] {
            for workers in [1, 2, 4] {
                let cfg = ScrapeConfig {
                    dedupe_links,
                    ..config(2, workers)
                };
                let report =
                    ScrapeOrchestrator::new(&cfg, &market, &extractor).scrape_terms(&terms);
                let averages = &report.averages[0].1;
                assert_eq!(averages.len(), 2);
                assert!(approx_eq(averages.get(&ymd(2024, 1, 1)), 100.0));
                assert!(approx_eq(averages.get(&ymd(2024, 1, 2)), 300.0));
                assert_eq!(report.stats.duplicates, 0);
            }
        }
    }

    #[test]
    fn test_default_config_requests_every_page() {
        let market = FakeMarketplace::default()
            .raw_page("ryzen 5", 1, "<html><body>blocked</body></html>")
            .page(
                "ryzen 5",
                5,
                &[item("ryzen 5 3600", "$80.00", "Sold Mar 3, 2024", 1)],
            );
        let extractor = SoldListingExtractor::new(&ListingSelectors::default()).unwrap();
        let cfg = ScrapeConfig::default();
        let terms = [
            SearchTerm::new("ryzen 5").unwrap(),
            SearchTerm::new("i7 9700k").unwrap(),
        ];

        let report = ScrapeOrchestrator::new(&cfg, &market, &extractor).scrape_terms(&terms);
        assert!(approx_eq(report.averages[0].1.get(&ymd(2024, 3, 3)), 80.0));
        assert_eq!(report.stats.pages_fetched, 26);

        let requests = market.requests.lock().unwrap();
        for query in ["ryzen 5", "i7 9700k"] {
            let mut pages: Vec<u32> = requests
                .iter()
                .filter_map(|url| {
                    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
                    (params["_nkw"] == query).then(|| params["_pgn"].parse().unwrap())
                })
                .collect();
            pages.sort_unstable();
            assert_eq!(pages, (1..=MAX_PAGES).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_run_writes_rows_in_term_order() {
        let market = FakeMarketplace::default()
            .page(
                "i7 9700k",
                1,
                &[item("intel i7 9700k", "$20.00", "Sold Jan 2, 2024", 1)],
            )
            .page(
                "ryzen 5",
                1,
                &[item("ryzen 5 3600", "$10.50", "Sold Jan 1, 2024", 2)],
            );
        let extractor = SoldListingExtractor::new(&ListingSelectors::default()).unwrap();
        let cfg = config(2, 4);
        let terms = vec![
            "ryzen 5".to_string(),
            "".to_string(),
            "i7 9700k".to_string(),
            "rtx 3080".to_string(),
        ];
        let mut sink = MemorySink(None);

        let stats = ScrapeOrchestrator::new(&cfg, &market, &extractor)
            .run(&terms, &mut sink)
            .unwrap();
        assert_eq!(stats.admitted, 2);
        assert_eq!(
            sink.0.unwrap(),
            "CPU Name,2024-01-01,2024-01-02\nryzen 5,10.50,\ni7 9700k,,20.00\nrtx 3080,,\n"
        );
    }

    #[test]
    fn test_missing_term_list_writes_nothing() {
        let market = FakeMarketplace::default();
        let extractor = SoldListingExtractor::new(&ListingSelectors::default()).unwrap();
        let cfg = config(13, 4);
        let mut sink = MemorySink(None);

        let err = ScrapeOrchestrator::new(&cfg, &market, &extractor)
            .run(&MissingTerms, &mut sink)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(sink.0.is_none());
        assert!(market.requests.lock().unwrap().is_empty());
    }
}
