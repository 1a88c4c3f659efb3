use chrono::NaiveDate;
use holdump_spider::thirteenf::holdings::refresh_holdings;
use holdump_spider::thirteenf::records::{FilingSummary, HoldingsRecord, InstitutionProfile};
use holdump_spider::thirteenf::source::{
    Filer, FilingDetails, FilingRef, FilingSource, RawPosition, SourceError,
};
use holdump_spider::thirteenf::store::{FilingStore, MemStore, StoreError};
use holdump_spider::thirteenf::sync::{sync_filings, SyncOptions};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Mutex;

// Exercises the sync loop end-to-end against a scripted source and the
// in-memory store.

// -- SCRIPTED SOURCE --

#[derive(Default)]
struct MockSource {
    filings: HashMap<i64, Vec<FilingRef>>,
    // accession numbers whose detail/infotable fetches always fail
    failing: HashSet<String>,
    positions: HashMap<String, Vec<RawPosition>>,
    // accession numbers in fetch order, for cutoff assertions
    detail_calls: Mutex<Vec<String>>,
}

impl MockSource {
    fn add_filing(&mut self, cik: i64, accession: &str, date: (i32, u32, u32)) {
        self.filings.entry(cik).or_default().push(FilingRef {
            cik,
            accession_number: accession.to_string(),
            filing_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            report_period: None,
        });
    }

    fn fail_on(&mut self, accession: &str) {
        self.failing.insert(accession.to_string());
    }

    fn with_positions(&mut self, accession: &str, positions: Vec<(&str, f64, f64)>) {
        self.positions.insert(
            accession.to_string(),
            positions
                .into_iter()
                .map(|(symbol, value, shares)| RawPosition {
                    symbol: symbol.to_string(),
                    value,
                    shares,
                })
                .collect(),
        );
    }

    fn detail_calls_for(&self, prefix: &str) -> usize {
        self.detail_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|accession| accession.starts_with(prefix))
            .count()
    }
}

impl FilingSource for MockSource {
    async fn recent_filers(
        &self,
        _form: &str,
        _years: RangeInclusive<i32>,
    ) -> Result<Vec<Filer>, SourceError> {
        Ok(self
            .filings
            .keys()
            .map(|&cik| Filer {
                cik,
                name: format!("INSTITUTION {cik}"),
            })
            .collect())
    }

    async fn get_filings(&self, cik: i64, _form: &str) -> Result<Vec<FilingRef>, SourceError> {
        match self.filings.get(&cik) {
            Some(refs) => Ok(refs.clone()),
            None => Err(SourceError::NotFound(cik)),
        }
    }

    async fn filing_details(&self, filing: &FilingRef) -> Result<FilingDetails, SourceError> {
        self.detail_calls
            .lock()
            .unwrap()
            .push(filing.accession_number.clone());

        if self.failing.contains(&filing.accession_number) {
            return Err(SourceError::Malformed("scripted failure".to_string()));
        }

        let positions = self
            .positions
            .get(&filing.accession_number)
            .cloned()
            .unwrap_or_default();
        Ok(FilingDetails {
            accession_number: filing.accession_number.clone(),
            report_period: filing.report_period.unwrap_or(filing.filing_date),
            filing_date: filing.filing_date,
            total_value: positions.iter().map(|p| p.value).sum(),
            total_holding: positions.len() as i64,
        })
    }

    async fn infotable(
        &self,
        _cik: i64,
        accession_number: &str,
    ) -> Result<Vec<RawPosition>, SourceError> {
        if self.failing.contains(accession_number) {
            return Err(SourceError::Malformed("scripted failure".to_string()));
        }
        Ok(self
            .positions
            .get(accession_number)
            .cloned()
            .unwrap_or_default())
    }
}

fn deep_opts() -> SyncOptions {
    SyncOptions {
        depth: 10,
        ..SyncOptions::default()
    }
}

// -- SYNC --

#[tokio::test]
async fn sync_is_idempotent() {
    let mut source = MockSource::default();
    source.add_filing(100, "acc-100-1", (2024, 5, 15));
    source.add_filing(100, "acc-100-2", (2024, 2, 14));
    source.add_filing(200, "acc-200-1", (2024, 5, 20));

    let store = MemStore::new();
    let first = sync_filings(&source, &store, &[100, 200], &deep_opts(), false)
        .await
        .unwrap();
    assert_eq!(first.filings, 3);
    assert_eq!(store.filing_count(), 3);

    let second = sync_filings(&source, &store, &[100, 200], &deep_opts(), false)
        .await
        .unwrap();
    assert_eq!(second.filings, 3);
    assert_eq!(store.filing_count(), 3);
}

#[tokio::test]
async fn three_consecutive_failures_stop_an_institution() {
    let mut source = MockSource::default();
    for n in 1..=10 {
        let accession = format!("bad-{n:02}");
        source.add_filing(100, &accession, (2024, 5, 15));
        source.fail_on(&accession);
    }
    source.add_filing(200, "good-1", (2024, 5, 20));

    let store = MemStore::new();
    let report = sync_filings(&source, &store, &[100, 200], &deep_opts(), false)
        .await
        .unwrap();

    // the threshold (2) is exceeded on the 3rd consecutive failure; the
    // remaining 7 filings are never attempted
    assert_eq!(source.detail_calls_for("bad-"), 3);

    // the run carries on to the next institution
    assert_eq!(report.filings, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(store.filing_count(), 1);
}

#[tokio::test]
async fn the_failure_counter_resets_on_success() {
    let mut source = MockSource::default();
    for (n, good) in [true, false, false, true, false, false, true]
        .into_iter()
        .enumerate()
    {
        let accession = format!("acc-{n:02}");
        source.add_filing(100, &accession, (2024, 5, 15));
        if !good {
            source.fail_on(&accession);
        }
    }

    let store = MemStore::new();
    let report = sync_filings(&source, &store, &[100], &deep_opts(), false)
        .await
        .unwrap();

    // no run of failures ever exceeds the threshold, so every filing is
    // attempted and all three good ones land
    assert_eq!(source.detail_calls_for("acc-"), 7);
    assert_eq!(report.filings, 3);
    assert_eq!(store.filing_count(), 3);
}

#[tokio::test]
async fn a_fully_failed_run_still_completes() {
    let mut source = MockSource::default();
    source.add_filing(100, "bad-1", (2024, 5, 15));
    source.fail_on("bad-1");
    // CIK 200 has no scripted filings at all, so listing it errors

    let store = MemStore::new();
    let report = sync_filings(&source, &store, &[100, 200], &deep_opts(), false)
        .await
        .unwrap();

    assert_eq!(report.institutions, 2);
    assert_eq!(report.filings, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(store.filing_count(), 0);
}

// -- STORE FALLBACK --

// Rejects the first filing batch it sees, like a store with a transient
// schema mismatch.
struct FlakyStore {
    inner: MemStore,
    rejected_once: Mutex<bool>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemStore::new(),
            rejected_once: Mutex::new(false),
        }
    }
}

impl FilingStore for FlakyStore {
    async fn upsert_institutions(&self, rows: &[InstitutionProfile]) -> Result<(), StoreError> {
        self.inner.upsert_institutions(rows).await
    }

    async fn institutions(&self) -> Result<Vec<i64>, StoreError> {
        self.inner.institutions().await
    }

    async fn upsert_filings(&self, rows: &[FilingSummary]) -> Result<(), StoreError> {
        {
            let mut rejected = self.rejected_once.lock().unwrap();
            if !*rejected {
                *rejected = true;
                return Err(StoreError::Rejected("simulated schema mismatch".to_string()));
            }
        }
        self.inner.upsert_filings(rows).await
    }

    async fn latest_filings(
        &self,
        per_cik: usize,
    ) -> Result<Vec<holdump_spider::thirteenf::records::LatestFiling>, StoreError> {
        self.inner.latest_filings(per_cik).await
    }

    async fn upsert_holdings(&self, rows: &[HoldingsRecord]) -> Result<(), StoreError> {
        self.inner.upsert_holdings(rows).await
    }
}

#[tokio::test]
async fn a_rejected_batch_is_retried_once() {
    let mut source = MockSource::default();
    source.add_filing(100, "acc-100-1", (2024, 5, 15));

    let store = FlakyStore::new();
    let report = sync_filings(&source, &store, &[100], &deep_opts(), false)
        .await
        .unwrap();

    assert_eq!(report.filings, 1);
    assert_eq!(store.inner.filing_count(), 1);
}

// -- RANKING --

fn summary(cik: i64, accession: &str, date: (i32, u32, u32)) -> FilingSummary {
    FilingSummary {
        cik,
        accession_number: accession.to_string(),
        report_period: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        filing_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        total_value: 0.0,
        total_holding: 0,
    }
}

#[tokio::test]
async fn latest_filings_is_deterministic_and_bounded() {
    let store = MemStore::new();
    store
        .upsert_filings(&[
            summary(100, "acc-100-1", (2024, 2, 14)),
            summary(100, "acc-100-2", (2024, 5, 15)),
            summary(100, "acc-100-3", (2024, 8, 14)),
            summary(200, "acc-200-1", (2024, 8, 14)),
        ])
        .await
        .unwrap();

    let first = store.latest_filings(2).await.unwrap();
    let second = store.latest_filings(2).await.unwrap();
    assert_eq!(first, second);

    // at most 2 rows per CIK, most recent first
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].accession_number, "acc-100-3");
    assert_eq!(first[1].accession_number, "acc-100-2");
    assert_eq!(first[2].accession_number, "acc-200-1");
}

// -- HOLDINGS REFRESH --

#[tokio::test]
async fn holdings_refresh_follows_the_sync() {
    let mut source = MockSource::default();
    source.add_filing(100, "acc-100-1", (2024, 5, 15));
    source.with_positions(
        "acc-100-1",
        vec![
            ("AAPL", 100.0, 10.0),
            ("AAPL", 50.0, 5.0),
            ("MSFT", 200.0, 20.0),
        ],
    );

    let store = MemStore::new();
    sync_filings(&source, &store, &[100], &deep_opts(), false)
        .await
        .unwrap();
    refresh_holdings(&source, &store, 1, false).await.unwrap();

    let latest = store.latest_filings(1).await.unwrap();
    assert_eq!(latest.len(), 1);
    let rows = store.holdings_for(latest[0].filing_id);
    assert_eq!(rows.len(), 2);

    let sum: f64 = rows.iter().map(|r| r.percentage).sum();
    assert!((sum - 100.0).abs() < 1e-6);

    // re-deriving is idempotent on the composite key
    refresh_holdings(&source, &store, 1, false).await.unwrap();
    assert_eq!(store.holding_count(), 2);
}

#[tokio::test]
async fn an_unreadable_infotable_skips_only_that_filing() {
    let mut source = MockSource::default();
    source.add_filing(100, "acc-100-1", (2024, 5, 15));
    source.add_filing(200, "acc-200-1", (2024, 5, 20));
    source.with_positions("acc-200-1", vec![("KO", 25459.0, 400.0)]);

    let store = MemStore::new();
    sync_filings(&source, &store, &[100, 200], &deep_opts(), false)
        .await
        .unwrap();

    // the first filing's table turns unreadable after the sync
    source.fail_on("acc-100-1");

    refresh_holdings(&source, &store, 1, false).await.unwrap();
    assert_eq!(store.holding_count(), 1);
}
