use super::records::FilingSummary;
use super::source::FilingSource;
use super::store::{FilingStore, StoreError};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Tunables for one filing-sync pass.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Tracked form type.
    pub form: String,
    /// How many recent filings to walk per institution.
    pub depth: usize,
    /// Consecutive fetch failures tolerated within one institution before
    /// the rest of its filings are given up on.
    pub failure_threshold: u32,
    /// Wall-clock bound on one institution's whole fetch loop.
    pub deadline: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            form: "13F-HR".to_string(),
            depth: 1,
            failure_threshold: 2,
            deadline: Duration::from_secs(180),
        }
    }
}

/// Per-run tally; `skipped` counts institutions that produced no filings,
/// whether through failures or an empty history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub institutions: usize,
    pub filings: usize,
    pub skipped: usize,
}

// core
// ----------------------------------------------------------------------------

/// Sync the latest filings of every institution in `ciks`, in input order.
///
/// One institution's failures never halt the run: fetch failures are absorbed
/// by the consecutive-failure counter, store rejections by a single
/// normalisation retry, and anything left over is logged per institution and
/// skipped. A run where every institution failed still returns `Ok`.
pub async fn sync_filings<S, D>(
    source: &S,
    store: &D,
    ciks: &[i64],
    opts: &SyncOptions,
    tui: bool,
) -> anyhow::Result<SyncReport>
where
    S: FilingSource,
    D: FilingStore,
{
    let time = std::time::Instant::now();
    if tui {
        println!(
            "{bar}\n{name:^40}\n{bar}",
            bar = "=".repeat(40),
            name = "13F Filings"
        );
    }

    let bars = if tui {
        crate::tui::Bars::new(ciks.len())?
    } else {
        crate::tui::Bars::hidden()
    };

    let mut report = SyncReport::default();
    for &cik in ciks {
        report.institutions += 1;
        let spinner = bars.spinner(format!("collecting filings for CIK{cik:010}"));

        // one institution's whole fetch loop runs under a deadline, so a
        // stalling source cannot hold up the batch
        let batch = match tokio::time::timeout(opts.deadline, collect_filings(source, cik, opts))
            .await
        {
            Ok(batch) => batch,
            Err(_) => {
                error!(
                    "CIK{cik} exceeded the {:?} deadline, moving to the next institution",
                    opts.deadline
                );
                Vec::new()
            }
        };

        if batch.is_empty() {
            trace!("nothing to upsert for CIK{cik}");
            report.skipped += 1;
            bars.failure();
            spinner.finish_and_clear();
            continue;
        }

        match upsert_with_fallback(store, cik, &batch).await {
            Ok(()) => {
                debug!("{} filings upserted for CIK{cik}", batch.len());
                report.filings += batch.len();
                bars.success();
            }
            Err(_) => {
                report.skipped += 1;
                bars.failure();
            }
        }
        spinner.finish_and_clear();
    }

    bars.finish();
    if tui {
        println!("collecting filings ... done\n");
    }
    debug!(
        "filing sync finished, {} filings across {} institutions ({} skipped). {}",
        report.filings,
        report.institutions,
        report.skipped,
        crate::time_elapsed(time)
    );

    Ok(report)
}

// Walk one institution's recent filings newest-first, tolerating up to
// `failure_threshold` consecutive fetch failures before giving up on the
// institution. The counter resets on every success.
async fn collect_filings<S: FilingSource>(
    source: &S,
    cik: i64,
    opts: &SyncOptions,
) -> Vec<FilingSummary> {
    let refs = match source.get_filings(cik, &opts.form).await {
        Ok(refs) => refs,
        Err(err) => {
            error!("failed to list {} filings for CIK{cik}, error({err})", opts.form);
            return Vec::new();
        }
    };
    if refs.is_empty() {
        trace!("no {} filings on record for CIK{cik}", opts.form);
        return Vec::new();
    }

    let mut batch = Vec::new();
    let mut consecutive_failures: u32 = 0;
    for filing in refs.iter().take(opts.depth) {
        match source.filing_details(filing).await {
            Ok(details) => {
                consecutive_failures = 0;
                trace!("parsed filing {} for CIK{cik}", details.accession_number);
                batch.push(FilingSummary {
                    cik,
                    accession_number: details.accession_number,
                    report_period: details.report_period,
                    filing_date: details.filing_date,
                    total_value: details.total_value,
                    total_holding: details.total_holding,
                });
            }
            Err(err) => {
                consecutive_failures += 1;
                warn!(
                    "failed to fetch filing {} for CIK{cik} ({consecutive_failures} consecutive), error({err})",
                    filing.accession_number
                );
                if consecutive_failures > opts.failure_threshold {
                    error!("giving up on CIK{cik} after {consecutive_failures} consecutive failures");
                    break;
                }
            }
        }
    }

    batch
}

// A rejected batch gets one retry with normalised rows before the
// institution is given up on.
async fn upsert_with_fallback<D: FilingStore>(
    store: &D,
    cik: i64,
    batch: &[FilingSummary],
) -> Result<(), StoreError> {
    if let Err(err) = store.upsert_filings(batch).await {
        warn!("store rejected the filing batch for CIK{cik}, retrying normalised, error({err})");
        let normalized: Vec<FilingSummary> =
            batch.iter().map(FilingSummary::normalized).collect();
        store.upsert_filings(&normalized).await.map_err(|err| {
            error!("failed to upsert filings for CIK{cik}, error({err})");
            err
        })?;
    }
    Ok(())
}
