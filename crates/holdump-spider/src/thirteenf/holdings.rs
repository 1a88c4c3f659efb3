use super::records::HoldingsRecord;
use super::source::{FilingSource, RawPosition};
use super::store::FilingStore;
use std::collections::HashMap;
use tracing::{debug, error, trace};

// aggregate
// ----------------------------------------------------------------------------

/// Collapse one filing's raw positions into a single record per symbol,
/// weighted by share of the filing's total value.
///
/// Values and share counts are truncated to whole units (13F tables report
/// whole dollars and whole shares). The percentage basis is the total of the
/// *grouped* values, and an all-zero filing weights every record at 0 rather
/// than dividing by zero. Output is largest position first, with symbol
/// breaking ties so repeated runs agree.
pub fn aggregate_holdings(
    raw_positions: &[RawPosition],
    filing_id: i64,
    filing_date: chrono::NaiveDate,
) -> Vec<HoldingsRecord> {
    let mut groups: HashMap<&str, (i64, i64)> = HashMap::new();
    for position in raw_positions {
        let cell = groups.entry(position.symbol.as_str()).or_insert((0, 0));
        cell.0 += position.value.trunc() as i64;
        cell.1 += position.shares.trunc() as i64;
    }

    let total: i64 = groups.values().map(|(value, _)| *value).sum();

    let mut records: Vec<HoldingsRecord> = groups
        .into_iter()
        .map(|(symbol, (value, share))| HoldingsRecord {
            filing_id,
            symbol: symbol.to_string(),
            value,
            share,
            percentage: if total == 0 {
                0.0
            } else {
                value as f64 / total as f64 * 100.0
            },
            filing_date,
        })
        .collect();

    records.sort_by(|a, b| b.value.cmp(&a.value).then(a.symbol.cmp(&b.symbol)));

    records
}

// refresh
// ----------------------------------------------------------------------------

/// Re-derive the holdings breakdown for the `backfill` most recent filings of
/// every institution.
///
/// `backfill` decides how much history gets re-derived each run, so it is a
/// required caller decision rather than a constant here.
pub async fn refresh_holdings<S, D>(
    source: &S,
    store: &D,
    backfill: usize,
    tui: bool,
) -> anyhow::Result<()>
where
    S: FilingSource,
    D: FilingStore,
{
    let time = std::time::Instant::now();
    if tui {
        println!(
            "{bar}\n{name:^40}\n{bar}",
            bar = "=".repeat(40),
            name = "13F Holdings"
        );
    }

    debug!("selecting the {backfill} most recent filings per institution");
    let filings = store.latest_filings(backfill).await.map_err(|err| {
        error!("failed to select the latest filings, error({err})");
        err
    })?;

    let bars = if tui {
        crate::tui::Bars::new(filings.len())?
    } else {
        crate::tui::Bars::hidden()
    };

    for filing in &filings {
        let spinner = bars.spinner(format!(
            "aggregating holdings for {}",
            filing.accession_number
        ));

        let positions = match source
            .infotable(filing.cik, &filing.accession_number)
            .await
        {
            Ok(positions) => positions,
            Err(err) => {
                error!(
                    "failed to fetch the information table for {}, error({err})",
                    filing.accession_number
                );
                bars.failure();
                spinner.finish_and_clear();
                continue;
            }
        };

        let records = aggregate_holdings(&positions, filing.filing_id, filing.filing_date);
        if records.is_empty() {
            // an empty filing is a valid state, not a failure
            trace!("no positions reported in {}", filing.accession_number);
            bars.success();
            spinner.finish_and_clear();
            continue;
        }

        match store.upsert_holdings(&records).await {
            Ok(()) => {
                trace!(
                    "{} holdings rows upserted for {}",
                    records.len(),
                    filing.accession_number
                );
                bars.success();
            }
            Err(err) => {
                error!(
                    "failed to upsert holdings for {}, error({err})",
                    filing.accession_number
                );
                bars.failure();
            }
        }
        spinner.finish_and_clear();
    }

    bars.finish();
    if tui {
        println!("aggregating holdings ... done\n");
    }
    debug!(
        "holdings refreshed for {} filings. {}",
        filings.len(),
        crate::time_elapsed(time)
    );

    Ok(())
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////
