use crate::cli::Step;
use chrono::Datelike;
use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod};
use dotenv::var;
use holdump_spider::thirteenf::edgar::EdgarSource;
use holdump_spider::thirteenf::holdings::refresh_holdings;
use holdump_spider::thirteenf::institutions::sync_institutions;
use holdump_spider::thirteenf::source::FilingSource;
use holdump_spider::thirteenf::store::{FilingStore, MemStore, PgStore};
use holdump_spider::thirteenf::sync::{sync_filings, SyncOptions};
use std::time::Duration;
use tracing::{debug, error, info, trace};

const FORM: &str = "13F-HR";

// the discovery sweep reads this many years of form indexes back
const SWEEP_YEARS: i32 = 5;

pub(crate) struct RunOptions {
    pub backfill: usize,
    pub depth: usize,
    pub deadline: Duration,
    pub dry_run: bool,
    pub tui: bool,
}

/// Run the requested pipeline steps in order.
pub(crate) async fn run(steps: Vec<Step>, opts: &RunOptions) -> anyhow::Result<()> {
    let source = EdgarSource::from_env()?;

    if opts.dry_run {
        let store = MemStore::new();
        run_steps(&source, &store, &steps, opts).await?;
        info!(
            "dry run complete: {} institutions, {} filings, {} holdings rows would be written",
            store.institution_count(),
            store.filing_count(),
            store.holding_count()
        );
        if opts.tui {
            println!(
                "dry run: {} institutions, {} filings, {} holdings rows",
                store.institution_count(),
                store.filing_count(),
                store.holding_count()
            );
        }
        return Ok(());
    }

    let store = PgStore::new(connect()?);
    run_steps(&source, &store, &steps, opts).await
}

/// Build the holdump connection pool from the environment.
pub(crate) fn connect() -> anyhow::Result<Pool> {
    trace!("creating postgres connection pool config");
    let mut pg_config = deadpool_postgres::Config::new();
    pg_config.url = Some(var("HOLDUMP_URL")?);
    pg_config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let pool = pg_config.create_pool(
        Some(deadpool_postgres::Runtime::Tokio1),
        tokio_postgres::NoTls,
    )?;
    debug!("holdump connection pool established");

    Ok(pool)
}

async fn run_steps<S, D>(
    source: &S,
    store: &D,
    steps: &[Step],
    opts: &RunOptions,
) -> anyhow::Result<()>
where
    S: FilingSource,
    D: FilingStore,
{
    let time = std::time::Instant::now();

    for step in steps {
        match step {
            Step::Institutions => {
                let current_year = chrono::Utc::now().year();
                let years = current_year - SWEEP_YEARS..=current_year;
                let count = sync_institutions(source, store, FORM, years, opts.tui).await?;
                info!("{count} institution profiles refreshed");
            }

            Step::Filings => {
                let ciks = store.institutions().await.map_err(|err| {
                    error!("failed to read the tracked institutions, error({err})");
                    err
                })?;
                let sync_opts = SyncOptions {
                    form: FORM.to_string(),
                    depth: opts.depth,
                    deadline: opts.deadline,
                    ..SyncOptions::default()
                };
                let report = sync_filings(source, store, &ciks, &sync_opts, opts.tui).await?;
                info!(
                    "{} filings synced across {} institutions ({} skipped)",
                    report.filings, report.institutions, report.skipped
                );
            }

            Step::Holdings => {
                refresh_holdings(source, store, opts.backfill, opts.tui).await?;
                info!("holdings refreshed");
            }
        }
    }

    info!("sync finished, time elapsed: {:?}", time.elapsed());

    Ok(())
}
