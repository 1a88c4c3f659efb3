//! The `FilingStore` trait and its two backends.
//!
//! [`PgStore`] is the production backend: prepared statements inside one
//! transaction per batch, with conflict-key upserts from the `sql` module.
//! [`MemStore`] keeps the same semantics in a mutex-guarded map and backs
//! `--dry-run` and the test-suite.

use super::rankings;
use super::records::{FilingSummary, HoldingsRecord, InstitutionProfile, LatestFiling};
use super::sql;
use deadpool_postgres::Pool;
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, trace};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("postgres failure, {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool failure, {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("rejected batch, {0}")]
    Rejected(String),
}

/// Abstraction over the destination store.
///
/// Every write is an upsert against the table's conflict key, applied
/// atomically per batch, so re-running a sync never duplicates rows. Empty
/// batches are no-ops.
pub trait FilingStore {
    fn upsert_institutions(
        &self,
        rows: &[InstitutionProfile],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// CIKs of every tracked institution, ascending.
    fn institutions(&self) -> impl Future<Output = Result<Vec<i64>, StoreError>> + Send;

    fn upsert_filings(
        &self,
        rows: &[FilingSummary],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The `per_cik` most recent filings per institution; see
    /// [`rankings::top_n_by_cik`] for the selection contract.
    fn latest_filings(
        &self,
        per_cik: usize,
    ) -> impl Future<Output = Result<Vec<LatestFiling>, StoreError>> + Send;

    fn upsert_holdings(
        &self,
        rows: &[HoldingsRecord],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// pg
// ----------------------------------------------------------------------------

/// PostgreSQL-backed [`FilingStore`] over a deadpool connection pool.
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl FilingStore for PgStore {
    async fn upsert_institutions(&self, rows: &[InstitutionProfile]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut pg_client = self.pool.get().await?;
        let query = pg_client.prepare(sql::UPSERT_INSTITUTION).await?;
        let tx = pg_client.transaction().await?;
        for row in rows {
            tx.execute(&query, &[&row.cik, &row.institution, &row.updated_on])
                .await?;
        }
        tx.commit().await?;

        trace!("{} institution profiles upserted", rows.len());
        Ok(())
    }

    async fn institutions(&self) -> Result<Vec<i64>, StoreError> {
        let pg_client = self.pool.get().await?;
        let rows = pg_client.query(sql::SELECT_CIKS, &[]).await?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn upsert_filings(&self, rows: &[FilingSummary]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut pg_client = self.pool.get().await?;
        let query = pg_client.prepare(sql::UPSERT_FILING).await?;
        let tx = pg_client.transaction().await?;
        for row in rows {
            tx.execute(
                &query,
                &[
                    &row.cik,
                    &row.accession_number,
                    &row.report_period,
                    &row.filing_date,
                    &row.total_value,
                    &row.total_holding,
                ],
            )
            .await?;
        }
        tx.commit().await?;

        trace!("{} filing summaries upserted", rows.len());
        Ok(())
    }

    async fn latest_filings(&self, per_cik: usize) -> Result<Vec<LatestFiling>, StoreError> {
        let pg_client = self.pool.get().await?;
        let rows = pg_client
            .query(sql::LATEST_FILINGS, &[&(per_cik as i64)])
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| LatestFiling {
                filing_id: row.get(0),
                cik: row.get(1),
                filing_date: row.get(2),
                accession_number: row.get(3),
            })
            .collect())
    }

    async fn upsert_holdings(&self, rows: &[HoldingsRecord]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut pg_client = self.pool.get().await?;

        // preprocess pg query as transaction
        let query = pg_client.prepare(sql::UPSERT_HOLDING).await?;
        let tx = Arc::new(pg_client.transaction().await?);

        // iterate over the data stream and execute pg rows
        let mut stream = stream::iter(rows);
        while let Some(cell) = stream.next().await {
            let query = query.clone();
            let tx = tx.clone();
            async move {
                match tx
                    .execute(
                        &query,
                        &[
                            &cell.filing_id,
                            &cell.symbol,
                            &cell.value,
                            &cell.share,
                            &cell.percentage,
                            &cell.filing_date,
                        ],
                    )
                    .await
                {
                    Ok(_) => trace!(
                        "holdings row upserted for filing {} [{}]",
                        cell.filing_id,
                        cell.symbol
                    ),
                    Err(err) => error!(
                        "failed to upsert holdings row for filing {} [{}], error({err})",
                        cell.filing_id, cell.symbol
                    ),
                }
            }
            .await;
        }

        // unpack the transaction and commit it to the database
        Arc::into_inner(tx)
            .expect("failed to unpack Transaction from Arc")
            .commit()
            .await?;

        trace!("{} holdings rows upserted", rows.len());
        Ok(())
    }
}

// mem
// ----------------------------------------------------------------------------

/// In-memory [`FilingStore`] with the same conflict-key semantics as
/// [`PgStore`]; backs `--dry-run` and the test-suite.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    institutions: BTreeMap<i64, InstitutionProfile>,
    // accession number -> (assigned filing id, summary row)
    filings: BTreeMap<String, (i64, FilingSummary)>,
    holdings: BTreeMap<(i64, String), HoldingsRecord>,
    next_filing_id: i64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn institution_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").institutions.len()
    }

    pub fn filing_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").filings.len()
    }

    pub fn holding_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").holdings.len()
    }

    pub fn holdings_for(&self, filing_id: i64) -> Vec<HoldingsRecord> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .holdings
            .values()
            .filter(|row| row.filing_id == filing_id)
            .cloned()
            .collect()
    }
}

impl FilingStore for MemStore {
    async fn upsert_institutions(&self, rows: &[InstitutionProfile]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for row in rows {
            inner.institutions.insert(row.cik, row.clone());
        }
        Ok(())
    }

    async fn institutions(&self) -> Result<Vec<i64>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.institutions.keys().copied().collect())
    }

    async fn upsert_filings(&self, rows: &[FilingSummary]) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let inner = &mut *guard;
        for row in rows {
            // an already-seen accession number keeps its assigned filing id
            let filing_id = match inner.filings.get(&row.accession_number) {
                Some((filing_id, _)) => *filing_id,
                None => {
                    inner.next_filing_id += 1;
                    inner.next_filing_id
                }
            };
            inner
                .filings
                .insert(row.accession_number.clone(), (filing_id, row.clone()));
        }
        Ok(())
    }

    async fn latest_filings(&self, per_cik: usize) -> Result<Vec<LatestFiling>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let rows = inner
            .filings
            .iter()
            .map(|(accession, (filing_id, row))| LatestFiling {
                filing_id: *filing_id,
                cik: row.cik,
                filing_date: row.filing_date,
                accession_number: accession.clone(),
            })
            .collect();
        Ok(rankings::top_n_by_cik(rows, per_cik))
    }

    async fn upsert_holdings(&self, rows: &[HoldingsRecord]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for row in rows {
            inner
                .holdings
                .insert((row.filing_id, row.symbol.clone()), row.clone());
        }
        Ok(())
    }
}
