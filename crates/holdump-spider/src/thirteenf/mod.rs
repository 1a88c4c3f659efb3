mod sql;

pub(crate) mod common;

/// Data model of the pipeline: institution profiles, filing summaries and
/// per-filing holdings records.
pub mod records;

/// The [`FilingSource`] contract consumed by the pipeline, and its error
/// taxonomy.
///
/// [`FilingSource`]: source::FilingSource
pub mod source;

/// The [`FilingStore`] contract, its PostgreSQL backend and the in-memory
/// backend used by dry runs and the test-suite.
///
/// [`FilingStore`]: store::FilingStore
pub mod store;

/// 13F-HR filing data from [SEC EDGAR]; submission histories, quarterly form
/// indexes and filing information tables.
///
/// [SEC EDGAR]: https://www.sec.gov/search-filings/edgar-application-programming-interfaces
pub mod edgar;

/// Institution-discovery sweep; refreshes the set of tracked 13F filers.
pub mod institutions;

/// The filing-sync loop: latest filings per institution, with bounded-failure
/// tolerance.
pub mod sync;

/// Per-filing holdings aggregation and the holdings refresh job.
pub mod holdings;

/// Latest-filings selection (top-N most recent filings per institution).
pub mod rankings;
