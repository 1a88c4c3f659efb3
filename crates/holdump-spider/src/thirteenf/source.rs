use chrono::NaiveDate;
use std::future::Future;
use std::ops::RangeInclusive;
use thiserror::Error;

/// A 13F filer surfaced by the discovery sweep.
#[derive(Clone, Debug)]
pub struct Filer {
    pub cik: i64,
    pub name: String,
}

/// One filing in an institution's submission history.
#[derive(Clone, Debug)]
pub struct FilingRef {
    pub cik: i64,
    pub accession_number: String,
    pub filing_date: NaiveDate,
    /// Absent when the source reports an empty period for the filing.
    pub report_period: Option<NaiveDate>,
}

/// Parsed summary details of one filing.
#[derive(Clone, Debug)]
pub struct FilingDetails {
    pub accession_number: String,
    pub report_period: NaiveDate,
    pub filing_date: NaiveDate,
    pub total_value: f64,
    pub total_holding: i64,
}

/// A single raw information-table entry: one reported position, prior to any
/// aggregation.
#[derive(Clone, Debug)]
pub struct RawPosition {
    pub symbol: String,
    pub value: f64,
    pub shares: f64,
}

/// Failure taxonomy of the filing-data provider.
///
/// The sync loop counts every variant the same way (consecutive failures,
/// then skip the institution); the variants exist so a later policy can
/// treat a missing institution differently from a flaky network.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no filings on record for CIK{0}")]
    NotFound(i64),

    #[error("transport failure, {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed filing data, {0}")]
    Malformed(String),
}

/// Abstraction over the filing-data provider.
///
/// Implemented by [`EdgarSource`] in production; the test-suite scripts its
/// own. Filings are always handed back newest-first, and every fetch is a
/// blocking call from the pipeline's perspective so the provider can enforce
/// its own request pacing.
///
/// [`EdgarSource`]: super::edgar::EdgarSource
pub trait FilingSource {
    /// Institutions that filed `form` during `years`, in index order.
    fn recent_filers(
        &self,
        form: &str,
        years: RangeInclusive<i32>,
    ) -> impl Future<Output = Result<Vec<Filer>, SourceError>> + Send;

    /// An institution's filings of `form`, newest first.
    fn get_filings(
        &self,
        cik: i64,
        form: &str,
    ) -> impl Future<Output = Result<Vec<FilingRef>, SourceError>> + Send;

    /// Fetch and parse the summary details of one filing.
    fn filing_details(
        &self,
        filing: &FilingRef,
    ) -> impl Future<Output = Result<FilingDetails, SourceError>> + Send;

    /// The filing's raw information table, one entry per reported position.
    fn infotable(
        &self,
        cik: i64,
        accession_number: &str,
    ) -> impl Future<Output = Result<Vec<RawPosition>, SourceError>> + Send;
}
