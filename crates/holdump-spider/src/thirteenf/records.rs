use chrono::{DateTime, NaiveDate, Utc};

/// One row of `institution_profile`: a tracked 13F filer.
///
/// `cik` is globally unique; the discovery sweep overwrites `institution` and
/// `updated_on` in place, it never duplicates a filer.
#[derive(Clone, Debug, PartialEq)]
pub struct InstitutionProfile {
    pub cik: i64,
    pub institution: String,
    pub updated_on: DateTime<Utc>,
}

/// One row of `form_13f_filing`: the parsed summary of a single filing.
///
/// `accession_number` is the natural key; re-observing a filing updates the
/// row in place. An institution accumulates one row per reporting period.
#[derive(Clone, Debug, PartialEq)]
pub struct FilingSummary {
    pub cik: i64,
    pub accession_number: String,
    pub report_period: NaiveDate,
    pub filing_date: NaiveDate,
    /// Reported in whole dollars; kept as FLOAT8 with no rounding applied.
    pub total_value: f64,
    pub total_holding: i64,
}

impl FilingSummary {
    // Second-attempt shape for a batch the store rejected: stray whitespace
    // and non-finite numerics are the only malformed inputs observed from
    // the source.
    pub(crate) fn normalized(&self) -> Self {
        let mut row = self.clone();
        row.accession_number = row.accession_number.trim().to_string();
        if !row.total_value.is_finite() {
            row.total_value = 0.0;
        }
        row
    }
}

/// One row of `form_13f_holdings`: a filing's aggregated position in one
/// symbol. `(filing_id, symbol)` is the conflict key.
#[derive(Clone, Debug, PartialEq)]
pub struct HoldingsRecord {
    pub filing_id: i64,
    pub symbol: String,
    pub value: i64,
    pub share: i64,
    /// Share of the filing's total value, in `[0, 100]`.
    pub percentage: f64,
    pub filing_date: NaiveDate,
}

/// Row shape of the latest-filings selection; the handle the holdings refresh
/// works from.
#[derive(Clone, Debug, PartialEq)]
pub struct LatestFiling {
    pub filing_id: i64,
    pub cik: i64,
    pub filing_date: NaiveDate,
    pub accession_number: String,
}
