//////////////////////////////////////////////////////////////////
// institutions
//////////////////////////////////////////////////////////////////

/// `institution_profile` is the master table of tracked 13F filers.
pub(crate) static UPSERT_INSTITUTION: &'static str = "
    INSERT INTO institution_profile (cik, institution, updated_on)
    VALUES ($1, $2, $3)
    ON CONFLICT (cik)
    DO UPDATE SET
        institution = EXCLUDED.institution,
        updated_on = EXCLUDED.updated_on
";

pub(crate) static SELECT_CIKS: &'static str = "
    SELECT cik
    FROM institution_profile
    ORDER BY cik
";

//////////////////////////////////////////////////////////////////
// filings
//////////////////////////////////////////////////////////////////

/// `form_13f_filing` holds one row per observed filing; `accession_number` is
/// the natural key, so re-observing a filing updates in place.
pub(crate) static UPSERT_FILING: &'static str = "
    INSERT INTO form_13f_filing (cik, accession_number, report_period, filing_date, total_value, total_holding)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (accession_number)
    DO UPDATE SET
        report_period = EXCLUDED.report_period,
        filing_date = EXCLUDED.filing_date,
        total_value = EXCLUDED.total_value,
        total_holding = EXCLUDED.total_holding
";

/// The N most recent filings per institution; $1 bounds the per-CIK depth.
/// Date ties break on `accession_number` so repeated reads agree.
pub(crate) static LATEST_FILINGS: &'static str = "
    SELECT filing_id, cik, filing_date, accession_number
    FROM (
        SELECT filing_id, cik, filing_date, accession_number,
               ROW_NUMBER() OVER (
                   PARTITION BY cik
                   ORDER BY filing_date DESC, accession_number DESC
               ) AS recency
        FROM form_13f_filing
    ) ranked
    WHERE recency <= $1
    ORDER BY cik, recency
";

//////////////////////////////////////////////////////////////////
// holdings
//////////////////////////////////////////////////////////////////

/// `form_13f_holdings` carries one row per `(filing_id, symbol)`; re-deriving
/// a filing's breakdown overwrites the weights in place.
pub(crate) static UPSERT_HOLDING: &'static str = "
    INSERT INTO form_13f_holdings (filing_id, symbol, value, share, percentage, filing_date)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (filing_id, symbol)
    DO UPDATE SET
        value = EXCLUDED.value,
        share = EXCLUDED.share,
        percentage = EXCLUDED.percentage,
        filing_date = EXCLUDED.filing_date
";
