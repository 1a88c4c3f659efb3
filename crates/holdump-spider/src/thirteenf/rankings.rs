use super::records::LatestFiling;

/// Select, per institution, the `per_cik` most recent filings by filing date.
///
/// Date ties break on `accession_number` descending, and the output is
/// ordered `(cik, recency)`, so repeated calls over unchanged rows return the
/// identical sequence. `per_cik` is the policy knob deciding how much
/// historical backfill a holdings refresh performs; callers pass it
/// explicitly.
pub fn top_n_by_cik(mut rows: Vec<LatestFiling>, per_cik: usize) -> Vec<LatestFiling> {
    rows.sort_by(|a, b| {
        a.cik
            .cmp(&b.cik)
            .then(b.filing_date.cmp(&a.filing_date))
            .then(b.accession_number.cmp(&a.accession_number))
    });

    let mut kept = Vec::new();
    let mut current: Option<i64> = None;
    let mut run = 0usize;
    for row in rows {
        if current != Some(row.cik) {
            current = Some(row.cik);
            run = 0;
        }
        if run < per_cik {
            kept.push(row);
            run += 1;
        }
    }
    kept
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn filing(filing_id: i64, cik: i64, date: (i32, u32, u32), accession: &str) -> LatestFiling {
        LatestFiling {
            filing_id,
            cik,
            filing_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            accession_number: accession.to_string(),
        }
    }

    fn sample() -> Vec<LatestFiling> {
        vec![
            filing(1, 100, (2024, 2, 14), "0001-24-000001"),
            filing(2, 100, (2024, 5, 15), "0001-24-000002"),
            filing(3, 100, (2024, 8, 14), "0001-24-000003"),
            filing(4, 200, (2024, 8, 14), "0002-24-000001"),
        ]
    }

    #[test]
    fn takes_the_most_recent_per_institution() {
        let top = top_n_by_cik(sample(), 2);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].filing_id, 3);
        assert_eq!(top[1].filing_id, 2);
        assert_eq!(top[2].filing_id, 4);
    }

    #[test]
    fn repeated_calls_agree() {
        let first = top_n_by_cik(sample(), 2);
        let second = top_n_by_cik(sample(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn date_ties_break_on_accession() {
        let rows = vec![
            filing(1, 100, (2024, 8, 14), "0001-24-000001"),
            filing(2, 100, (2024, 8, 14), "0001-24-000002"),
        ];
        let top = top_n_by_cik(rows, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].filing_id, 2);
    }

    #[test]
    fn depth_one_is_the_latest_only() {
        let top = top_n_by_cik(sample(), 1);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].filing_id, 3);
        assert_eq!(top[1].filing_id, 4);
    }
}
