use super::common::convert_date_type;
use super::source::{Filer, FilingDetails, FilingRef, FilingSource, RawPosition, SourceError};
use crate::http::*;
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

// RATE_LIMIT = 10 requests /s (the SEC's hard ceiling); requests are spaced
// a shade wider than that.
const REQUEST_GAP: Duration = Duration::from_millis(110);

const SUBMISSIONS_URL: &'static str = "https://data.sec.gov/submissions";
const ARCHIVES_URL: &'static str = "https://www.sec.gov/Archives/edgar/data";
const FULL_INDEX_URL: &'static str = "https://www.sec.gov/Archives/edgar/full-index";

/////////////////////////////////////////////////////////////////////////////////
// core
/////////////////////////////////////////////////////////////////////////////////

/// EDGAR-backed [`FilingSource`].
///
/// Submission histories come from the `data.sec.gov` JSON endpoints, filer
/// discovery from the quarterly `form.idx` full indexes, and per-filing
/// positions from the filing archive's information-table XML. The SEC
/// requires a declared identity on every request, read from the `USER_AGENT`
/// environment variable.
pub struct EdgarSource {
    http_client: HttpClient,
    last_request: Mutex<Option<Instant>>,
}

impl EdgarSource {
    pub fn from_env() -> anyhow::Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .user_agent(var("USER_AGENT")?)
            .build()?;
        Ok(Self {
            http_client,
            last_request: Mutex::new(None),
        })
    }

    // Hold every outbound request under the SEC's rate ceiling.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < REQUEST_GAP {
                tokio::time::sleep(REQUEST_GAP - since).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl FilingSource for EdgarSource {
    async fn recent_filers(
        &self,
        form: &str,
        years: RangeInclusive<i32>,
    ) -> Result<Vec<Filer>, SourceError> {
        let mut filers = Vec::new();
        for year in years {
            for quarter in 1..=4 {
                let url = format!("{FULL_INDEX_URL}/{year}/QTR{quarter}/form.idx");
                self.throttle().await;
                trace!("fetching form index {url}");
                let response = self.http_client.get(&url).send().await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    // future quarters have no index published yet
                    trace!("no form index published for {year} QTR{quarter}");
                    continue;
                }
                let body = response.text().await?;
                filers.extend(parse_form_index(&body, form));
            }
        }

        debug!("{} filer rows read from the form indexes", filers.len());
        Ok(filers)
    }

    async fn get_filings(&self, cik: i64, form: &str) -> Result<Vec<FilingRef>, SourceError> {
        let url = format!("{SUBMISSIONS_URL}/CIK{cik:010}.json");
        self.throttle().await;
        trace!("fetching submission history {url}");
        let response = self.http_client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(cik));
        }
        let submissions: Submissions = response.json().await.map_err(|err| {
            error!("failed to deserialize the submission history for CIK{cik}, error({err})");
            SourceError::Malformed(err.to_string())
        })?;

        Ok(submissions.filing_refs(cik, form))
    }

    async fn filing_details(&self, filing: &FilingRef) -> Result<FilingDetails, SourceError> {
        let positions = self
            .infotable(filing.cik, &filing.accession_number)
            .await?;

        // the 13F summary page restates the information table's totals
        Ok(FilingDetails {
            accession_number: filing.accession_number.clone(),
            report_period: filing.report_period.unwrap_or(filing.filing_date),
            filing_date: filing.filing_date,
            total_value: positions.iter().map(|position| position.value).sum(),
            total_holding: positions.len() as i64,
        })
    }

    async fn infotable(
        &self,
        cik: i64,
        accession_number: &str,
    ) -> Result<Vec<RawPosition>, SourceError> {
        // archive folders drop the dashes from the accession number
        let folder = accession_number.replace('-', "");

        let index_url = format!("{ARCHIVES_URL}/{cik}/{folder}/index.json");
        self.throttle().await;
        trace!("fetching filing index {index_url}");
        let response = self.http_client.get(&index_url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::Malformed(format!(
                "no archive folder for {accession_number}"
            )));
        }
        let index: FilingIndex = response
            .json()
            .await
            .map_err(|err| SourceError::Malformed(err.to_string()))?;

        let table_file = index.table_file().ok_or_else(|| {
            SourceError::Malformed(format!("no information table in {accession_number}"))
        })?;

        let table_url = format!("{ARCHIVES_URL}/{cik}/{folder}/{table_file}");
        self.throttle().await;
        trace!("fetching information table {table_url}");
        let xml = self
            .http_client
            .get(&table_url)
            .send()
            .await?
            .text()
            .await?;

        let table: InformationTable = quick_xml::de::from_str(&xml).map_err(|err| {
            error!("failed to deserialize the information table for {accession_number}, error({err})");
            SourceError::Malformed(err.to_string())
        })?;

        Ok(table.positions())
    }
}

// Each `form.idx` line carries: form type, company name, CIK, date filed,
// filename. Company names contain spaces, so the row splits from both ends.
fn parse_form_index(body: &str, form: &str) -> Vec<Filer> {
    let mut filers = Vec::new();
    for line in body.lines() {
        let cells: Vec<&str> = line.split_whitespace().collect();
        if cells.len() < 5 || cells[0] != form {
            continue;
        }
        let cik = match cells[cells.len() - 3].parse::<i64>() {
            Ok(cik) => cik,
            Err(_) => continue,
        };
        let name = cells[1..cells.len() - 3].join(" ");
        filers.push(Filer { cik, name });
    }
    filers
}

// de
// ----------------------------------------------------------------------------

// {
//      "cik": "1045810",
//      "name": "NVIDIA CORP",
//      "filings": {
//          "recent": {
//              "accessionNumber": [
//                  "0001045810-24-000316",
//                  "0001045810-24-000315",
//                  ...
//              ],
//              "filingDate": [ "2024-11-20", ... ],
//              "reportDate": [ "2024-10-27", "", ... ],
//              "form": [ "4", "13F-HR", "8-K", ... ],
//              ...
//          }
//      }
// }
#[derive(Debug, Deserialize)]
struct Submissions {
    filings: Filings,
}

#[derive(Debug, Deserialize)]
struct Filings {
    recent: FilingColumns,
}

// Column-orientated filing metadata; the arrays line up by index.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilingColumns {
    accession_number: Vec<String>,
    filing_date: Vec<String>,
    report_date: Vec<String>,
    form: Vec<String>,
}

impl Submissions {
    // The recent arrays are already newest-first; that order is kept.
    fn filing_refs(self, cik: i64, form: &str) -> Vec<FilingRef> {
        let recent = self.filings.recent;
        recent
            .accession_number
            .iter()
            .zip(recent.filing_date.iter())
            .zip(recent.report_date.iter())
            .zip(recent.form.iter())
            .filter(|(_, filed_form)| filed_form.as_str() == form)
            .filter_map(|(((accession, filed), period), _)| {
                Some(FilingRef {
                    cik,
                    accession_number: accession.clone(),
                    filing_date: convert_date_type(filed).ok()?,
                    // handles empty dates
                    report_period: convert_date_type(period).ok(),
                })
            })
            .collect()
    }
}

// {
//      "directory": {
//          "name": "/Archives/edgar/data/1045810/000104581024000305",
//          "item": [
//              { "name": "primary_doc.xml", "type": "text.gif", ... },
//              { "name": "infotable.xml", ... },
//              ...
//          ]
//      }
// }
#[derive(Debug, Deserialize)]
struct FilingIndex {
    directory: Directory,
}

#[derive(Debug, Deserialize)]
struct Directory {
    item: Vec<IndexItem>,
}

#[derive(Debug, Deserialize)]
struct IndexItem {
    name: String,
}

impl FilingIndex {
    // Information-table filenames vary across filers (`infotable.xml`,
    // `form13fInfoTable.xml`, ...); fall back to any XML that is not the
    // primary document.
    fn table_file(&self) -> Option<String> {
        let names: Vec<&String> = self.directory.item.iter().map(|item| &item.name).collect();
        names
            .iter()
            .find(|name| name.ends_with(".xml") && name.to_lowercase().contains("infotable"))
            .or_else(|| {
                names
                    .iter()
                    .find(|name| name.ends_with(".xml") && !name.contains("primary_doc"))
            })
            .map(|name| name.to_string())
    }
}

// <informationTable xmlns="http://www.sec.gov/edgar/document/thirteenf/informationtable">
//     <infoTable>
//         <nameOfIssuer>APPLE INC</nameOfIssuer>
//         <titleOfClass>COM</titleOfClass>
//         <cusip>037833100</cusip>
//         <value>196966</value>
//         <shrsOrPrnAmt>
//             <sshPrnamt>857</sshPrnamt>
//             <sshPrnamtType>SH</sshPrnamtType>
//         </shrsOrPrnAmt>
//         <investmentDiscretion>SOLE</investmentDiscretion>
//         <votingAuthority> ... </votingAuthority>
//     </infoTable>
//     ...
// </informationTable>
#[derive(Debug, Deserialize)]
struct InformationTable {
    #[serde(rename = "infoTable", default)]
    info_table: Vec<InfoTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoTable {
    cusip: String,
    // filers report whole dollars, but decimal cells do occur; f64 carries
    // either shape
    value: f64,
    shrs_or_prn_amt: ShrsOrPrnAmt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShrsOrPrnAmt {
    ssh_prnamt: f64,
}

impl InformationTable {
    // Raw tables identify a position by CUSIP; that is the symbol the
    // aggregation downstream groups on.
    fn positions(self) -> Vec<RawPosition> {
        self.info_table
            .into_iter()
            .map(|row| RawPosition {
                symbol: row.cusip,
                value: row.value,
                shares: row.shrs_or_prn_amt.ssh_prnamt,
            })
            .collect()
    }
}

//////////////////////////////////////////////////////////////
// -- TESTS --
//////////////////////////////////////////////////////////////
