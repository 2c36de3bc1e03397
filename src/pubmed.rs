//! PubMed E-utilities client.
//!
//! Two endpoints are used:
//! - esearch resolves a free-text query to an ordered list of PMIDs (JSON)
//! - efetch retrieves full article metadata for a batch of PMIDs (XML)
//!
//! `PubMedClient::search` composes them into a pull-based record stream:
//! eager within a batch, lazy across batches, so a consumer that stops
//! pulling triggers no further requests.

use std::collections::HashMap;
use std::time::Duration;

use async_stream::try_stream;
use futures::Stream;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PharmascanError, Result};

/// NCBI E-utilities base URL
pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Maximum PMIDs per efetch request (NCBI guidance)
const MAX_BATCH_SIZE: usize = 200;

/// Fetch attempts per batch before surfacing a fetch failure
const MAX_RETRIES: u32 = 3;

/// Initial retry backoff; doubles per attempt, with jitter
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// User agent string for requests
const USER_AGENT: &str = "pharmascan/0.1";

/// One article as returned by efetch.
///
/// Every field except the PMID may be empty; the fetcher assumes nothing
/// about the record beyond its identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperRecord {
    /// PubMed identifier
    pub pmid: String,
    /// Article title
    pub title: String,
    /// Publication date, possibly partial (e.g. "2023" or "2023-Jun-15")
    pub pub_date: String,
    /// Authors in citation order
    pub authors: Vec<PaperAuthor>,
}

/// One author entry of a [`PaperRecord`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperAuthor {
    /// Display name ("Fore Last"), possibly empty
    pub name: String,
    /// Raw affiliation strings, free text
    pub affiliations: Vec<String>,
}

/// Query options for a PubMed search
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Retrieval window: at most this many PMIDs are resolved
    pub max_results: usize,
    /// Records per efetch request (clamped to the efetch ceiling)
    pub batch_size: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 1000,
            batch_size: 100,
        }
    }
}

/// E-utilities client with NCBI etiquette parameters
pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMedClient {
    /// Create a client against the public E-utilities endpoint
    pub fn new() -> Result<Self> {
        Self::with_base_url(EUTILS_BASE_URL)
    }

    /// Create a client against a custom base URL (mirrors, tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PharmascanError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            email: None,
        })
    }

    /// Attach an NCBI API key (raises the request-rate allowance)
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Attach a contact email, forwarded per NCBI etiquette
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    fn etiquette_params(&self, params: &mut Vec<(&'static str, String)>) {
        params.push(("tool", "pharmascan".to_string()));
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
    }

    /// Search PubMed and stream full records.
    ///
    /// esearch resolves the query to an ordered PMID window, then efetch
    /// retrieves the records batch by batch, yielded in esearch order.
    /// Zero matches produce an empty stream, not an error. A batch that
    /// fails every retry attempt ends the stream with
    /// [`PharmascanError::FetchFailure`]; records from earlier batches have
    /// already been yielded at that point.
    pub fn search<'a>(
        &'a self,
        query: &str,
        options: &SearchOptions,
    ) -> impl Stream<Item = Result<PaperRecord>> + 'a {
        let query = query.to_string();
        let options = options.clone();

        try_stream! {
            let window = self.esearch(&query, options.max_results).await?;
            info!(
                total = window.total,
                resolved = window.pmids.len(),
                "PubMed esearch complete"
            );

            if !window.pmids.is_empty() {
                let batch_size = options.batch_size.clamp(1, MAX_BATCH_SIZE);
                for (index, batch) in window.pmids.chunks(batch_size).enumerate() {
                    if index > 0 {
                        // E-utilities etiquette: at most 3 requests/s without an API key
                        let delay = 340 + rand::random::<u64>() % 160;
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }

                    let records = self.efetch_with_retry(batch).await?;
                    debug!(
                        batch = index + 1,
                        requested = batch.len(),
                        parsed = records.len(),
                        "Batch fetched"
                    );

                    for record in records {
                        yield record;
                    }
                }
            }
        }
    }

    /// Resolve the query to an ordered PMID window via esearch.
    async fn esearch(&self, query: &str, max: usize) -> Result<PmidWindow> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmax", max.to_string()),
            ("retmode", "json".to_string()),
        ];
        self.etiquette_params(&mut params);

        debug!(query = query, retmax = max, "Sending esearch request");

        let response = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PharmascanError::Api {
                code: status.as_u16() as i32,
                message: format!("esearch failed: {}", status),
            });
        }

        let body: EsearchResponse = response
            .json()
            .await
            .map_err(|e| PharmascanError::Parse(format!("bad esearch payload: {}", e)))?;

        let result = body.esearchresult;
        if let Some(message) = result.error {
            return Err(PharmascanError::QueryRejected(message));
        }

        Ok(PmidWindow {
            total: result.count.parse().unwrap_or(0),
            pmids: result.idlist,
        })
    }

    /// Fetch one batch, retrying transient failures with exponential backoff.
    ///
    /// Retry exhaustion surfaces a `FetchFailure` carrying exactly the PMIDs
    /// of this batch.
    async fn efetch_with_retry(&self, pmids: &[String]) -> Result<Vec<PaperRecord>> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=MAX_RETRIES {
            match self.efetch(pmids).await {
                Ok(records) => return Ok(records),
                Err(e) => {
                    warn!(
                        attempt,
                        batch_start = pmids.first().map(String::as_str).unwrap_or(""),
                        error = %e,
                        "Batch fetch attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < MAX_RETRIES {
                        let jitter = Duration::from_millis(rand::random::<u64>() % 250);
                        tokio::time::sleep(backoff + jitter).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(PharmascanError::fetch_failure(pmids, last_error))
    }

    /// Fetch one batch of records via efetch and parse the XML payload.
    async fn efetch(&self, pmids: &[String]) -> Result<Vec<PaperRecord>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("rettype", "abstract".to_string()),
            ("retmode", "xml".to_string()),
        ];
        self.etiquette_params(&mut params);

        let response = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PharmascanError::Api {
                code: status.as_u16() as i32,
                message: format!("efetch failed: {}", status),
            });
        }

        let xml = response.text().await?;
        let mut records = parse_pubmed_xml(&xml)?;
        reorder_to_request(&mut records, pmids);
        Ok(records)
    }
}

/// esearch result window: total hit count plus the retrieved PMID slice
struct PmidWindow {
    total: usize,
    pmids: Vec<String>,
}

// === esearch response types ===

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    count: String,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

/// efetch does not guarantee response order; restore the esearch order.
fn reorder_to_request(records: &mut [PaperRecord], requested: &[String]) {
    let position: HashMap<&str, usize> = requested
        .iter()
        .enumerate()
        .map(|(index, pmid)| (pmid.as_str(), index))
        .collect();

    records.sort_by_key(|r| position.get(r.pmid.as_str()).copied().unwrap_or(usize::MAX));
}

/// Parse PubMed efetch XML (`<PubmedArticleSet>`) into records.
///
/// Tolerant by construction: any field may be missing. A record without a
/// PMID is skipped with a warning rather than failing the batch; a payload
/// that yields nothing before the parser chokes is a parse error so the
/// batch can be retried.
fn parse_pubmed_xml(xml: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<PaperRecord> = None;
    let mut author: Option<PaperAuthor> = None;

    let mut fore = String::new();
    let mut last = String::new();
    let mut affiliation = String::new();
    let mut year = String::new();
    let mut month = String::new();
    let mut day = String::new();
    let mut medline_date = String::new();

    let mut in_pmid = false;
    let mut in_title = false;
    let mut in_last_name = false;
    let mut in_fore_name = false;
    let mut in_collective = false;
    let mut in_affiliation = false;
    let mut in_pub_date = false;
    let mut in_year = false;
    let mut in_month = false;
    let mut in_day = false;
    let mut in_medline_date = false;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"PubmedArticle" => current = Some(PaperRecord::default()),
                b"PMID" => in_pmid = true,
                b"ArticleTitle" => in_title = true,
                b"Author" => {
                    author = Some(PaperAuthor::default());
                    fore.clear();
                    last.clear();
                }
                b"LastName" => in_last_name = true,
                b"ForeName" => in_fore_name = true,
                b"CollectiveName" => in_collective = true,
                b"Affiliation" => {
                    in_affiliation = true;
                    affiliation.clear();
                }
                b"PubDate" => {
                    in_pub_date = true;
                    year.clear();
                    month.clear();
                    day.clear();
                    medline_date.clear();
                }
                b"Year" if in_pub_date => in_year = true,
                b"Month" if in_pub_date => in_month = true,
                b"Day" if in_pub_date => in_day = true,
                b"MedlineDate" if in_pub_date => in_medline_date = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if in_pmid {
                    // Only the first PMID belongs to the article itself;
                    // later ones are citation cross-references.
                    if let Some(ref mut record) = current {
                        if record.pmid.is_empty() {
                            record.pmid = text;
                        }
                    }
                } else if in_title {
                    // Titles can carry markup (<i>, <sub>); accumulate fragments
                    if let Some(ref mut record) = current {
                        record.title.push_str(&text);
                    }
                } else if in_last_name {
                    last.push_str(&text);
                } else if in_fore_name {
                    fore.push_str(&text);
                } else if in_collective {
                    if let Some(ref mut a) = author {
                        a.name.push_str(&text);
                    }
                } else if in_affiliation {
                    affiliation.push_str(&text);
                } else if in_year {
                    year = text;
                } else if in_month {
                    month = text;
                } else if in_day {
                    day = text;
                } else if in_medline_date {
                    medline_date = text;
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"PMID" => in_pmid = false,
                b"ArticleTitle" => in_title = false,
                b"LastName" => in_last_name = false,
                b"ForeName" => in_fore_name = false,
                b"CollectiveName" => in_collective = false,
                b"Affiliation" => {
                    in_affiliation = false;
                    if let Some(ref mut a) = author {
                        let text = affiliation.trim().to_string();
                        if !text.is_empty() {
                            a.affiliations.push(text);
                        }
                    }
                }
                b"Author" => {
                    if let Some(mut a) = author.take() {
                        if a.name.is_empty() {
                            a.name = format!("{} {}", fore, last).trim().to_string();
                        }
                        if let Some(ref mut record) = current {
                            record.authors.push(a);
                        }
                    }
                }
                b"Year" => in_year = false,
                b"Month" => in_month = false,
                b"Day" => in_day = false,
                b"MedlineDate" => in_medline_date = false,
                b"PubDate" => {
                    in_pub_date = false;
                    if let Some(ref mut record) = current {
                        record.pub_date = assemble_pub_date(&year, &month, &day, &medline_date);
                    }
                }
                b"PubmedArticle" => {
                    if let Some(record) = current.take() {
                        if record.pmid.is_empty() {
                            warn!(title = %record.title, "Skipping record without PMID");
                        } else {
                            records.push(record);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                if records.is_empty() {
                    return Err(PharmascanError::Parse(format!("malformed efetch XML: {}", e)));
                }
                warn!(error = %e, "XML parse error, keeping records parsed so far");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

/// Join the date parts PubMed provides, tolerating partial dates.
fn assemble_pub_date(year: &str, month: &str, day: &str, medline_date: &str) -> String {
    let parts: Vec<&str> = [year, month, day]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        // Older records carry a free-form MedlineDate instead (e.g. "1998 Dec-1999 Jan")
        medline_date.to_string()
    } else {
        parts.join("-")
    }
}
