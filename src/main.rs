//! pharmascan - PubMed papers with pharma/biotech-affiliated authors
//!
//! Searches PubMed for a free-text query, classifies author affiliations
//! with a keyword heuristic, and writes the qualifying papers as CSV.
//!
//! ## Usage
//!
//! ```bash
//! pharmascan "cancer immunotherapy" -f results.csv
//! pharmascan "crispr delivery" --max-results 200 -d
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use futures::TryStreamExt;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use pharmascan::affiliation::{classify, PaperRow};
use pharmascan::pubmed::{PubMedClient, SearchOptions};

/// CSV column order
const CSV_HEADERS: &[&str] = &[
    "PubmedID",
    "Title",
    "Publication Date",
    "Non-academic Author(s)",
    "Company Affiliation(s)",
    "Corresponding Author Email",
];

/// Delimiter for multi-valued fields inside one CSV cell
const FIELD_JOIN: &str = "; ";

/// Fetch research papers from PubMed and keep those with at least one
/// pharma/biotech-affiliated author.
#[derive(Parser)]
#[command(name = "pharmascan")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Search query (supports PubMed's full query syntax)
    query: String,

    /// Write results to this CSV file instead of stdout
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Maximum number of papers to resolve
    #[arg(long, default_value_t = 1000)]
    max_results: usize,

    /// PMIDs per metadata request (clamped to the API ceiling)
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// NCBI API key (raises the request-rate allowance)
    #[arg(long)]
    api_key: Option<String>,

    /// Contact email forwarded to NCBI per E-utilities etiquette
    #[arg(long)]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr: stdout is reserved for CSV output
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    let client = PubMedClient::new()?
        .with_api_key(cli.api_key)
        .with_email(cli.email);

    let options = SearchOptions {
        max_results: cli.max_results,
        batch_size: cli.batch_size,
    };

    info!(query = %cli.query, max_results = options.max_results, "Searching PubMed");

    let rows = run_pipeline(&client, &cli.query, &options).await?;

    if rows.is_empty() {
        info!("No papers with industry-affiliated authors found");
    }

    // Written only after the whole fetch succeeded, so a fatal error never
    // leaves a truncated file behind.
    match &cli.file {
        Some(path) => {
            save_csv(path, &rows)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), rows = rows.len(), "Results saved");
        }
        None => {
            write_csv(std::io::stdout().lock(), &rows).context("Failed to write CSV to stdout")?;
        }
    }

    Ok(())
}

/// Drain the record stream, classifying each record as it arrives.
async fn run_pipeline(
    client: &PubMedClient,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<PaperRow>> {
    let mut rows = Vec::new();
    let mut scanned = 0usize;

    let stream = client.search(query, options);
    futures::pin_mut!(stream);

    while let Some(record) = stream.try_next().await? {
        scanned += 1;
        if let Some(row) = classify(&record) {
            rows.push(row);
        }
    }

    info!(scanned, matched = rows.len(), "Classification complete");
    Ok(rows)
}

/// CSV row shape; multi-valued fields are joined into one quoted cell
#[derive(Serialize)]
struct CsvRow<'a> {
    pubmed_id: &'a str,
    title: &'a str,
    publication_date: &'a str,
    authors: String,
    companies: String,
    email: &'a str,
}

impl<'a> From<&'a PaperRow> for CsvRow<'a> {
    fn from(row: &'a PaperRow) -> Self {
        Self {
            pubmed_id: &row.pmid,
            title: &row.title,
            publication_date: &row.pub_date,
            authors: row.authors.join(FIELD_JOIN),
            companies: row.companies.join(FIELD_JOIN),
            // Absent email renders as an empty field, never a placeholder
            email: row.email.as_deref().unwrap_or(""),
        }
    }
}

/// Save rows to a CSV file
fn save_csv(path: &Path, rows: &[PaperRow]) -> Result<()> {
    let file = std::fs::File::create(path).context("Failed to create CSV file")?;
    write_csv(file, rows)
}

/// Write the header row plus one line per qualifying paper
fn write_csv<W: Write>(writer: W, rows: &[PaperRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(CSV_HEADERS)
        .context("Failed to write CSV header")?;

    for row in rows {
        wtr.serialize(CsvRow::from(row))
            .context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> PaperRow {
        PaperRow {
            pmid: "31452104".to_string(),
            title: "Checkpoint inhibition, revisited".to_string(),
            pub_date: "2023-Jun-15".to_string(),
            authors: vec!["Barbara Smith".to_string(), "Carol White".to_string()],
            companies: vec!["BigPharma Inc".to_string()],
            email: Some("bsmith@bigpharma.com".to_string()),
        }
    }

    #[test]
    fn test_csv_header_and_joined_fields() {
        let mut out = Vec::new();
        write_csv(&mut out, &[sample_row()]).expect("write failed");

        let text = String::from_utf8(out).expect("utf8");
        let mut lines = text.lines();

        assert_eq!(
            lines.next(),
            Some(
                "PubmedID,Title,Publication Date,Non-academic Author(s),\
                 Company Affiliation(s),Corresponding Author Email"
            )
        );
        // Title contains a comma, so it must be quoted; author list is one cell
        let data = lines.next().expect("data row");
        assert!(data.contains("\"Checkpoint inhibition, revisited\""));
        assert!(data.contains("Barbara Smith; Carol White"));
        assert!(data.contains("bsmith@bigpharma.com"));
    }

    #[test]
    fn test_csv_absent_email_is_empty_field() {
        let mut row = sample_row();
        row.email = None;

        let mut out = Vec::new();
        write_csv(&mut out, &[row]).expect("write failed");

        let text = String::from_utf8(out).expect("utf8");
        let data = text.lines().nth(1).expect("data row");
        assert!(data.ends_with(','));
        assert!(!data.contains("None"));
    }

    #[test]
    fn test_csv_header_written_for_empty_result() {
        let mut out = Vec::new();
        write_csv(&mut out, &[]).expect("write failed");

        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("PubmedID,"));
    }

    #[test]
    fn test_save_csv_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.csv");

        save_csv(&path, &[sample_row()]).expect("save failed");

        let text = std::fs::read_to_string(&path).expect("read back");
        assert!(text.starts_with("PubmedID,"));
        assert_eq!(text.lines().count(), 2);
    }
}
