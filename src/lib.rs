//! # pharmascan
//!
//! PubMed search filtered to papers with pharma/biotech-affiliated authors.
//!
//! ## Modules
//!
//! - [`pubmed`] - NCBI E-utilities client (esearch + efetch) and record stream
//! - [`affiliation`] - industry-affiliation heuristic and output-row builder
//! - [`error`] - custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use pharmascan::affiliation::classify;
//! use pharmascan::pubmed::{PubMedClient, SearchOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = PubMedClient::new()?;
//!     let stream = client.search("cancer immunotherapy", &SearchOptions::default());
//!     futures::pin_mut!(stream);
//!     while let Some(record) = stream.try_next().await? {
//!         if let Some(row) = classify(&record) {
//!             println!("{}: {}", row.pmid, row.companies.join("; "));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod affiliation;
pub mod error;
pub mod pubmed;

pub use error::{PharmascanError, Result};
