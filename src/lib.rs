mod bytes;
pub mod card;
pub mod certs;
pub mod dt;
pub mod error;
pub mod header;
mod heuristics;
pub mod summary;
pub mod vu;

use anyhow::{Context, Result};

pub use header::{FileType, Generation, Header};
pub use summary::{Part, PartStatus, Summary};

/// Parse a whole download file (VU or driver card) into its summary tree.
pub fn parse_summary(bytes: &[u8]) -> Summary {
    summary::parse_summary(bytes)
}

pub fn parse_summary_from_file(file_path: &str) -> Result<Summary> {
    let bytes = std::fs::read(file_path).context("Failed to read file")?;
    Ok(summary::parse_summary(&bytes))
}

pub fn parse_summary_to_json(bytes: &[u8]) -> Result<String> {
    serde_json::to_string(&summary::parse_summary(bytes))
        .context("Failed to serialize summary to JSON")
}

pub fn parse_summary_to_json_pretty(bytes: &[u8]) -> Result<String> {
    serde_json::to_string_pretty(&summary::parse_summary(bytes))
        .context("Failed to serialize summary to JSON")
}

/// Classify a file from its first bytes only (at most 32 are examined).
pub fn parse_header(bytes: &[u8]) -> Header {
    header::parse_header(bytes, bytes.len())
}

pub fn parse_header_from_file(file_path: &str) -> Result<Header> {
    let bytes = std::fs::read(file_path).context("Failed to read file")?;
    Ok(header::parse_header(&bytes, bytes.len()))
}
