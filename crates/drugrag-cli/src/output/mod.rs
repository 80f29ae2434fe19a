//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use anyhow::Result;
use drugrag_core::{Config, FinalAnswer, SnapshotInfo};
use std::path::Path;

/// Format a query result
pub fn format_answer(query: &str, answer: &FinalAnswer, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json::format_answer(query, answer),
        OutputFormat::Cli => Ok(terminal::format_answer(answer)),
    }
}

/// Format snapshot status
pub fn format_status(
    path: &Path,
    info: &SnapshotInfo,
    config: &Config,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => json::format_status(path, info),
        OutputFormat::Cli => Ok(terminal::format_status(path, info, config)),
    }
}
