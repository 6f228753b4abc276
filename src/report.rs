use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::output::OutputError;

/// Small machine-readable record of one site's run, written next to the
/// result matrix.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub tool: &'a str,
    pub version: &'a str,
    pub normalization: String,
    pub n_genes: usize,
    pub n_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaling_factor: Option<f64>,
    pub labeled: bool,
}

pub fn write_summary(path: &Path, summary: &RunSummary<'_>) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| OutputError::Write(e.to_string()))?;
    fs::write(path, json + "\n")?;
    Ok(())
}

#[cfg(test)]
#[path = "../tests/src_inline/report.rs"]
mod tests;
