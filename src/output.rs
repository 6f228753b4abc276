use std::fs;
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, warn};

use crate::config::Config;
use crate::model::matrix::Matrix;
use crate::protocol::RunError;
use crate::report::{self, RunSummary};

pub const NORMFACTOR_FILENAME: &str = "normfactor.csv";
pub const SUMMARY_FILENAME: &str = "summary.json";
pub const ERROR_FILENAME: &str = "error.log";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("write error: {0}")]
    Write(String),
}

/// Everything a finished run exposes to its sink. The factor fields are only
/// present in upper-quartile mode.
#[derive(Debug)]
pub struct NormalizedResult<'a> {
    pub matrix: &'a Matrix,
    pub sample_names: Option<&'a [String]>,
    pub gene_names: Option<&'a [String]>,
    pub norm_factors: Option<&'a [f64]>,
    pub scaling_factor: Option<f64>,
}

/// Where a participant's results go. `report_failure` is the error channel:
/// a failed run surfaces its cause here and writes no result.
pub trait ResultSink: Send {
    fn write_result(&mut self, result: &NormalizedResult<'_>) -> Result<(), OutputError>;
    fn report_failure(&mut self, error: &RunError);
}

/// Writes the result matrix, the optional per-sample norm factors and a run
/// summary into one site's output directory.
pub struct FileSink {
    out_dir: PathBuf,
    config: Config,
}

impl FileSink {
    pub fn new(out_dir: PathBuf, config: Config) -> Self {
        Self { out_dir, config }
    }

    fn write_matrix(&self, result: &NormalizedResult<'_>) -> Result<(), OutputError> {
        let sep = &self.config.seperator;
        let path = self.out_dir.join(&self.config.output_filename);
        let mut out = fs::File::create(path)?;

        if let Some(samples) = result.sample_names {
            let mut header = String::new();
            if result.gene_names.is_some() {
                header.push_str(sep);
            }
            header.push_str(&samples.join(sep));
            writeln!(out, "{header}")?;
        }
        for i in 0..result.matrix.n_rows() {
            let mut line = String::new();
            if let Some(genes) = result.gene_names {
                line.push_str(&genes[i]);
                line.push_str(sep);
            }
            let row = result.matrix.row(i);
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            line.push_str(&cells.join(sep));
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn write_norm_factors(&self, result: &NormalizedResult<'_>) -> Result<(), OutputError> {
        let Some(factors) = result.norm_factors else {
            return Ok(());
        };
        let sep = &self.config.seperator;
        let path = self.out_dir.join(NORMFACTOR_FILENAME);
        let mut out = fs::File::create(path)?;
        for (j, factor) in factors.iter().enumerate() {
            match result.sample_names {
                Some(samples) => writeln!(out, "{}{sep}{factor}", samples[j])?,
                None => writeln!(out, "{factor}")?,
            }
        }
        Ok(())
    }
}

impl ResultSink for FileSink {
    fn write_result(&mut self, result: &NormalizedResult<'_>) -> Result<(), OutputError> {
        fs::create_dir_all(&self.out_dir)?;
        self.write_matrix(result)?;
        if self.config.normfactors {
            self.write_norm_factors(result)?;
        }
        let summary = RunSummary {
            tool: "fednorm",
            version: env!("CARGO_PKG_VERSION"),
            normalization: self.config.normalization.to_string(),
            n_genes: result.matrix.n_rows(),
            n_samples: result.matrix.n_cols(),
            scaling_factor: result.scaling_factor,
            labeled: result.sample_names.is_some() || result.gene_names.is_some(),
        };
        report::write_summary(&self.out_dir.join(SUMMARY_FILENAME), &summary)
    }

    fn report_failure(&mut self, run_error: &RunError) {
        error!("{run_error}");
        if let Err(io_err) = fs::create_dir_all(&self.out_dir)
            .and_then(|_| fs::write(self.out_dir.join(ERROR_FILENAME), format!("{run_error}\n")))
        {
            warn!("could not record the failure: {io_err}");
        }
    }
}

#[cfg(test)]
#[path = "../tests/src_inline/output.rs"]
mod tests;
