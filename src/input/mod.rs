pub mod table;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::model::matrix::Matrix;
use table::{open_maybe_gz, parse_matrix, read_label_lines};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// A site's matrix with whatever labels the staging provided.
#[derive(Debug, Clone)]
pub struct MatrixBundle {
    pub matrix: Matrix,
    pub sample_names: Option<Vec<String>>,
    pub gene_names: Option<Vec<String>>,
}

/// Where a participant's matrix comes from. The driver never touches the
/// file system itself.
pub trait MatrixSource: Send {
    fn load(&self) -> Result<MatrixBundle, InputError>;
}

/// Loads the staged CSV/TSV matrix and optional label files from a site
/// directory, honoring the separator and layout declared in the config.
pub struct CsvMatrixSource {
    dir: PathBuf,
    config: Config,
}

impl CsvMatrixSource {
    pub fn new(dir: PathBuf, config: Config) -> Self {
        Self { dir, config }
    }
}

impl MatrixSource for CsvMatrixSource {
    fn load(&self) -> Result<MatrixBundle, InputError> {
        let path = self.dir.join(&self.config.input_filename);
        if !path.exists() {
            return Err(InputError::MissingInput(format!(
                "{} could not be found",
                path.display()
            )));
        }
        let reader = open_maybe_gz(&path)?;
        let (matrix, mut sample_names, mut gene_names) = parse_matrix(
            reader,
            &self.config.seperator,
            self.config.sample_genes_in_input,
        )?;
        info!(
            path = %path.display(),
            n_rows = matrix.n_rows(),
            n_cols = matrix.n_cols(),
            "matrix loaded"
        );

        if let Some(name) = &self.config.sample_names {
            let labels = read_label_lines(&self.dir.join(name))?;
            if labels.len() != matrix.n_cols() {
                return Err(InputError::InvalidInput(format!(
                    "{} sample names for {} columns",
                    labels.len(),
                    matrix.n_cols()
                )));
            }
            sample_names = Some(labels);
        }
        if let Some(name) = &self.config.gene_names {
            let labels = read_label_lines(&self.dir.join(name))?;
            if labels.len() != matrix.n_rows() {
                return Err(InputError::InvalidInput(format!(
                    "{} gene names for {} rows",
                    labels.len(),
                    matrix.n_rows()
                )));
            }
            gene_names = Some(labels);
        }

        Ok(MatrixBundle {
            matrix,
            sample_names,
            gene_names,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
