use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::input::InputError;
use crate::model::matrix::Matrix;

pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>, InputError> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parses a separated-value matrix. With `labeled`, the first row holds the
/// sample names (after a corner cell) and the first column the gene names;
/// otherwise every field is a value. Empty, `NA` and `NaN` fields parse to
/// NaN.
pub fn parse_matrix(
    reader: Box<dyn BufRead>,
    separator: &str,
    labeled: bool,
) -> Result<(Matrix, Option<Vec<String>>, Option<Vec<String>>), InputError> {
    if separator.is_empty() {
        return Err(InputError::InvalidInput(
            "the field separator is empty".to_string(),
        ));
    }

    let mut sample_names: Option<Vec<String>> = None;
    let mut gene_names: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        let mut fields: Vec<&str> = line.split(separator).collect();

        if labeled && sample_names.is_none() {
            // Header row: a corner cell, then one name per sample.
            fields.remove(0);
            sample_names = Some(fields.iter().map(|s| s.trim().to_string()).collect());
            gene_names = Some(Vec::new());
            continue;
        }
        if labeled {
            let name = fields.remove(0).trim().to_string();
            if let Some(genes) = gene_names.as_mut() {
                genes.push(name);
            }
        }

        let mut row = Vec::with_capacity(fields.len());
        for (col_no, field) in fields.iter().enumerate() {
            row.push(parse_value(field).ok_or_else(|| {
                InputError::Parse(format!(
                    "could not parse value '{}' (line {}, field {})",
                    field.trim(),
                    line_no + 1,
                    col_no + 1
                ))
            })?);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(InputError::InvalidInput("the matrix is empty".to_string()));
    }
    let matrix = Matrix::from_rows(&rows).ok_or_else(|| {
        InputError::Parse("matrix rows differ in their number of fields".to_string())
    })?;
    if matrix.n_cols() == 0 {
        return Err(InputError::InvalidInput("the matrix is empty".to_string()));
    }
    Ok((matrix, sample_names, gene_names))
}

fn parse_value(field: &str) -> Option<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan")
    {
        return Some(f64::NAN);
    }
    trimmed.parse::<f64>().ok()
}

/// One label per line, as used by the optional sample/gene name files.
pub fn read_label_lines(path: &Path) -> Result<Vec<String>, InputError> {
    let reader = open_maybe_gz(path)?;
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        out.push(line.trim_end_matches('\r').to_string());
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/table.rs"]
mod tests;
