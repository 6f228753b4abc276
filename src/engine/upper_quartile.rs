//! Upper-quartile normalization, after the `calcNormFactors` method of
//! bioconductor edgeR (Robinson and Smyth), split into the local / global
//! steps of the federated protocol.

use tracing::{debug, warn};

use crate::engine::EngineError;
use crate::model::matrix::Matrix;
use crate::model::store::ParticipantStore;
use crate::numeric::{column_sums, quantile_075, sort_column};

/// Records the rows that are exactly zero in every sample at this site.
/// Upper-quartile mode has no NaN story, so any NaN aborts here.
pub fn compute_local_zeros(store: &mut ParticipantStore) -> Result<(), EngineError> {
    let x = &store.matrix;
    if x.is_empty() {
        return Err(EngineError::Input(
            "the input matrix has too few rows or columns".to_string(),
        ));
    }
    if x.has_nan() {
        return Err(EngineError::Input("NaN not supported".to_string()));
    }

    let mut zeros = Vec::new();
    for i in 0..x.n_rows() {
        if (0..x.n_cols()).all(|j| x.get(i, j) == 0.0) {
            zeros.push(i as u64);
        }
    }
    debug!(count = zeros.len(), "local all-zero rows");
    store.local_zeros.set(zeros)?;
    Ok(())
}

/// Per-sample `q75 / library size` on the matrix with the globally agreed
/// zero rows removed.
pub fn compute_uquartile(store: &mut ParticipantStore) -> Result<(), EngineError> {
    let global_zeros = store.global_zeros.get()?;
    let x = &store.matrix;
    let n = x.n_rows();
    let m = x.n_cols();

    let mut keep = vec![true; n];
    for &i in global_zeros {
        if (i as usize) < n {
            keep[i as usize] = false;
        }
    }
    let kept = keep.iter().filter(|&&k| k).count();

    if kept == 0 {
        return Err(EngineError::Input(
            "no rows left after removing the all-zero rows".to_string(),
        ));
    }
    if kept == 1 {
        warn!("only one row left after removing the all-zero rows; using factors of 1");
        store.uquartile.set(vec![1.0; m])?;
        return Ok(());
    }

    let columns: Vec<Vec<f64>> = (0..m)
        .map(|j| {
            x.column(j)
                .iter()
                .zip(&keep)
                .filter(|&(_, &k)| k)
                .map(|(&v, _)| v)
                .collect()
        })
        .collect();
    let reduced = Matrix::from_columns(&columns).ok_or_else(|| {
        EngineError::Input("columns differ in length after zero-row removal".to_string())
    })?;
    let lib_sizes = column_sums(&reduced);

    let mut factors = Vec::with_capacity(m);
    for j in 0..m {
        let sorted = sort_column(reduced.column(j))?;
        let uq = quantile_075(&sorted)?;
        factors.push(uq / lib_sizes[j]);
    }
    debug!(m, kept, "upper quartile factors computed");
    store.uquartile.set(factors)?;
    Ok(())
}

/// Applies the globally centered factors: every column is divided by its norm
/// factor. Global-zero rows are retained and stay zero.
pub fn compute_local_result(store: &mut ParticipantStore) -> Result<(), EngineError> {
    let uquartile = store.uquartile.get()?;
    let scaling_factor = *store.scaling_factor.get()?;
    let normfac: Vec<f64> = uquartile.iter().map(|u| u / scaling_factor).collect();

    let mut result = store.matrix.clone();
    for (j, &factor) in normfac.iter().enumerate() {
        for v in result.column_mut(j) {
            *v /= factor;
        }
    }
    store.normfac.set(normfac)?;
    store.result.set(result)?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/engine/upper_quartile.rs"]
mod tests;
