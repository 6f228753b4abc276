//! Quantile normalization, after the `normalizeBetweenArrays` method of
//! bioconductor limma (Bolstad; Gordon and Smyth, 2005), split into the
//! local / global steps of the federated protocol.

use tracing::debug;

use crate::engine::EngineError;
use crate::model::store::{LocalMeans, ParticipantStore};
use crate::numeric::{Interp1d, rank_average, sort_column, unit_grid};

/// Local preparation: sorts every column onto the shared index grid and emits
/// the column-wise sums together with the effective column count, so the
/// coordinator can weight sites by how many samples they contribute.
pub fn compute_local_means(store: &mut ParticipantStore) -> Result<(), EngineError> {
    let x = &store.matrix;
    let n = x.n_rows();
    let m = x.n_cols();
    if x.is_empty() {
        return Err(EngineError::Input(
            "the input matrix has too few rows or columns".to_string(),
        ));
    }

    let arr = x.clone();

    if n == 1 {
        // Degenerate single-feature case: the payload collapses to the count
        // and sum of the finite entries; no sorting or grid rebase.
        let row = x.row(0);
        let finite: Vec<f64> = row.iter().copied().filter(|v| !v.is_nan()).collect();
        let nan_count = m - finite.len();
        let nobs = row.iter().map(|v| usize::from(!v.is_nan())).collect();
        store.local_means.set(LocalMeans {
            m_eff: (m - nan_count) as u64,
            sums: vec![finite.iter().sum()],
        })?;
        store.nobs.set(nobs)?;
        store.arr.set(arr)?;
        return Ok(());
    }

    let mut sums = vec![0f64; n];
    let mut nobs = vec![0usize; m];
    for j in 0..m {
        let sorted = sort_column(x.column(j))?;
        let n_j = sorted.len();
        nobs[j] = n_j;
        if n_j == n {
            for i in 0..n {
                sums[i] += sorted[i];
            }
        } else if n_j == 1 {
            // One finite value: the rebased column is constant.
            for item in sums.iter_mut() {
                *item += sorted[0];
            }
        } else {
            // Ragged column: rebase the sorted values onto the shared grid.
            let f = Interp1d::new(unit_grid(n_j), sorted)?;
            for (k, item) in sums.iter_mut().enumerate() {
                *item += f.eval(k as f64 / (n - 1) as f64);
            }
        }
    }
    debug!(n, m, "local means prepared");

    store.local_means.set(LocalMeans {
        m_eff: m as u64,
        sums,
    })?;
    store.nobs.set(nobs)?;
    store.arr.set(arr)?;
    Ok(())
}

/// Maps every sample onto the reference distribution: each finite entry is
/// replaced by the reference value at its (average-tie) rank position. NaN
/// entries stay NaN; labels are untouched.
pub fn compute_local_result(store: &mut ParticipantStore) -> Result<(), EngineError> {
    let mut arr = store.arr.take()?;
    let n = arr.n_rows();
    let m = arr.n_cols();
    let global_means = store.global_means.get()?;
    if global_means.len() != n {
        return Err(EngineError::Numeric(crate::numeric::NumericError::Shape(
            format!(
                "reference distribution has length {}, expected {}",
                global_means.len(),
                n
            ),
        )));
    }

    if n == 1 {
        let g = global_means[0];
        for j in 0..m {
            let col = arr.column_mut(j);
            if !col[0].is_nan() {
                col[0] = g;
            }
        }
        store.result.set(arr)?;
        return Ok(());
    }

    let nobs = store.nobs.get()?.clone();
    let f = Interp1d::new(unit_grid(n), global_means.clone())?;
    for j in 0..m {
        let ranks = rank_average(arr.column(j))?;
        let n_j = nobs[j];
        let col = arr.column_mut(j);
        for i in 0..n {
            if col[i].is_nan() {
                continue;
            }
            let t = if n_j < 2 {
                // A single observed value carries no rank information; map it
                // to the middle of the reference.
                0.5
            } else {
                (ranks[i] - 1.0) / (n_j - 1) as f64
            };
            col[i] = f.eval(t);
        }
    }
    store.result.set(arr)?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/engine/quantile.rs"]
mod tests;
