use thiserror::Error;

use crate::model::matrix::Matrix;

#[derive(Debug, Error)]
pub enum NumericError {
    #[error("shape error: {0}")]
    Shape(String),
    #[error("domain error: {0}")]
    Domain(String),
}

/// Ascending sort with NaN entries stripped before sorting.
pub fn sort_column(col: &[f64]) -> Result<Vec<f64>, NumericError> {
    let mut out: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
    if out.is_empty() {
        return Err(NumericError::Shape(
            "column has no finite values".to_string(),
        ));
    }
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(out)
}

/// 1-based ranks with ties resolved to the arithmetic mean of the ranks they
/// span. NaN entries receive NaN ranks and do not consume a rank.
pub fn rank_average(col: &[f64]) -> Result<Vec<f64>, NumericError> {
    let mut order: Vec<usize> = (0..col.len()).filter(|&i| !col[i].is_nan()).collect();
    if order.is_empty() {
        return Err(NumericError::Shape(
            "cannot rank a column with no finite values".to_string(),
        ));
    }
    order.sort_by(|&a, &b| col[a].partial_cmp(&col[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![f64::NAN; col.len()];
    let k = order.len();
    let mut i = 0usize;
    while i < k {
        let mut j = i + 1;
        while j < k && col[order[j]] == col[order[i]] {
            j += 1;
        }
        // mean of the 1-based ranks i+1..=j
        let avg = (i + 1 + j) as f64 / 2.0;
        for &pos in &order[i..j] {
            ranks[pos] = avg;
        }
        i = j;
    }
    Ok(ranks)
}

/// Monotone piecewise-linear interpolator. Evaluation clamps to the endpoint
/// values outside the grid.
#[derive(Debug, Clone)]
pub struct Interp1d {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Interp1d {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, NumericError> {
        if x.len() != y.len() {
            return Err(NumericError::Shape(format!(
                "interpolation grids differ in length ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(NumericError::Shape(
                "interpolation needs at least two grid points".to_string(),
            ));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(NumericError::Shape(
                "interpolation grid is not strictly increasing".to_string(),
            ));
        }
        Ok(Self { x, y })
    }

    pub fn eval(&self, t: f64) -> f64 {
        let last = self.x.len() - 1;
        if t <= self.x[0] {
            return self.y[0];
        }
        if t >= self.x[last] {
            return self.y[last];
        }
        let hi = self.x.partition_point(|&x| x <= t);
        let lo = hi - 1;
        let span = self.x[hi] - self.x[lo];
        let w = (t - self.x[lo]) / span;
        self.y[lo] + w * (self.y[hi] - self.y[lo])
    }
}

/// The shared index grid `k/(n-1)` for `k = 0..n`. Callers guarantee `n >= 2`.
pub fn unit_grid(n: usize) -> Vec<f64> {
    (0..n).map(|k| k as f64 / (n - 1) as f64).collect()
}

/// 75th percentile with linear interpolation between order statistics
/// (type 7). Input must already be sorted ascending and NaN-free.
pub fn quantile_075(sorted: &[f64]) -> Result<f64, NumericError> {
    if sorted.is_empty() {
        return Err(NumericError::Shape(
            "cannot take a quantile of an empty column".to_string(),
        ));
    }
    let h = (sorted.len() - 1) as f64 * 0.75;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Ok(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

pub fn column_sums(matrix: &Matrix) -> Vec<f64> {
    let mut out = Vec::with_capacity(matrix.n_cols());
    for j in 0..matrix.n_cols() {
        out.push(matrix.column(j).iter().sum());
    }
    out
}

/// `exp(mean(ln v))`; every input must be strictly positive.
pub fn geometric_mean(values: &[f64]) -> Result<f64, NumericError> {
    if values.is_empty() {
        return Err(NumericError::Domain(
            "geometric mean of an empty vector".to_string(),
        ));
    }
    let mut acc = 0f64;
    for &v in values {
        if !(v > 0.0) {
            return Err(NumericError::Domain(format!(
                "geometric mean requires strictly positive inputs, got {v}"
            )));
        }
        acc += v.ln();
    }
    Ok((acc / values.len() as f64).exp())
}

/// Intersection of ascending integer lists; output ascending, deduplicated.
pub fn intersect_sorted(lists: &[Vec<u64>]) -> Vec<u64> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let mut acc = first.clone();
    acc.dedup();
    for list in rest {
        if acc.is_empty() {
            break;
        }
        let mut next = Vec::with_capacity(acc.len().min(list.len()));
        let mut a = 0usize;
        let mut b = 0usize;
        while a < acc.len() && b < list.len() {
            match acc[a].cmp(&list[b]) {
                std::cmp::Ordering::Less => a += 1,
                std::cmp::Ordering::Greater => b += 1,
                std::cmp::Ordering::Equal => {
                    if next.last() != Some(&acc[a]) {
                        next.push(acc[a]);
                    }
                    a += 1;
                    b += 1;
                }
            }
        }
        acc = next;
    }
    acc
}

#[cfg(test)]
#[path = "../tests/src_inline/numeric.rs"]
mod tests;
