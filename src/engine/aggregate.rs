//! Coordinator-only aggregation. Each method is a pure function of the
//! payloads received in one round.

use crate::model::store::LocalMeans;
use crate::numeric::{NumericError, geometric_mean, intersect_sorted};

#[derive(Debug, Default)]
pub struct CoordinatorAggregator;

impl CoordinatorAggregator {
    /// Weighted reduction of the sites' sorted-column sums: component-wise
    /// sum divided by the total effective column count.
    pub fn global_means(&self, payloads: &[LocalMeans]) -> Result<Vec<f64>, NumericError> {
        let Some((first, rest)) = payloads.split_first() else {
            return Err(NumericError::Shape(
                "no local means to aggregate".to_string(),
            ));
        };
        let mut sums = first.sums.clone();
        let mut m_eff = first.m_eff;
        for payload in rest {
            if payload.sums.len() != sums.len() {
                return Err(NumericError::Shape(format!(
                    "the input matrices of all sites must have the same number of rows \
                     ({} vs {})",
                    payload.sums.len(),
                    sums.len()
                )));
            }
            for (acc, v) in sums.iter_mut().zip(&payload.sums) {
                *acc += v;
            }
            m_eff += payload.m_eff;
        }
        if m_eff == 0 {
            return Err(NumericError::Domain(
                "no columns contributed to the reference distribution".to_string(),
            ));
        }
        let denom = m_eff as f64;
        for v in sums.iter_mut() {
            *v /= denom;
        }
        Ok(sums)
    }

    /// Rows that are zero at every site.
    pub fn global_zeros(&self, local_zeros: &[Vec<u64>]) -> Vec<u64> {
        intersect_sorted(local_zeros)
    }

    /// Geometric mean of the concatenated per-sample upper-quartile ratios.
    pub fn global_scaling_factor(&self, concatenated: &[f64]) -> Result<f64, NumericError> {
        geometric_mean(concatenated)
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/engine/aggregate.rs"]
mod tests;
