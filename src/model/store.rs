use thiserror::Error;

use crate::input::MatrixBundle;
use crate::model::matrix::Matrix;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("slot {0} was written twice in one run")]
    AlreadySet(&'static str),
    #[error("slot {0} was read before it was written")]
    Unset(&'static str),
}

/// A named intermediate that may be written at most once per run.
#[derive(Debug)]
pub struct Slot<T> {
    name: &'static str,
    value: Option<T>,
    written: bool,
}

impl<T> Slot<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            value: None,
            written: false,
        }
    }

    pub fn set(&mut self, value: T) -> Result<(), StoreError> {
        if self.written {
            return Err(StoreError::AlreadySet(self.name));
        }
        self.value = Some(value);
        self.written = true;
        Ok(())
    }

    pub fn get(&self) -> Result<&T, StoreError> {
        self.value.as_ref().ok_or(StoreError::Unset(self.name))
    }

    /// Moves the value out for a successor computation; the slot stays
    /// consumed and cannot be written again.
    pub fn take(&mut self) -> Result<T, StoreError> {
        self.value.take().ok_or(StoreError::Unset(self.name))
    }
}

/// Quantile round-1 payload body: the effective column count and the
/// column-wise sums of the sorted (grid-rebased) matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMeans {
    pub m_eff: u64,
    pub sums: Vec<f64>,
}

/// Per-run state of one participant. The engines write the slots; the driver
/// reads them to package payloads and the final result.
#[derive(Debug)]
pub struct ParticipantStore {
    pub matrix: Matrix,
    pub sample_names: Option<Vec<String>>,
    pub gene_names: Option<Vec<String>>,

    pub local_means: Slot<LocalMeans>,
    pub nobs: Slot<Vec<usize>>,
    pub arr: Slot<Matrix>,
    pub global_means: Slot<Vec<f64>>,

    pub local_zeros: Slot<Vec<u64>>,
    pub global_zeros: Slot<Vec<u64>>,
    pub uquartile: Slot<Vec<f64>>,
    pub scaling_factor: Slot<f64>,
    pub normfac: Slot<Vec<f64>>,

    pub result: Slot<Matrix>,
}

impl ParticipantStore {
    pub fn new(bundle: MatrixBundle) -> Self {
        Self {
            matrix: bundle.matrix,
            sample_names: bundle.sample_names,
            gene_names: bundle.gene_names,
            local_means: Slot::new("local_means"),
            nobs: Slot::new("nobs"),
            arr: Slot::new("arr"),
            global_means: Slot::new("global_means"),
            local_zeros: Slot::new("local_zeros"),
            global_zeros: Slot::new("global_zeros"),
            uquartile: Slot::new("uquartile"),
            scaling_factor: Slot::new("scaling_factor"),
            normfac: Slot::new("normfac"),
            result: Slot::new("result"),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/store.rs"]
mod tests;
