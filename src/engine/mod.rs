pub mod aggregate;
pub mod quantile;
pub mod upper_quartile;

use thiserror::Error;

use crate::model::store::StoreError;
use crate::numeric::NumericError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Numeric(#[from] NumericError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("input error: {0}")]
    Input(String),
}
