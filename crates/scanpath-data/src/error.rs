//! Error types for ground-truth handling

use crate::dataset::Dataset;
use thiserror::Error;

/// Errors raised while loading, batching or keying evaluation samples
#[derive(Debug, Error)]
pub enum DataError {
    /// Dataset tag outside the five known datasets
    #[error("Unsupported dataset: {0}")]
    UnsupportedDataset(String),
    /// A field required by the dataset's key template is absent
    #[error("{dataset} sample {name} is missing `{field}`")]
    MissingField {
        dataset: Dataset,
        name: String,
        field: &'static str,
    },
    #[error("Unsupported split: {0} (expected `dev` or `test`)")]
    UnsupportedSplit(String),
    #[error("Sample index {index} out of range for a split of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Expected a tensor of shape {expected}, got {actual:?}")]
    ShapeMismatch {
        expected: String,
        actual: Vec<usize>,
    },
    #[error("Invalid sharding: {0}")]
    InvalidSharding(String),
    #[error("ID not found in vocabulary: {0}")]
    IdNotFound(u32),
}
