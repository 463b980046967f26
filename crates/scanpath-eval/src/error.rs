//! Evaluation errors, labelled by the stage that failed

use scanpath_data::DataError;
use scanpath_metrics::MetricError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal evaluation errors
///
/// Every variant aborts the run. The message names the failing stage so
/// the binary's exit message points at inference, gather, metric
/// computation or serialization.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Data stage failed: {0}")]
    Data(#[from] DataError),
    #[error("Inference stage failed on batch {batch}: {message}")]
    Inference { batch: usize, message: String },
    #[error("Gather stage failed on batch {batch}: {message}")]
    Gather { batch: usize, message: String },
    #[error("Gather stage failed: rank {rank} ran {actual} batches, expected {expected}")]
    Desynchronized {
        rank: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Metric computation stage failed: {0}")]
    Metric(#[from] MetricError),
    #[error("Metric computation stage failed: no reference explanations for key {key:?}")]
    MissingReferences { key: String },
    #[error(
        "Metric computation stage failed: explanation key {key:?} is shared by samples {first} and {second}"
    )]
    DuplicateExplanationKey {
        key: String,
        first: usize,
        second: usize,
    },
    #[error("Serialization stage failed for {what}: {source}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Serialization stage failed writing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
