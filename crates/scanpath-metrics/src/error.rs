//! Metric adapter errors

use crate::adapters::MetricFamily;
use thiserror::Error;

/// Errors raised by metric adapters
///
/// Every variant is fatal for an evaluation run: a single failing sample
/// aborts the whole pass.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("Metric command is empty")]
    EmptyCommand,
    #[error("Failed to run {family} scorer `{command}`: {source}")]
    Spawn {
        family: MetricFamily,
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{family} scorer `{command}` exited with {status}: {stderr}")]
    Failed {
        family: MetricFamily,
        command: String,
        status: String,
        stderr: String,
    },
    #[error("Malformed {family} scorer exchange: {source}")]
    Protocol {
        family: MetricFamily,
        #[source]
        source: serde_json::Error,
    },
    #[error("{family} scorer returned {actual} results for {expected} inputs")]
    LengthMismatch {
        family: MetricFamily,
        expected: usize,
        actual: usize,
    },
    #[error("{family} scorer returned no result for key {key}")]
    MissingKey { family: MetricFamily, key: String },
    #[error("{family} scorer failed: {message}")]
    Scorer {
        family: MetricFamily,
        message: String,
    },
}
