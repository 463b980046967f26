//! Metric adapter contracts for scanpath evaluation
//!
//! The metric algorithms themselves (ScanMatch, MultiMatch, saliency
//! statistics, caption metrics) live in external libraries. This crate fixes
//! the shape of their inputs and outputs and ships one adapter,
//! [`CommandMetrics`], that bridges to an external scorer process.

pub mod adapters;
pub mod command;
pub mod error;
pub mod scores;

pub use adapters::{
    ensure_keys, CaptionMetric, MetricFamily, SaliencyGroup, SaliencyMetric, ScanpathMetric, ScanpathRequest,
};
pub use command::CommandMetrics;
pub use error::MetricError;
pub use scores::{CaptionScores, SaliencyScores, ScanpathScores};
