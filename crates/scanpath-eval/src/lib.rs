//! Distributed evaluation of joint scanpath and explanation models
//!
//! This crate provides:
//! - Evaluation configuration
//! - Collective communication and the metrics gatherer
//! - The model seam and a replay model for exported rollouts
//! - The evaluation orchestrator
//! - Metric aggregation and report persistence

pub mod collective;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod gather;
pub mod model;
pub mod report;

pub use collective::{Collective, LocalCollective, ThreadCollective, ThreadGroup};
pub use config::EvalConfig;
pub use error::EvalError;
pub use evaluator::{
    decode_explanation, evaluate, finalize, run_worker, Accumulator, EvalContext, GatheredSample,
    MetricSuite,
};
pub use gather::Gatherer;
pub use model::{ModelOutput, PrecomputedModel, SampleRollouts, ScanpathModel, TokenSegments};
pub use report::{
    DatasetMetrics, EvaluationOutcome, GeneratedExplanation, MetricsSummary, PredictionEntry,
    SampleScores, ScoredSample, ALL,
};
