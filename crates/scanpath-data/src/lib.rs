//! Ground-truth data handling for scanpath evaluation
//!
//! This crate provides:
//! - The closed set of evaluation datasets
//! - Ground-truth fixation records and split loading
//! - Batch collation and sharded sampling across workers
//! - Tensor to fixation record transformation
//! - Composite key resolution for the three metric families
//! - Vocabulary-based decoding of generated explanations
//!
//! # Example
//!
//! ```no_run
//! use scanpath_data::{resolve_scanpath_key, EvalSplit, Split};
//! use std::path::Path;
//!
//! let split = EvalSplit::load(Path::new("./data"), Split::Test)?;
//! let info = split.get(0)?;
//! let key = resolve_scanpath_key(info)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod dataset;
pub mod error;
pub mod fixation;
pub mod keys;
pub mod loader;
pub mod sampler;
pub mod vocab;

pub use dataset::Dataset;
pub use error::DataError;
pub use fixation::{pad_records, transform, FixationRecord, ImageSize, SENTINEL};
pub use keys::{
    resolve, resolve_explanation_key, resolve_saliency_key, resolve_scanpath_key, SampleKeys,
};
pub use loader::{Batch, EvalSplit, FixationInfo, Label, Split};
pub use sampler::ShardedSampler;
pub use vocab::Vocabulary;
