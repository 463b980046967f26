//! Evaluation configuration
//!
//! Options are loaded from a JSON file; every field has a default so a
//! partial file (or no file at all) is valid. Command-line flags override
//! file values.

use crate::error::EvalError;
use anyhow::{Context, Result};
use scanpath_metrics::CommandMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Evaluation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Stochastic rollouts requested per sample; only the first is scored
    pub eval_repeat_num: usize,
    /// Samples per worker per step
    pub test_batch: usize,
    /// Fixation slots in the padded scanpath tensors
    pub max_fixations: usize,
    /// Number of data-parallel workers
    pub num_workers: usize,
    /// External metric scorer command (`program`, `args...`)
    pub metrics_command: Option<Vec<String>>,
    /// Working directory for the metric scorer
    pub metrics_working_dir: Option<PathBuf>,
    /// Extra environment variables for the metric scorer
    pub metrics_env: BTreeMap<String, String>,
    /// Draw a progress bar over the batches on the coordinator
    pub show_progress: bool,
    /// WordPiece vocabulary used to decode explanations
    pub vocab_path: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            eval_repeat_num: 1,
            test_batch: 32,
            max_fixations: 16,
            num_workers: 1,
            metrics_command: None,
            metrics_working_dir: None,
            metrics_env: BTreeMap::new(),
            show_progress: true,
            vocab_path: None,
        }
    }
}

impl EvalConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON configuration file
    ///
    /// # Returns
    /// Loaded configuration or error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: EvalConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Reject values that would make the run meaningless
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.eval_repeat_num == 0 {
            return Err(EvalError::Config(
                "eval_repeat_num must be at least 1".to_string(),
            ));
        }
        if self.test_batch == 0 {
            return Err(EvalError::Config("test_batch must be at least 1".to_string()));
        }
        if self.max_fixations == 0 {
            return Err(EvalError::Config(
                "max_fixations must be at least 1".to_string(),
            ));
        }
        if self.num_workers == 0 {
            return Err(EvalError::Config("num_workers must be at least 1".to_string()));
        }
        if matches!(&self.metrics_command, Some(argv) if argv.is_empty()) {
            return Err(EvalError::Config("metrics_command is empty".to_string()));
        }
        Ok(())
    }

    /// Build the external metric scorer described by this configuration
    pub fn metric_scorer(&self) -> Result<CommandMetrics, EvalError> {
        let argv = self.metrics_command.clone().ok_or_else(|| {
            EvalError::Config(
                "no metric scorer configured: pass --metrics-command or set metrics_command"
                    .to_string(),
            )
        })?;

        let mut scorer = CommandMetrics::new(argv)?;
        if let Some(dir) = &self.metrics_working_dir {
            scorer = scorer.working_dir(dir);
        }
        for (key, value) in &self.metrics_env {
            scorer = scorer.env(key, value);
        }
        Ok(scorer)
    }
}
