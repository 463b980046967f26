//! Scanpath model seam
//!
//! The evaluator only needs `forward(batch, repeat_num)`; how scanpaths and
//! explanations are produced is up to the implementation.

use anyhow::{bail, Context, Result};
use ndarray::{Array4, ArrayView3, Axis};
use scanpath_data::{pad_records, Batch, FixationRecord, Split, SENTINEL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Generated explanation token ids, one list per generated segment
pub type TokenSegments = Vec<Vec<u32>>;

/// Output of one forward pass
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Predicted fixations, shape `[batch, repeat_num, max_fixations, 3]`
    pub scanpaths: Array4<f32>,
    /// Generated explanation ids per sample and rollout
    pub generated: Vec<Vec<TokenSegments>>,
}

impl ModelOutput {
    /// First rollout of every sample
    ///
    /// # Errors
    /// Returns a message when the output does not cover `batch_len` samples
    /// with at least one rollout each.
    pub fn first_rollout(
        &self,
        batch_len: usize,
    ) -> Result<(ArrayView3<'_, f32>, Vec<&TokenSegments>), String> {
        let (samples, rollouts, _, width) = self.scanpaths.dim();
        if samples != batch_len || rollouts == 0 || width != 3 {
            return Err(format!(
                "expected scanpaths of shape [{}, >=1, max_fixations, 3], got {:?}",
                batch_len,
                self.scanpaths.shape()
            ));
        }
        if self.generated.len() != batch_len {
            return Err(format!(
                "expected generated ids for {} samples, got {}",
                batch_len,
                self.generated.len()
            ));
        }

        let generated = self
            .generated
            .iter()
            .enumerate()
            .map(|(i, rollouts)| {
                rollouts
                    .first()
                    .ok_or_else(|| format!("no generated rollout for sample {} of the batch", i))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((self.scanpaths.index_axis(Axis(1), 0), generated))
    }
}

/// A model that predicts scanpaths and generates explanations
pub trait ScanpathModel: Sync {
    /// Run inference on one batch
    ///
    /// # Arguments
    /// * `batch` - Collated batch
    /// * `repeat_num` - Number of stochastic rollouts per sample
    fn forward(&self, batch: &Batch, repeat_num: usize) -> Result<ModelOutput>;
}

/// Rollouts exported by the model runtime for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRollouts {
    /// Dataset index of the sample
    pub idx: usize,
    /// Predicted scanpath per rollout, in pixel space
    pub scanpaths: Vec<FixationRecord>,
    /// Generated explanation ids per rollout
    pub generated_ids: Vec<TokenSegments>,
}

/// Replays rollouts exported to `<checkpoint>/rollouts_{split}.json`
#[derive(Debug, Clone)]
pub struct PrecomputedModel {
    rollouts: HashMap<usize, SampleRollouts>,
    max_fixations: usize,
}

impl PrecomputedModel {
    pub fn new(rollouts: Vec<SampleRollouts>, max_fixations: usize) -> Self {
        Self {
            rollouts: rollouts.into_iter().map(|r| (r.idx, r)).collect(),
            max_fixations,
        }
    }

    /// Load exported rollouts for a split from a checkpoint directory
    pub fn load(checkpoint: &Path, split: Split, max_fixations: usize) -> Result<Self> {
        let path = checkpoint.join(format!("rollouts_{}.json", split));
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read rollouts: {:?}", path))?;
        let rollouts: Vec<SampleRollouts> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse rollouts: {:?}", path))?;
        Ok(Self::new(rollouts, max_fixations))
    }

    pub fn len(&self) -> usize {
        self.rollouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rollouts.is_empty()
    }
}

impl ScanpathModel for PrecomputedModel {
    fn forward(&self, batch: &Batch, repeat_num: usize) -> Result<ModelOutput> {
        let mut scanpaths =
            Array4::from_elem((batch.len(), repeat_num, self.max_fixations, 3), SENTINEL);
        let mut generated = Vec::with_capacity(batch.len());

        for (i, idx) in batch.idx.iter().enumerate() {
            let sample = self
                .rollouts
                .get(idx)
                .with_context(|| format!("No rollouts exported for sample {}", idx))?;
            if sample.scanpaths.len() < repeat_num || sample.generated_ids.len() < repeat_num {
                bail!(
                    "Sample {} has {} scanpath and {} explanation rollouts, {} requested",
                    idx,
                    sample.scanpaths.len(),
                    sample.generated_ids.len(),
                    repeat_num
                );
            }

            let padded = pad_records(&sample.scanpaths[..repeat_num], self.max_fixations);
            scanpaths.index_axis_mut(Axis(0), i).assign(&padded);
            generated.push(sample.generated_ids[..repeat_num].to_vec());
        }

        Ok(ModelOutput {
            scanpaths,
            generated,
        })
    }
}
