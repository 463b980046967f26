//! Ground-truth split loading and batch collation

use crate::dataset::Dataset;
use crate::error::DataError;
use crate::fixation::{pad_records, FixationRecord, ImageSize};
use anyhow::{Context, Result};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Held-out split to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Dev,
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Dev => "dev",
            Split::Test => "test",
        }
    }
}

impl FromStr for Split {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Split::Dev),
            "test" => Ok(Split::Test),
            other => Err(DataError::UnsupportedSplit(other.to_string())),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier that annotation files store either as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Id(i64),
    Name(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Id(id) => write!(f, "{}", id),
            Label::Name(name) => f.write_str(name),
        }
    }
}

/// Ground-truth record for one (image, task, subject) sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixationInfo {
    /// Dataset tag as written in the annotation file
    pub dataset: String,
    /// Image file name, including extension
    pub name: String,
    /// Question identifier (AiR-D only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<Label>,
    /// Viewing task (COCO-TP / COCO-TA only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Subject who produced this scanpath
    pub subject: Label,
    /// Recorded fixations in pixel space
    #[serde(flatten)]
    pub fixations: FixationRecord,
    pub image_size: ImageSize,
}

impl FixationInfo {
    /// Parse the dataset tag into the closed dataset set
    pub fn dataset(&self) -> Result<Dataset, DataError> {
        self.dataset.parse()
    }
}

/// A collated batch of samples for one worker
#[derive(Debug, Clone)]
pub struct Batch {
    /// Dataset indices of the samples, in batch order
    pub idx: Vec<usize>,
    /// Ground-truth fixations, shape `[batch, max_fixations, 3]`
    pub gt_fixation: Array3<f32>,
    /// Image size per sample
    pub image_size: Vec<ImageSize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }
}

/// Ground truth for one split: fixation records plus explanation references
///
/// Read-only once loaded; safe to share between workers.
#[derive(Debug, Clone)]
pub struct EvalSplit {
    split: Split,
    fixations: Vec<FixationInfo>,
    explanation_gts: BTreeMap<String, Vec<String>>,
}

impl EvalSplit {
    /// Build a split from in-memory records
    ///
    /// Every record's dataset tag is validated up front so an unsupported
    /// dataset aborts before any inference runs.
    pub fn new(
        split: Split,
        fixations: Vec<FixationInfo>,
        explanation_gts: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, DataError> {
        for info in &fixations {
            info.dataset()?;
        }
        Ok(Self {
            split,
            fixations,
            explanation_gts,
        })
    }

    /// Load a split from a data directory
    ///
    /// Expects `fixations_{split}.json` (list of ground-truth records) and
    /// `explanations_{split}.json` (explanation key -> reference captions).
    ///
    /// # Errors
    /// Returns an error if either file cannot be read or parsed, or if a
    /// record names an unsupported dataset.
    pub fn load(data_dir: &Path, split: Split) -> Result<Self> {
        let fixations_path = data_dir.join(format!("fixations_{}.json", split));
        let content = fs::read_to_string(&fixations_path)
            .with_context(|| format!("Failed to read fixation file: {:?}", fixations_path))?;
        let fixations: Vec<FixationInfo> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixation file: {:?}", fixations_path))?;

        let explanations_path = data_dir.join(format!("explanations_{}.json", split));
        let content = fs::read_to_string(&explanations_path).with_context(|| {
            format!("Failed to read explanation file: {:?}", explanations_path)
        })?;
        let explanation_gts: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
            .with_context(|| {
                format!("Failed to parse explanation file: {:?}", explanations_path)
            })?;

        Self::new(split, fixations, explanation_gts)
            .with_context(|| format!("Invalid ground truth in {:?}", fixations_path))
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn len(&self) -> usize {
        self.fixations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixations.is_empty()
    }

    /// Ground-truth record at a dataset index
    pub fn get(&self, index: usize) -> Result<&FixationInfo, DataError> {
        self.fixations.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.fixations.len(),
        })
    }

    pub fn fixations(&self) -> &[FixationInfo] {
        &self.fixations
    }

    /// Reference explanations keyed by explanation key
    pub fn explanation_gts(&self) -> &BTreeMap<String, Vec<String>> {
        &self.explanation_gts
    }

    /// Collate the given dataset indices into a batch
    ///
    /// # Arguments
    /// * `indices` - Dataset indices, in batch order
    /// * `max_fixations` - Fixation slots per sample in the padded tensor
    pub fn collate(&self, indices: &[usize], max_fixations: usize) -> Result<Batch, DataError> {
        let infos = indices
            .iter()
            .map(|&index| self.get(index))
            .collect::<Result<Vec<_>, _>>()?;

        let records: Vec<FixationRecord> = infos.iter().map(|info| info.fixations.clone()).collect();

        Ok(Batch {
            idx: indices.to_vec(),
            gt_fixation: pad_records(&records, max_fixations),
            image_size: infos.iter().map(|info| info.image_size).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(dataset: &str, name: &str) -> FixationInfo {
        FixationInfo {
            dataset: dataset.to_string(),
            name: name.to_string(),
            question_id: None,
            task: None,
            subject: Label::Id(1),
            fixations: FixationRecord {
                x: vec![1.0, 2.0],
                y: vec![3.0, 4.0],
                t: vec![0.1, 0.2],
            },
            image_size: ImageSize {
                width: 320,
                height: 240,
            },
        }
    }

    #[test]
    fn test_split_parse() {
        assert_eq!("dev".parse::<Split>().unwrap(), Split::Dev);
        assert_eq!("test".parse::<Split>().unwrap(), Split::Test);
        assert!("train".parse::<Split>().is_err());
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Id(7).to_string(), "7");
        assert_eq!(Label::Name("s07".to_string()).to_string(), "s07");
    }

    #[test]
    fn test_new_rejects_unknown_dataset() {
        let err = EvalSplit::new(Split::Test, vec![info("UNKNOWN", "a.jpg")], BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, DataError::UnsupportedDataset(_)));
    }

    #[test]
    fn test_collate_pads_with_sentinel() {
        let split = EvalSplit::new(
            Split::Test,
            vec![info("OSIE", "a.jpg"), info("OSIE", "b.jpg")],
            BTreeMap::new(),
        )
        .unwrap();

        let batch = split.collate(&[1, 0], 4).unwrap();

        assert_eq!(batch.idx, vec![1, 0]);
        assert_eq!(batch.gt_fixation.dim(), (2, 4, 3));
        assert_eq!(batch.gt_fixation[[0, 2, 0]], crate::SENTINEL);
        assert_eq!(batch.image_size.len(), 2);
    }

    #[test]
    fn test_collate_out_of_range() {
        let split = EvalSplit::new(Split::Dev, vec![info("OSIE", "a.jpg")], BTreeMap::new())
            .unwrap();
        let err = split.collate(&[3], 4).unwrap_err();
        assert!(matches!(err, DataError::IndexOutOfRange { index: 3, len: 1 }));
    }
}
