//! The closed set of evaluation datasets

use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dataset a sample originates from
///
/// Variants are ordered as the datasets appear in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dataset {
    #[serde(rename = "AiR-D")]
    AirD,
    #[serde(rename = "OSIE")]
    Osie,
    #[serde(rename = "COCO-TP")]
    CocoTp,
    #[serde(rename = "COCO-TA")]
    CocoTa,
    #[serde(rename = "COCO-FV")]
    CocoFv,
}

impl Dataset {
    /// All datasets in summary order
    pub const ALL: [Dataset; 5] = [
        Dataset::AirD,
        Dataset::Osie,
        Dataset::CocoTp,
        Dataset::CocoTa,
        Dataset::CocoFv,
    ];

    /// Canonical tag, as written in ground-truth files and reports
    pub fn name(self) -> &'static str {
        match self {
            Dataset::AirD => "AiR-D",
            Dataset::Osie => "OSIE",
            Dataset::CocoTp => "COCO-TP",
            Dataset::CocoTa => "COCO-TA",
            Dataset::CocoFv => "COCO-FV",
        }
    }

    /// Whether samples of this dataset carry per-subject explanations
    ///
    /// Free-viewing samples have no task and no explanation annotations.
    pub fn has_explanations(self) -> bool {
        !matches!(self, Dataset::CocoFv)
    }
}

impl FromStr for Dataset {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|dataset| dataset.name() == s)
            .ok_or_else(|| DataError::UnsupportedDataset(s.to_string()))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
