//! Adapter traits for the three metric families
//!
//! Each trait is a pure-function contract: the same inputs must always
//! produce the same scores, and any failure is returned as a
//! [`MetricError`] rather than a partial result.

use crate::error::MetricError;
use crate::scores::{CaptionScores, SaliencyScores, ScanpathScores};
use scanpath_data::{Dataset, FixationRecord, ImageSize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric family, used to label errors and bridge requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    Scanpath,
    Saliency,
    Caption,
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricFamily::Scanpath => "scanpath",
            MetricFamily::Saliency => "saliency",
            MetricFamily::Caption => "caption",
        })
    }
}

/// Inputs for scoring one predicted scanpath against its ground truth
///
/// Fixations are in pixel space; adapters that need normalized
/// coordinates scale by `image_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanpathRequest {
    pub dataset: Dataset,
    /// Image file name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub image_size: ImageSize,
    pub target: FixationRecord,
    pub prediction: FixationRecord,
}

/// All predicted and recorded scanpaths for one saliency key (image)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaliencyGroup {
    pub dataset: Dataset,
    pub image_size: ImageSize,
    pub predictions: Vec<FixationRecord>,
    pub targets: Vec<FixationRecord>,
}

/// Per-sample scanpath similarity (ScanMatch, MultiMatch, SED, STDE, SS, SSS)
pub trait ScanpathMetric {
    /// Score a batch of samples
    ///
    /// Must return exactly one score record per request, in request order.
    fn score_batch(&self, requests: &[ScanpathRequest]) -> Result<Vec<ScanpathScores>, MetricError>;
}

/// Saliency statistics (CC, AUC, NSS, sAUC, KLD, SIM) per image
pub trait SaliencyMetric {
    /// Score every saliency group
    ///
    /// The saliency ground truth is built from all recorded scanpaths of an
    /// image, so this is called once with the complete set of groups.
    fn score_saliency(
        &self,
        groups: &BTreeMap<String, SaliencyGroup>,
    ) -> Result<BTreeMap<String, SaliencyScores>, MetricError>;
}

/// Corpus-level caption metrics (BLEU-4, METEOR, ROUGE-L, CIDEr, CIDEr-R)
pub trait CaptionMetric {
    /// Score every candidate set against its references
    ///
    /// CIDEr uses document frequencies over the whole corpus, so this is
    /// called once per run with every explanation key.
    fn score_captions(
        &self,
        references: &BTreeMap<String, Vec<String>>,
        candidates: &BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeMap<String, CaptionScores>, MetricError>;
}

/// Check that a keyed adapter answered for every key it was asked about
pub fn ensure_keys<T, U>(
    family: MetricFamily,
    asked: &BTreeMap<String, T>,
    answered: &BTreeMap<String, U>,
) -> Result<(), MetricError> {
    match asked.keys().find(|key| !answered.contains_key(*key)) {
        Some(key) => Err(MetricError::MissingKey {
            family,
            key: key.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MetricFamily::Saliency).unwrap(),
            "\"saliency\""
        );
        assert_eq!(MetricFamily::Caption.to_string(), "caption");
    }

    #[test]
    fn test_ensure_keys_reports_first_missing() {
        let asked: BTreeMap<String, ()> = [("a".to_string(), ()), ("b".to_string(), ())]
            .into_iter()
            .collect();
        let answered: BTreeMap<String, f64> = [("a".to_string(), 1.0)].into_iter().collect();

        let err = ensure_keys(MetricFamily::Caption, &asked, &answered).unwrap_err();
        assert!(matches!(err, MetricError::MissingKey { key, .. } if key == "b"));

        let answered: BTreeMap<String, f64> =
            [("a".to_string(), 1.0), ("b".to_string(), 2.0)].into_iter().collect();
        assert!(ensure_keys(MetricFamily::Caption, &asked, &answered).is_ok());
    }
}
