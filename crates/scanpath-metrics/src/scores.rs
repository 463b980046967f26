//! Per-sample score records for the three metric families
//!
//! Field names serialize to the names used in `predictions.json`. JSON has
//! no NaN: serde_json writes non-finite floats as `null`, and every score
//! field reads `null` back as NaN.

use serde::{Deserialize, Serialize};

/// Scanpath similarity scores for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanpathScores {
    /// ScanMatch `[without duration, with duration]`
    #[serde(deserialize_with = "nullable::pair")]
    pub scanmatch_score: [f64; 2],
    /// MultiMatch `[vector, direction, length, position, duration]`
    #[serde(deserialize_with = "nullable::five")]
    pub multimatch_score: [f64; 5],
    /// String edit distance
    #[serde(deserialize_with = "nullable::scalar")]
    pub sed_score: f64,
    /// Scanpath-to-time-delay embedding distance
    #[serde(deserialize_with = "nullable::scalar")]
    pub stde_score: f64,
    /// Semantic sequence score `[without duration, with duration]`
    #[serde(rename = "SS_score", deserialize_with = "nullable::pair")]
    pub ss_score: [f64; 2],
    /// Saliency-aware semantic sequence score; only reported for datasets
    /// with segmentation ground truth
    #[serde(
        rename = "SSS_score",
        default,
        deserialize_with = "nullable::optional_pair",
        skip_serializing_if = "Option::is_none"
    )]
    pub sss_score: Option<[f64; 2]>,
}

/// Saliency statistics for one image key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaliencyScores {
    #[serde(rename = "CC", deserialize_with = "nullable::scalar")]
    pub cc: f64,
    #[serde(rename = "AUC", deserialize_with = "nullable::scalar")]
    pub auc: f64,
    #[serde(rename = "NSS", deserialize_with = "nullable::scalar")]
    pub nss: f64,
    #[serde(rename = "sAUC", deserialize_with = "nullable::scalar")]
    pub sauc: f64,
    #[serde(rename = "KLD", deserialize_with = "nullable::scalar")]
    pub kld: f64,
    #[serde(rename = "SIM", deserialize_with = "nullable::scalar")]
    pub sim: f64,
}

impl SaliencyScores {
    /// Build from the positional `[CC, AUC, NSS, sAUC, KLD, SIM]` layout
    pub fn from_array(values: [f64; 6]) -> Self {
        let [cc, auc, nss, sauc, kld, sim] = values;
        Self {
            cc,
            auc,
            nss,
            sauc,
            kld,
            sim,
        }
    }
}

/// Caption quality scores for one explanation key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptionScores {
    #[serde(rename = "Bleu_4", deserialize_with = "nullable::scalar")]
    pub bleu_4: f64,
    #[serde(rename = "METEOR", deserialize_with = "nullable::scalar")]
    pub meteor: f64,
    #[serde(rename = "ROUGE_L", deserialize_with = "nullable::scalar")]
    pub rouge_l: f64,
    #[serde(rename = "CIDEr", deserialize_with = "nullable::scalar")]
    pub cider: f64,
    #[serde(rename = "CIDEr-R", deserialize_with = "nullable::scalar")]
    pub cider_r: f64,
}

mod nullable {
    use serde::{Deserialize, Deserializer};

    fn nan(value: Option<f64>) -> f64 {
        value.unwrap_or(f64::NAN)
    }

    pub fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(nan(Option::deserialize(deserializer)?))
    }

    pub fn pair<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 2], D::Error> {
        let values: [Option<f64>; 2] = Deserialize::deserialize(deserializer)?;
        Ok(values.map(nan))
    }

    pub fn five<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 5], D::Error> {
        let values: [Option<f64>; 5] = Deserialize::deserialize(deserializer)?;
        Ok(values.map(nan))
    }

    pub fn optional_pair<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<[f64; 2]>, D::Error> {
        let values: Option<[Option<f64>; 2]> = Deserialize::deserialize(deserializer)?;
        Ok(values.map(|pair| pair.map(nan)))
    }
}
