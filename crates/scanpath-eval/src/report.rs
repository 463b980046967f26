//! Metric aggregation and result persistence

use crate::error::EvalError;
use scanpath_data::{Dataset, FixationRecord, Label};
use scanpath_metrics::{CaptionScores, SaliencyScores, ScanpathScores};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the synthetic entry aggregating every dataset
pub const ALL: &str = "all";

type Extractor<T> = fn(&T) -> f64;

const SCANPATH_METRICS: [(&str, Extractor<ScanpathScores>); 12] = [
    ("metrics/SM without Dur", |s| s.scanmatch_score[0]),
    ("metrics/SM with Dur", |s| s.scanmatch_score[1]),
    ("metrics/MM Vector", |s| s.multimatch_score[0]),
    ("metrics/MM Direction", |s| s.multimatch_score[1]),
    ("metrics/MM Length", |s| s.multimatch_score[2]),
    ("metrics/MM Position", |s| s.multimatch_score[3]),
    ("metrics/MM Duration", |s| s.multimatch_score[4]),
    ("metrics/MM", |s| s.multimatch_score.iter().sum::<f64>() / 5.0),
    ("metrics/SED", |s| s.sed_score),
    ("metrics/STDE", |s| s.stde_score),
    ("metrics/SS without Dur", |s| s.ss_score[0]),
    ("metrics/SS with Dur", |s| s.ss_score[1]),
];

const SSS_METRICS: [(&str, usize); 2] = [
    ("metrics/SSS without Dur", 0),
    ("metrics/SSS with Dur", 1),
];

const SALIENCY_METRICS: [(&str, Extractor<SaliencyScores>); 6] = [
    ("metrics/CC", |s| s.cc),
    ("metrics/AUC", |s| s.auc),
    ("metrics/NSS", |s| s.nss),
    ("metrics/sAUC", |s| s.sauc),
    ("metrics/KLD", |s| s.kld),
    ("metrics/SIM", |s| s.sim),
];

const CAPTION_METRICS: [(&str, Extractor<CaptionScores>); 5] = [
    ("metrics/Bleu_4", |s| s.bleu_4),
    ("metrics/METEOR", |s| s.meteor),
    ("metrics/ROUGE_L", |s| s.rouge_l),
    ("metrics/CIDEr", |s| s.cider),
    ("metrics/CIDEr-R", |s| s.cider_r),
];

/// Per-sample scores that feed the summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSample {
    pub dataset: Dataset,
    pub scanpath: ScanpathScores,
    /// `None` for samples without an explanation key
    pub caption: Option<CaptionScores>,
}

/// Mean metrics for one dataset, in catalogue order
///
/// A value of `None` means the metric applies but no sample contributed;
/// it serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMetrics {
    name: String,
    metrics: Vec<(&'static str, Option<f64>)>,
}

impl DatasetMetrics {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &[(&'static str, Option<f64>)] {
        &self.metrics
    }

    /// Look up a metric; the outer `None` means the metric is absent
    pub fn get(&self, metric: &str) -> Option<Option<f64>> {
        self.metrics
            .iter()
            .find(|(name, _)| *name == metric)
            .map(|(_, value)| *value)
    }
}

impl Serialize for DatasetMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len()))?;
        for (name, value) in &self.metrics {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Per-dataset summaries followed by the `all` entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsSummary {
    datasets: Vec<DatasetMetrics>,
}

impl MetricsSummary {
    /// Aggregate per-sample and per-image scores
    ///
    /// # Arguments
    /// * `samples` - Scanpath and caption scores, one entry per sample
    /// * `saliency` - Saliency scores, one entry per saliency key
    pub fn build(samples: &[ScoredSample], saliency: &[(Dataset, SaliencyScores)]) -> Self {
        let mut datasets = Vec::new();
        for dataset in Dataset::ALL {
            let members: Vec<&ScoredSample> =
                samples.iter().filter(|s| s.dataset == dataset).collect();
            if members.is_empty() {
                continue;
            }
            let maps: Vec<&SaliencyScores> = saliency
                .iter()
                .filter(|(d, _)| *d == dataset)
                .map(|(_, scores)| scores)
                .collect();
            datasets.push(summarize(dataset.name(), &members, &maps, false));
        }

        let members: Vec<&ScoredSample> = samples.iter().collect();
        let maps: Vec<&SaliencyScores> = saliency.iter().map(|(_, scores)| scores).collect();
        datasets.push(summarize(ALL, &members, &maps, true));

        Self { datasets }
    }

    pub fn datasets(&self) -> &[DatasetMetrics] {
        &self.datasets
    }

    pub fn get(&self, name: &str) -> Option<&DatasetMetrics> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// Fixed-width console table, one block per dataset
    pub fn to_table(&self) -> String {
        let mut table = String::new();
        for dataset in &self.datasets {
            table.push_str(&format!("{}\n", "-".repeat(40)));
            table.push_str(&format!("{:30}\n", dataset.name));
            for (name, value) in &dataset.metrics {
                match value {
                    Some(value) => table.push_str(&format!("{:30}: {:.3}\n", name, value)),
                    None => table.push_str(&format!("{:30}: n/a\n", name)),
                }
            }
        }
        table.push_str(&format!("{}\n", "-".repeat(40)));
        table
    }
}

impl Serialize for MetricsSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.datasets.len()))?;
        for dataset in &self.datasets {
            map.serialize_entry(&dataset.name, dataset)?;
        }
        map.end()
    }
}

fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Summarize one group of samples
///
/// Optional families (SSS, saliency, captions) only appear for a dataset
/// when at least one of its samples reports them; the `all` entry always
/// lists them.
fn summarize(
    name: &str,
    samples: &[&ScoredSample],
    saliency: &[&SaliencyScores],
    overall: bool,
) -> DatasetMetrics {
    let mut metrics = Vec::new();

    for (metric, extract) in SCANPATH_METRICS {
        metrics.push((metric, mean(samples.iter().map(|s| extract(&s.scanpath)))));
    }

    let reported: Vec<[f64; 2]> = samples.iter().filter_map(|s| s.scanpath.sss_score).collect();
    if overall || !reported.is_empty() {
        let valid: Vec<[f64; 2]> = reported
            .iter()
            .copied()
            .filter(|pair| !pair.iter().any(|v| v.is_nan()))
            .collect();
        let filtered = reported.len() - valid.len();
        if filtered > 0 {
            warn!(
                dataset = name,
                filtered,
                reported = reported.len(),
                "Excluded NaN SSS scores from the mean"
            );
        }
        for (metric, component) in SSS_METRICS {
            metrics.push((metric, mean(valid.iter().map(|pair| pair[component]))));
        }
    }

    if overall || !saliency.is_empty() {
        for (metric, extract) in SALIENCY_METRICS {
            metrics.push((metric, mean(saliency.iter().map(|s| extract(*s)))));
        }
    }

    let captions: Vec<&CaptionScores> = samples.iter().filter_map(|s| s.caption.as_ref()).collect();
    if overall || !captions.is_empty() {
        for (metric, extract) in CAPTION_METRICS {
            metrics.push((metric, mean(captions.iter().map(|s| extract(*s)))));
        }
    }

    DatasetMetrics {
        name: name.to_string(),
        metrics,
    }
}

/// One generated explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedExplanation {
    pub caption: String,
}

/// Scores reported for one sample in `predictions.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleScores {
    #[serde(flatten)]
    pub scanpath: ScanpathScores,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub caption: Option<CaptionScores>,
}

/// One entry of `predictions.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionEntry {
    pub dataset: Dataset,
    pub name: String,
    pub subject: Label,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<Label>,
    /// Predicted scanpath, pixel space
    #[serde(flatten)]
    pub fixations: FixationRecord,
    pub length: usize,
    pub evaluation_scores: SampleScores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Vec<GeneratedExplanation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt_explanation: Option<Vec<String>>,
}

/// Everything a finished run produces
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub summary: MetricsSummary,
    /// Per-sample predictions in dataset order
    pub predictions: Vec<PredictionEntry>,
    /// Completion time (RFC 3339)
    pub finished_at: String,
}

impl EvaluationOutcome {
    pub fn new(summary: MetricsSummary, predictions: Vec<PredictionEntry>) -> Self {
        Self {
            summary,
            predictions,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Write `metric.json` and `predictions.json` into `save_path`
    ///
    /// # Returns
    /// Paths of the metric and prediction files
    pub fn save(&self, save_path: &Path) -> Result<(PathBuf, PathBuf), EvalError> {
        fs::create_dir_all(save_path).map_err(|source| EvalError::Io {
            path: save_path.to_path_buf(),
            source,
        })?;

        let metric_path = save_path.join("metric.json");
        write_json(&metric_path, "metric summary", &self.summary)?;

        let predictions_path = save_path.join("predictions.json");
        write_json(&predictions_path, "predictions", &self.predictions)?;

        Ok((metric_path, predictions_path))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, what: &str, value: &T) -> Result<(), EvalError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| EvalError::Serialization {
        what: what.to_string(),
        source,
    })?;
    fs::write(path, json).map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })
}
