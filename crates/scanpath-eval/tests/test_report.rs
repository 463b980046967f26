//! Unit tests for metric aggregation and report persistence

use scanpath_data::Dataset;
use scanpath_eval::report::{EvaluationOutcome, MetricsSummary, ScoredSample, ALL};
use scanpath_metrics::{CaptionScores, SaliencyScores, ScanpathScores};
use tempfile::TempDir;

fn scanpath(sed: f64, sss: Option<[f64; 2]>) -> ScanpathScores {
    ScanpathScores {
        scanmatch_score: [0.5, 0.4],
        multimatch_score: [0.9, 0.8, 0.7, 0.6, 0.5],
        sed_score: sed,
        stde_score: 0.75,
        ss_score: [0.3, 0.2],
        sss_score: sss,
    }
}

fn sample(dataset: Dataset, sed: f64, sss: Option<[f64; 2]>) -> ScoredSample {
    ScoredSample {
        dataset,
        scanpath: scanpath(sed, sss),
        caption: None,
    }
}

fn caption(cider: f64) -> CaptionScores {
    CaptionScores {
        bleu_4: 0.2,
        meteor: 0.25,
        rouge_l: 0.45,
        cider,
        cider_r: 0.9,
    }
}

fn assert_close(actual: Option<Option<f64>>, expected: f64) {
    let value = actual
        .expect("metric should be present")
        .expect("metric should have a value");
    assert!(
        (value - expected).abs() < 1e-12,
        "expected {}, got {}",
        expected,
        value
    );
}

#[test]
fn test_per_dataset_mean() {
    let samples = [
        sample(Dataset::AirD, 0.1, None),
        sample(Dataset::AirD, 0.2, None),
        sample(Dataset::AirD, 0.3, None),
    ];
    let summary = MetricsSummary::build(&samples, &[]);

    assert_close(summary.get("AiR-D").unwrap().get("metrics/SED"), 0.2);
    assert_close(summary.get(ALL).unwrap().get("metrics/SED"), 0.2);
}

#[test]
fn test_sss_filters_nan() {
    let samples = [
        sample(Dataset::CocoTp, 1.0, Some([f64::NAN, f64::NAN])),
        sample(Dataset::CocoTp, 1.0, Some([0.4, 0.4])),
        sample(Dataset::CocoTp, 1.0, Some([0.6, 0.6])),
    ];
    let summary = MetricsSummary::build(&samples, &[]);
    let coco = summary.get("COCO-TP").unwrap();

    assert_close(coco.get("metrics/SSS without Dur"), 0.5);
    assert_close(coco.get("metrics/SSS with Dur"), 0.5);
}

#[test]
fn test_sss_all_nan_has_no_value() {
    let samples = [
        sample(Dataset::CocoTa, 1.0, Some([f64::NAN, 0.3])),
        sample(Dataset::CocoTa, 1.0, Some([0.2, f64::NAN])),
    ];
    let summary = MetricsSummary::build(&samples, &[]);

    assert_eq!(summary.get("COCO-TA").unwrap().get("metrics/SSS without Dur"), Some(None));
    assert_eq!(summary.get(ALL).unwrap().get("metrics/SSS with Dur"), Some(None));
}

#[test]
fn test_sss_absent_outside_coco() {
    let samples = [
        sample(Dataset::AirD, 1.0, None),
        sample(Dataset::Osie, 1.0, None),
        sample(Dataset::CocoFv, 1.0, Some([0.4, 0.5])),
    ];
    let summary = MetricsSummary::build(&samples, &[]);

    assert_eq!(summary.get("AiR-D").unwrap().get("metrics/SSS without Dur"), None);
    assert_eq!(summary.get("OSIE").unwrap().get("metrics/SSS with Dur"), None);
    assert_close(summary.get("COCO-FV").unwrap().get("metrics/SSS without Dur"), 0.4);
    // Only the COCO-FV sample contributes to "all".
    assert_close(summary.get(ALL).unwrap().get("metrics/SSS with Dur"), 0.5);
}

#[test]
fn test_caption_metrics_skip_samples_without_explanations() {
    let samples = [
        ScoredSample {
            caption: Some(caption(1.0)),
            ..sample(Dataset::Osie, 1.0, None)
        },
        ScoredSample {
            caption: Some(caption(2.0)),
            ..sample(Dataset::Osie, 1.0, None)
        },
        sample(Dataset::CocoFv, 1.0, None),
    ];
    let summary = MetricsSummary::build(&samples, &[]);

    assert_close(summary.get("OSIE").unwrap().get("metrics/CIDEr"), 1.5);
    assert_eq!(summary.get("COCO-FV").unwrap().get("metrics/CIDEr"), None);
    assert_close(summary.get(ALL).unwrap().get("metrics/CIDEr"), 1.5);
}

#[test]
fn test_caption_metrics_reported_as_null_in_all() {
    let samples = [sample(Dataset::CocoFv, 1.0, None)];
    let summary = MetricsSummary::build(&samples, &[]);

    assert_eq!(summary.get(ALL).unwrap().get("metrics/Bleu_4"), Some(None));
    let json = serde_json::to_value(&summary).unwrap();
    assert!(json[ALL]["metrics/Bleu_4"].is_null());
}

#[test]
fn test_saliency_means_per_dataset() {
    let samples = [
        sample(Dataset::AirD, 1.0, None),
        sample(Dataset::Osie, 1.0, None),
    ];
    let saliency = [
        (Dataset::AirD, SaliencyScores::from_array([0.2, 0.8, 1.0, 0.6, 1.5, 0.4])),
        (Dataset::AirD, SaliencyScores::from_array([0.4, 0.8, 2.0, 0.6, 0.5, 0.4])),
        (Dataset::Osie, SaliencyScores::from_array([0.9, 0.9, 3.0, 0.7, 0.1, 0.6])),
    ];
    let summary = MetricsSummary::build(&samples, &saliency);

    assert_close(summary.get("AiR-D").unwrap().get("metrics/CC"), 0.3);
    assert_close(summary.get("AiR-D").unwrap().get("metrics/KLD"), 1.0);
    assert_close(summary.get("OSIE").unwrap().get("metrics/NSS"), 3.0);
    assert_close(summary.get(ALL).unwrap().get("metrics/NSS"), 2.0);
}

#[test]
fn test_unreported_datasets_are_skipped() {
    let samples = [sample(Dataset::Osie, 1.0, None)];
    let summary = MetricsSummary::build(&samples, &[]);

    let names: Vec<&str> = summary.datasets().iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["OSIE", ALL]);
}

#[test]
fn test_metric_json_is_ordered_and_indented() {
    let samples = [sample(Dataset::CocoTp, 0.5, Some([0.4, 0.6]))];
    let outcome = EvaluationOutcome::new(MetricsSummary::build(&samples, &[]), Vec::new());

    let dir = TempDir::new().expect("Failed to create temp dir");
    let (metric_path, predictions_path) = outcome.save(dir.path()).unwrap();

    let content = std::fs::read_to_string(&metric_path).unwrap();
    assert!(content.starts_with("{\n  \"COCO-TP\": {\n    \"metrics/SM without Dur\""));
    let sm = content.find("metrics/SM without Dur").unwrap();
    let sed = content.find("metrics/SED").unwrap();
    let sss = content.find("metrics/SSS without Dur").unwrap();
    assert!(sm < sed && sed < sss);

    let predictions = std::fs::read_to_string(&predictions_path).unwrap();
    assert_eq!(predictions, "[]");
}

#[test]
fn test_nan_in_unfiltered_metric_serializes_as_null() {
    let samples = [
        sample(Dataset::Osie, f64::NAN, None),
        sample(Dataset::Osie, 0.5, None),
    ];
    let summary = MetricsSummary::build(&samples, &[]);

    let value = summary.get("OSIE").unwrap().get("metrics/SED").unwrap().unwrap();
    assert!(value.is_nan());
    let json = serde_json::to_value(&summary).unwrap();
    assert!(json["OSIE"]["metrics/SED"].is_null());
}
