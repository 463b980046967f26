//! Integration tests for the external-process metric bridge
#![cfg(unix)]

use anyhow::Result;
use scanpath_data::{Dataset, FixationRecord, ImageSize};
use scanpath_metrics::{
    CaptionMetric, CommandMetrics, MetricError, SaliencyGroup, SaliencyMetric, ScanpathMetric,
    ScanpathRequest,
};
use std::collections::BTreeMap;

/// Build a bridge around a shell snippet that drains stdin first
fn shell_scorer(script: &str) -> CommandMetrics {
    let script = format!("cat > /dev/null; {}", script);
    CommandMetrics::new(["sh", "-c", script.as_str()]).expect("Failed to create scorer")
}

fn request() -> ScanpathRequest {
    let record = FixationRecord {
        x: vec![100.0, 200.0],
        y: vec![50.0, 60.0],
        t: vec![0.2, 0.3],
    };
    ScanpathRequest {
        dataset: Dataset::Osie,
        name: "1001.jpg".to_string(),
        task: None,
        image_size: ImageSize {
            width: 800,
            height: 600,
        },
        target: record.clone(),
        prediction: record,
    }
}

fn group() -> SaliencyGroup {
    SaliencyGroup {
        dataset: Dataset::Osie,
        image_size: ImageSize {
            width: 800,
            height: 600,
        },
        predictions: vec![FixationRecord::default()],
        targets: vec![FixationRecord::default()],
    }
}

#[test]
fn test_scanpath_scores_parsed() -> Result<()> {
    let scorer = shell_scorer(
        r#"printf '[{"scanmatch_score":[0.5,0.4],"multimatch_score":[0.9,0.8,0.7,0.6,0.5],"sed_score":3.0,"stde_score":0.7,"SS_score":[0.2,0.1]}]'"#,
    );

    let scores = scorer.score_batch(&[request()])?;

    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].scanmatch_score, [0.5, 0.4]);
    assert_eq!(scores[0].sss_score, None);
    Ok(())
}

#[test]
fn test_request_is_written_to_stdin() -> Result<()> {
    // Echo the request back as the error message to inspect it
    let scorer = CommandMetrics::new(["sh", "-c", "cat >&2; exit 1"])?;

    let err = scorer.score_batch(&[request()]).unwrap_err();

    match err {
        MetricError::Failed { stderr, .. } => {
            let request: serde_json::Value = serde_json::from_str(&stderr)?;
            assert_eq!(request["family"], "scanpath");
            assert_eq!(request["payload"][0]["dataset"], "OSIE");
            assert_eq!(request["payload"][0]["prediction"]["X"][1], 200.0);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn test_length_mismatch_is_fatal() {
    let scorer = shell_scorer("printf '[]'");
    let err = scorer.score_batch(&[request()]).unwrap_err();
    assert!(matches!(
        err,
        MetricError::LengthMismatch {
            expected: 1,
            actual: 0,
            ..
        }
    ));
}

#[test]
fn test_nonzero_exit_reports_stderr() {
    let scorer = shell_scorer("echo 'saliency map missing' >&2; exit 3");
    let groups: BTreeMap<String, SaliencyGroup> =
        [("OSIE-1001.jpg".to_string(), group())].into_iter().collect();

    let err = scorer.score_saliency(&groups).unwrap_err();

    match err {
        MetricError::Failed { stderr, .. } => assert_eq!(stderr, "saliency map missing"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_saliency_missing_key_is_fatal() {
    let scorer = shell_scorer(
        r#"printf '{"OSIE-other.jpg":{"CC":0.5,"AUC":0.8,"NSS":1.5,"sAUC":0.7,"KLD":1.2,"SIM":0.4}}'"#,
    );
    let groups: BTreeMap<String, SaliencyGroup> =
        [("OSIE-1001.jpg".to_string(), group())].into_iter().collect();

    let err = scorer.score_saliency(&groups).unwrap_err();

    assert!(matches!(err, MetricError::MissingKey { key, .. } if key == "OSIE-1001.jpg"));
}

#[test]
fn test_caption_scores_parsed() -> Result<()> {
    let scorer = shell_scorer(
        r#"printf '{"1001-2":{"Bleu_4":0.1,"METEOR":0.2,"ROUGE_L":0.3,"CIDEr":0.9,"CIDEr-R":0.8}}'"#,
    );
    let references: BTreeMap<String, Vec<String>> =
        [("1001-2".to_string(), vec!["a red cup".to_string()])].into_iter().collect();
    let candidates: BTreeMap<String, Vec<String>> =
        [("1001-2".to_string(), vec!["a cup".to_string()])].into_iter().collect();

    let scores = scorer.score_captions(&references, &candidates)?;

    assert_eq!(scores["1001-2"].cider, 0.9);
    Ok(())
}

#[test]
fn test_malformed_reply_is_protocol_error() {
    let scorer = shell_scorer("echo not-json");
    let err = scorer.score_batch(&[request()]).unwrap_err();
    assert!(matches!(err, MetricError::Protocol { .. }));
}

#[test]
fn test_working_dir_and_env_reach_scorer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let scorer = shell_scorer(r#"echo "$SCORER_MODE $(pwd -P)" >&2; exit 1"#)
        .working_dir(dir.path())
        .env("SCORER_MODE", "strict");

    let err = scorer.score_batch(&[request()]).unwrap_err();

    match err {
        MetricError::Failed { stderr, .. } => {
            let canonical = dir.path().canonicalize()?;
            assert!(stderr.starts_with("strict "));
            assert!(stderr.ends_with(canonical.to_string_lossy().as_ref()));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}
