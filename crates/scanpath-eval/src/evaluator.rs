//! Evaluation orchestration
//!
//! Every worker runs the same loop over its shard: collate, forward, score
//! scanpaths, gather. The coordinator accumulates the gathered samples and,
//! once the pass is over, resolves keys, decodes explanations, runs the
//! corpus-level saliency and caption metrics and builds the report.

use crate::collective::{Collective, LocalCollective, ThreadGroup};
use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::gather::Gatherer;
use crate::model::{ScanpathModel, TokenSegments};
use crate::report::{
    EvaluationOutcome, GeneratedExplanation, MetricsSummary, PredictionEntry, SampleScores,
    ScoredSample,
};
use scanpath_data::{
    resolve, transform, EvalSplit, FixationRecord, ShardedSampler, Vocabulary,
};
use scanpath_metrics::{
    ensure_keys, CaptionMetric, MetricError, MetricFamily, SaliencyGroup, SaliencyMetric,
    ScanpathMetric, ScanpathRequest, ScanpathScores,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use tracing::{debug, info};

/// Metric adapters used by a run
#[derive(Clone, Copy)]
pub struct MetricSuite<'a> {
    pub scanpath: &'a (dyn ScanpathMetric + Sync),
    pub saliency: &'a (dyn SaliencyMetric + Sync),
    pub caption: &'a (dyn CaptionMetric + Sync),
}

impl<'a> MetricSuite<'a> {
    /// Use one adapter for all three families
    pub fn uniform<M>(metrics: &'a M) -> Self
    where
        M: ScanpathMetric + SaliencyMetric + CaptionMetric + Sync,
    {
        Self {
            scanpath: metrics,
            saliency: metrics,
            caption: metrics,
        }
    }
}

/// Read-only inputs shared by every worker
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub split: &'a EvalSplit,
    pub model: &'a dyn ScanpathModel,
    pub metrics: MetricSuite<'a>,
    /// Explanation decoder; ids are rendered as numbers without one
    pub decoder: Option<&'a Vocabulary>,
    pub config: &'a EvalConfig,
}

/// One scored sample as exchanged between workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatheredSample {
    /// Dataset index
    pub idx: usize,
    /// First-rollout predicted scanpath
    pub prediction: FixationRecord,
    /// Ground-truth scanpath after collation
    pub target: FixationRecord,
    pub scores: ScanpathScores,
    /// First-rollout explanation ids
    pub generated: TokenSegments,
}

/// Coordinator-side collection of gathered samples
///
/// Created at the start of a run and consumed once by [`finalize`].
#[derive(Debug, Default)]
pub struct Accumulator {
    samples: Vec<GatheredSample>,
    seen: BTreeSet<usize>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the samples of one gathered batch
    pub fn extend(&mut self, batch: usize, samples: Vec<GatheredSample>) -> Result<(), EvalError> {
        for sample in samples {
            if !self.seen.insert(sample.idx) {
                return Err(EvalError::Gather {
                    batch,
                    message: format!("sample {} gathered twice", sample.idx),
                });
            }
            self.samples.push(sample);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<GatheredSample> {
        self.samples
    }
}

/// Run the per-batch loop for one rank
///
/// # Returns
/// The filled accumulator on the coordinator, `None` on other ranks
pub fn run_worker<C: Collective + ?Sized>(
    ctx: &EvalContext<'_>,
    collective: &C,
) -> Result<Option<Accumulator>, EvalError> {
    let sampler = ShardedSampler::new(
        ctx.split.len(),
        collective.world_size(),
        collective.rank(),
        ctx.config.test_batch,
    )?;
    let mut gatherer = Gatherer::new(collective, ctx.split.len());
    let mut accumulator = collective.is_coordinator().then(Accumulator::new);
    let progress = progress_bar(
        sampler.num_batches(),
        collective.is_coordinator() && ctx.config.show_progress,
    );

    for (step, indices) in sampler.iter().enumerate() {
        let local = score_batch(ctx, step, &indices)?;
        let gathered = gatherer.gather_for_metrics(local)?;
        debug!(
            rank = collective.rank(),
            batch = step,
            gathered = gathered.len(),
            seen = gatherer.seen(),
            "Finished batch"
        );
        progress.set_message(format!("{}/{} samples", gatherer.seen(), ctx.split.len()));
        progress.inc(1);
        if let Some(accumulator) = accumulator.as_mut() {
            accumulator.extend(step, gathered)?;
        }
    }

    gatherer.finish()?;
    progress.finish_and_clear();
    Ok(accumulator)
}

/// Batch progress bar; hidden unless `visible`
fn progress_bar(num_batches: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(num_batches as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(style.progress_chars("#>-"));
    }
    progress
}

/// Inference and per-sample scanpath metrics for one local batch
fn score_batch(
    ctx: &EvalContext<'_>,
    step: usize,
    indices: &[usize],
) -> Result<Vec<GatheredSample>, EvalError> {
    let batch = ctx.split.collate(indices, ctx.config.max_fixations)?;

    let output = ctx
        .model
        .forward(&batch, ctx.config.eval_repeat_num)
        .map_err(|err| EvalError::Inference {
            batch: step,
            message: format!("{:#}", err),
        })?;
    let (scanpaths, generated) = output
        .first_rollout(batch.len())
        .map_err(|message| EvalError::Inference {
            batch: step,
            message,
        })?;

    let predictions = transform(scanpaths)?;
    let targets = transform(batch.gt_fixation.view())?;

    let requests = batch
        .idx
        .iter()
        .zip(&predictions)
        .zip(&targets)
        .zip(&batch.image_size)
        .map(|(((&idx, prediction), target), &image_size)| -> Result<_, EvalError> {
            let info = ctx.split.get(idx)?;
            Ok(ScanpathRequest {
                dataset: info.dataset()?,
                name: info.name.clone(),
                task: info.task.clone(),
                image_size,
                target: target.clone(),
                prediction: prediction.clone(),
            })
        })
        .collect::<Result<Vec<ScanpathRequest>, _>>()?;

    let scores = ctx.metrics.scanpath.score_batch(&requests)?;
    if scores.len() != requests.len() {
        return Err(MetricError::LengthMismatch {
            family: MetricFamily::Scanpath,
            expected: requests.len(),
            actual: scores.len(),
        }
        .into());
    }

    Ok(batch
        .idx
        .iter()
        .zip(predictions)
        .zip(targets)
        .zip(scores)
        .zip(generated)
        .map(|((((&idx, prediction), target), scores), generated)| GatheredSample {
            idx,
            prediction,
            target,
            scores,
            generated: generated.clone(),
        })
        .collect())
}

/// Decode generated segments into one explanation string
///
/// Segments are decoded separately and joined with a single space.
pub fn decode_explanation(
    decoder: Option<&Vocabulary>,
    segments: &TokenSegments,
) -> Result<String, EvalError> {
    let parts = segments
        .iter()
        .map(|ids| match decoder {
            Some(vocab) => vocab.decode(ids).map_err(EvalError::from),
            None => Ok(ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" ")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(" ").trim().to_string())
}

/// Build the report from everything the coordinator gathered
pub fn finalize(
    ctx: &EvalContext<'_>,
    accumulator: Accumulator,
) -> Result<EvaluationOutcome, EvalError> {
    if accumulator.len() != ctx.split.len() {
        return Err(EvalError::Gather {
            batch: 0,
            message: format!(
                "gathered {} samples, split has {}",
                accumulator.len(),
                ctx.split.len()
            ),
        });
    }
    let samples = accumulator.into_samples();

    let mut references: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut candidates: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut groups: BTreeMap<String, SaliencyGroup> = BTreeMap::new();
    let mut owners: BTreeMap<String, usize> = BTreeMap::new();
    let mut keyed = Vec::with_capacity(samples.len());

    for sample in &samples {
        let info = ctx.split.get(sample.idx)?;
        let keys = resolve(info)?;

        let explanation = match &keys.explanation {
            Some(key) => {
                if let Some(&first) = owners.get(key) {
                    return Err(EvalError::DuplicateExplanationKey {
                        key: key.clone(),
                        first,
                        second: sample.idx,
                    });
                }
                owners.insert(key.clone(), sample.idx);
                let gts = ctx.split.explanation_gts().get(key).ok_or_else(|| {
                    EvalError::MissingReferences { key: key.clone() }
                })?;
                let caption = decode_explanation(ctx.decoder, &sample.generated)?;
                references.insert(key.clone(), gts.clone());
                candidates.insert(key.clone(), vec![caption.clone()]);
                Some((key.clone(), caption, gts.clone()))
            }
            None => None,
        };

        let group = groups
            .entry(keys.saliency.clone())
            .or_insert_with(|| SaliencyGroup {
                dataset: keys.dataset,
                image_size: info.image_size,
                predictions: Vec::new(),
                targets: Vec::new(),
            });
        group.predictions.push(sample.prediction.clone());
        group.targets.push(sample.target.clone());

        keyed.push((info, keys.dataset, explanation));
    }

    info!(
        samples = samples.len(),
        images = groups.len(),
        explanations = candidates.len(),
        "Computing saliency and caption metrics"
    );

    let saliency = ctx.metrics.saliency.score_saliency(&groups)?;
    ensure_keys(MetricFamily::Saliency, &groups, &saliency)?;
    let captions = ctx.metrics.caption.score_captions(&references, &candidates)?;
    ensure_keys(MetricFamily::Caption, &candidates, &captions)?;

    let saliency_scores: Vec<_> = groups
        .iter()
        .filter_map(|(key, group)| saliency.get(key).map(|scores| (group.dataset, *scores)))
        .collect();

    let mut scored = Vec::with_capacity(samples.len());
    let mut predictions = Vec::with_capacity(samples.len());
    for (sample, (info, dataset, explanation)) in samples.into_iter().zip(keyed) {
        let caption = explanation
            .as_ref()
            .and_then(|(key, _, _)| captions.get(key).copied());

        scored.push(ScoredSample {
            dataset,
            scanpath: sample.scores,
            caption,
        });

        let (explanation, gt_explanation) = match explanation {
            Some((_, caption, gts)) => (Some(vec![GeneratedExplanation { caption }]), Some(gts)),
            None => (None, None),
        };
        predictions.push(PredictionEntry {
            dataset,
            name: info.name.clone(),
            subject: info.subject.clone(),
            task: info.task.clone(),
            question_id: info.question_id.clone(),
            length: sample.prediction.len(),
            fixations: sample.prediction,
            evaluation_scores: SampleScores {
                scanpath: sample.scores,
                caption,
            },
            explanation,
            gt_explanation,
        });
    }

    let summary = MetricsSummary::build(&scored, &saliency_scores);
    Ok(EvaluationOutcome::new(summary, predictions))
}

/// Evaluate a split with `num_workers` data-parallel workers
///
/// A single worker runs on the calling thread; more workers run as scoped
/// threads joined through a [`ThreadGroup`]. Any worker failure aborts the
/// run.
pub fn evaluate(ctx: &EvalContext<'_>, num_workers: usize) -> Result<EvaluationOutcome, EvalError> {
    ctx.config.validate()?;
    if num_workers == 0 {
        return Err(EvalError::Config("num_workers must be at least 1".to_string()));
    }

    info!(
        split = %ctx.split.split(),
        samples = ctx.split.len(),
        workers = num_workers,
        batch_size = ctx.config.test_batch,
        repeat_num = ctx.config.eval_repeat_num,
        "Starting evaluation"
    );

    let accumulator = if num_workers == 1 {
        run_worker(ctx, &LocalCollective)?
    } else {
        run_threads(ctx, num_workers)?
    };

    let accumulator = accumulator.ok_or_else(|| EvalError::Gather {
        batch: 0,
        message: "coordinator returned no results".to_string(),
    })?;
    finalize(ctx, accumulator)
}

fn run_threads(
    ctx: &EvalContext<'_>,
    num_workers: usize,
) -> Result<Option<Accumulator>, EvalError> {
    let ranks = ThreadGroup::new(num_workers);
    let results: Vec<Result<Option<Accumulator>, EvalError>> = thread::scope(|scope| {
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|collective| scope.spawn(move || run_worker(ctx, &collective)))
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(EvalError::Gather {
                        batch: 0,
                        message: format!("worker {} panicked", rank),
                    })
                })
            })
            .collect()
    });

    // Peers of a failed worker fail with a gather error; report the cause.
    let mut coordinator = None;
    let mut first_error = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(accumulator) if rank == 0 => coordinator = accumulator,
            Ok(_) => {}
            Err(err) => {
                let replace = match &first_error {
                    None => true,
                    Some(EvalError::Gather { .. }) => !matches!(err, EvalError::Gather { .. }),
                    Some(_) => false,
                };
                if replace {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(coordinator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_without_vocabulary_renders_ids() {
        let segments = vec![vec![4, 5], vec![6]];
        assert_eq!(decode_explanation(None, &segments).unwrap(), "4 5 6");
        assert_eq!(decode_explanation(None, &Vec::new()).unwrap(), "");
    }

    #[test]
    fn test_decode_joins_segments() {
        let vocab = Vocabulary::from_tokens(["[PAD]", "[SEP]", "look", "##ing", "at", "cup", "."]);
        let segments = vec![vec![2, 3, 4, 5, 1], vec![6, 0]];
        assert_eq!(decode_explanation(Some(&vocab), &segments).unwrap(), "looking at cup .");
    }

    #[test]
    fn test_progress_bar_counts_batches() {
        assert_eq!(progress_bar(3, true).length(), Some(3));
        assert!(progress_bar(3, false).is_hidden());
    }

    #[test]
    fn test_accumulator_rejects_duplicates() {
        let sample = GatheredSample {
            idx: 2,
            prediction: FixationRecord::default(),
            target: FixationRecord::default(),
            scores: ScanpathScores {
                scanmatch_score: [0.0; 2],
                multimatch_score: [0.0; 5],
                sed_score: 0.0,
                stde_score: 0.0,
                ss_score: [0.0; 2],
                sss_score: None,
            },
            generated: Vec::new(),
        };

        let mut accumulator = Accumulator::new();
        accumulator.extend(0, vec![sample.clone()]).unwrap();
        let err = accumulator.extend(1, vec![sample]).unwrap_err();
        assert!(matches!(err, EvalError::Gather { batch: 1, .. }));
        assert_eq!(accumulator.len(), 1);
    }
}
