//! Gathering per-rank batch results onto the coordinator

use crate::collective::Collective;
use crate::error::EvalError;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

/// Payload one rank contributes to a gather
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    /// Batches this rank had completed before sending
    batch: usize,
    /// Set by [`Gatherer::finish`] once the rank has no batches left
    #[serde(default)]
    done: bool,
    values: Vec<T>,
}

/// Stateful gatherer for one evaluation pass
///
/// Every rank calls [`Gatherer::gather_for_metrics`] once per batch, in the
/// same order, and [`Gatherer::finish`] after its last batch. Results are
/// concatenated in rank order, which for a
/// [`ShardedSampler`](scanpath_data::ShardedSampler) is dataset order, and
/// the wrap-around padding of the last batch is dropped.
pub struct Gatherer<'a, C: Collective + ?Sized> {
    collective: &'a C,
    total: usize,
    seen: usize,
    batch: usize,
}

impl<'a, C: Collective + ?Sized> Gatherer<'a, C> {
    /// # Arguments
    /// * `collective` - Group of ranks taking part in the pass
    /// * `total` - True number of samples in the split
    pub fn new(collective: &'a C, total: usize) -> Self {
        Self {
            collective,
            total,
            seen: 0,
            batch: 0,
        }
    }

    /// Samples gathered so far, excluding padding
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Gather this rank's values for the current batch
    ///
    /// # Returns
    /// On the coordinator, the values of every rank in rank-major order,
    /// truncated to the samples not yet seen. Other ranks get an empty list.
    pub fn gather_for_metrics<T>(&mut self, values: Vec<T>) -> Result<Vec<T>, EvalError>
    where
        T: Serialize + DeserializeOwned,
    {
        let envelopes: Vec<Envelope<T>> = self.exchange(false, values)?;

        let mut gathered = Vec::new();
        for (rank, envelope) in envelopes.into_iter().enumerate() {
            if envelope.done || envelope.batch != self.batch {
                return Err(EvalError::Desynchronized {
                    rank,
                    expected: self.batch + 1,
                    actual: envelope.batch,
                });
            }
            gathered.extend(envelope.values);
        }

        gathered.truncate(self.total.saturating_sub(self.seen));
        self.seen += gathered.len();
        self.batch += 1;

        if self.collective.is_coordinator() {
            Ok(gathered)
        } else {
            Ok(Vec::new())
        }
    }

    /// Confirm that every rank ran the same number of batches
    pub fn finish(self) -> Result<(), EvalError> {
        let envelopes: Vec<Envelope<IgnoredAny>> = self.exchange(true, Vec::<()>::new())?;
        for (rank, envelope) in envelopes.into_iter().enumerate() {
            // A rank still gathering has at least one more batch than it
            // reported.
            let ran = if envelope.done {
                envelope.batch
            } else {
                envelope.batch + 1
            };
            if ran != self.batch {
                return Err(EvalError::Desynchronized {
                    rank,
                    expected: self.batch,
                    actual: ran,
                });
            }
        }
        Ok(())
    }

    fn exchange<S, R>(&self, done: bool, values: Vec<S>) -> Result<Vec<Envelope<R>>, EvalError>
    where
        S: Serialize,
        R: DeserializeOwned,
    {
        let envelope = Envelope {
            batch: self.batch,
            done,
            values,
        };
        let payload =
            serde_json::to_value(&envelope).map_err(|source| EvalError::Serialization {
                what: format!("gather payload for batch {}", self.batch),
                source,
            })?;

        self.collective
            .all_gather(self.batch, payload)?
            .into_iter()
            .map(|value| {
                serde_json::from_value(value).map_err(|source| EvalError::Serialization {
                    what: format!("gathered payload for batch {}", self.batch),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::{LocalCollective, ThreadGroup};
    use scanpath_data::ShardedSampler;
    use std::thread;

    /// Run a sharded pass over `len` samples and return the coordinator's list
    fn run_pass(len: usize, world_size: usize, batch_size: usize) -> Vec<usize> {
        let ranks = ThreadGroup::new(world_size);
        thread::scope(|scope| {
            let handles: Vec<_> = ranks
                .into_iter()
                .map(|collective| {
                    scope.spawn(move || {
                        let sampler = ShardedSampler::new(
                            len,
                            collective.world_size(),
                            collective.rank(),
                            batch_size,
                        )
                        .unwrap();
                        let mut gatherer = Gatherer::new(&collective, len);
                        let mut all = Vec::new();
                        for indices in sampler.iter() {
                            all.extend(gatherer.gather_for_metrics(indices).unwrap());
                        }
                        gatherer.finish().unwrap();
                        all
                    })
                })
                .collect();
            let mut results: Vec<Vec<usize>> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            for other in &results[1..] {
                assert!(other.is_empty());
            }
            results.remove(0)
        })
    }

    #[test]
    fn test_full_batches_concatenate_in_order() {
        assert_eq!(run_pass(16, 2, 4), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_ragged_last_batch_drops_padding() {
        assert_eq!(run_pass(7, 2, 4), (0..7).collect::<Vec<_>>());
        assert_eq!(run_pass(10, 3, 3), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_local_gather_tracks_seen() {
        let local = LocalCollective;
        let mut gatherer = Gatherer::new(&local, 5);

        assert_eq!(gatherer.gather_for_metrics(vec![0, 1, 2]).unwrap(), vec![0, 1, 2]);
        assert_eq!(gatherer.gather_for_metrics(vec![3, 4, 0]).unwrap(), vec![3, 4]);
        assert_eq!(gatherer.seen(), 5);
        gatherer.finish().unwrap();
    }

    #[test]
    fn test_mismatched_batch_counts_are_fatal() {
        let ranks = ThreadGroup::new(2);
        let errors: Vec<Option<EvalError>> = thread::scope(|scope| {
            let handles: Vec<_> = ranks
                .into_iter()
                .map(|collective| {
                    scope.spawn(move || {
                        let mut gatherer = Gatherer::new(&collective, 8);
                        let steps = if collective.rank() == 0 { 2 } else { 1 };
                        for step in 0..steps {
                            if let Err(err) = gatherer.gather_for_metrics(vec![step]) {
                                return Some(err);
                            }
                        }
                        gatherer.finish().err()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(errors
            .iter()
            .all(|err| matches!(err, Some(EvalError::Desynchronized { .. }))));
    }
}
