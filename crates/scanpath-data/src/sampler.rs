//! Sharded, deterministic batch enumeration for data-parallel evaluation

use crate::error::DataError;

/// Per-rank view over the dataset indices
///
/// Global step `s` covers indices `[s * N * B, (s + 1) * N * B)`; rank `r`
/// takes the `r`-th contiguous block of `B`. Concatenating the shards of a
/// step in rank order therefore reproduces dataset order.
///
/// Every rank sees the same number of steps with the same batch size: when
/// the last step runs past the end of the dataset, the missing slots wrap
/// around to the start. Those padding entries must be dropped after the
/// gather (see [`ShardedSampler::padding`]).
#[derive(Debug, Clone, Copy)]
pub struct ShardedSampler {
    len: usize,
    world_size: usize,
    rank: usize,
    batch_size: usize,
}

impl ShardedSampler {
    /// Create a sampler for one rank
    ///
    /// # Arguments
    /// * `len` - Number of samples in the split
    /// * `world_size` - Number of workers
    /// * `rank` - This worker's rank (`0..world_size`)
    /// * `batch_size` - Samples per worker per step
    pub fn new(
        len: usize,
        world_size: usize,
        rank: usize,
        batch_size: usize,
    ) -> Result<Self, DataError> {
        if world_size == 0 {
            return Err(DataError::InvalidSharding(
                "world size must be positive".to_string(),
            ));
        }
        if rank >= world_size {
            return Err(DataError::InvalidSharding(format!(
                "rank {} out of range for world size {}",
                rank, world_size
            )));
        }
        if batch_size == 0 {
            return Err(DataError::InvalidSharding(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            len,
            world_size,
            rank,
            batch_size,
        })
    }

    /// Samples consumed by one global step
    pub fn step_size(&self) -> usize {
        self.world_size * self.batch_size
    }

    /// Number of steps every rank runs
    pub fn num_batches(&self) -> usize {
        self.len.div_ceil(self.step_size())
    }

    /// Synthetic entries added to the last step to equalise shards
    pub fn padding(&self) -> usize {
        self.num_batches() * self.step_size() - self.len
    }

    /// Dataset indices of this rank's batch at `step`
    pub fn batch(&self, step: usize) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }
        let start = step * self.step_size() + self.rank * self.batch_size;
        (start..start + self.batch_size)
            .map(|position| position % self.len)
            .collect()
    }

    /// Iterate over this rank's batches in step order
    pub fn iter(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        (0..self.num_batches()).map(move |step| self.batch(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let rank0 = ShardedSampler::new(8, 2, 0, 2).unwrap();
        let rank1 = ShardedSampler::new(8, 2, 1, 2).unwrap();

        assert_eq!(rank0.num_batches(), 2);
        assert_eq!(rank0.padding(), 0);
        assert_eq!(rank0.iter().collect::<Vec<_>>(), vec![vec![0, 1], vec![4, 5]]);
        assert_eq!(rank1.iter().collect::<Vec<_>>(), vec![vec![2, 3], vec![6, 7]]);
    }

    #[test]
    fn test_ragged_last_step_wraps() {
        let rank0 = ShardedSampler::new(7, 2, 0, 4).unwrap();
        let rank1 = ShardedSampler::new(7, 2, 1, 4).unwrap();

        assert_eq!(rank0.num_batches(), 1);
        assert_eq!(rank0.padding(), 1);
        assert_eq!(rank0.batch(0), vec![0, 1, 2, 3]);
        assert_eq!(rank1.batch(0), vec![4, 5, 6, 0]);
    }

    #[test]
    fn test_empty_split_has_no_batches() {
        let sampler = ShardedSampler::new(0, 4, 3, 8).unwrap();
        assert_eq!(sampler.num_batches(), 0);
        assert_eq!(sampler.iter().count(), 0);
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(ShardedSampler::new(10, 0, 0, 1).is_err());
        assert!(ShardedSampler::new(10, 2, 2, 1).is_err());
        assert!(ShardedSampler::new(10, 2, 0, 0).is_err());
    }
}
