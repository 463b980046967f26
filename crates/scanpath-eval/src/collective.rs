//! Collective communication between evaluation workers
//!
//! Workers exchange JSON payloads at barriers. [`LocalCollective`] is the
//! single-process case; [`ThreadGroup`] runs N ranks as threads of one
//! process.

use crate::error::EvalError;
use serde_json::Value;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// A fixed group of ranks that can all-gather payloads
pub trait Collective {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Rank 0 accumulates results and writes output
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Exchange one payload per rank
    ///
    /// Blocks until every rank has contributed, then returns all payloads
    /// indexed by rank. `batch` only labels errors.
    fn all_gather(&self, batch: usize, payload: Value) -> Result<Vec<Value>, EvalError>;
}

/// Single-rank collective
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_gather(&self, _batch: usize, payload: Value) -> Result<Vec<Value>, EvalError> {
        Ok(vec![payload])
    }
}

#[derive(Debug)]
struct State {
    slots: Vec<Option<Value>>,
    arrived: usize,
    generation: u64,
    departed: usize,
    last: Arc<Vec<Value>>,
}

#[derive(Debug)]
struct Rendezvous {
    state: Mutex<State>,
    ready: Condvar,
}

/// Builder for a group of in-process ranks
pub struct ThreadGroup;

impl ThreadGroup {
    /// Create `world_size` connected ranks, one per worker thread
    pub fn new(world_size: usize) -> Vec<ThreadCollective> {
        let shared = Arc::new(Rendezvous {
            state: Mutex::new(State {
                slots: vec![None; world_size],
                arrived: 0,
                generation: 0,
                departed: 0,
                last: Arc::new(Vec::new()),
            }),
            ready: Condvar::new(),
        });

        (0..world_size)
            .map(|rank| ThreadCollective {
                rank,
                world_size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

/// One rank of a [`ThreadGroup`]
///
/// Dropping a rank marks it as departed; peers blocked in, or later entering,
/// a gather fail instead of waiting forever.
#[derive(Debug)]
pub struct ThreadCollective {
    rank: usize,
    world_size: usize,
    shared: Arc<Rendezvous>,
}

impl ThreadCollective {
    fn lock(&self, batch: usize) -> Result<MutexGuard<'_, State>, EvalError> {
        self.shared.state.lock().map_err(|_| EvalError::Gather {
            batch,
            message: "worker group state poisoned".to_string(),
        })
    }
}

fn peer_departed(batch: usize) -> EvalError {
    EvalError::Gather {
        batch,
        message: "a peer worker stopped before the gather completed".to_string(),
    }
}

impl Collective for ThreadCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_gather(&self, batch: usize, payload: Value) -> Result<Vec<Value>, EvalError> {
        let mut state = self.lock(batch)?;
        if state.departed > 0 {
            return Err(peer_departed(batch));
        }

        state.slots[self.rank] = Some(payload);
        state.arrived += 1;

        if state.arrived == self.world_size {
            let values: Vec<Value> = state.slots.iter_mut().filter_map(Option::take).collect();
            state.last = Arc::new(values);
            state.arrived = 0;
            state.generation += 1;
            self.shared.ready.notify_all();
            return Ok(state.last.to_vec());
        }

        // The last arriver cannot complete the next generation until this
        // rank contributes again, so `last` is stable once generation moves.
        let generation = state.generation;
        loop {
            state = self
                .shared
                .ready
                .wait(state)
                .map_err(|_| EvalError::Gather {
                    batch,
                    message: "worker group state poisoned".to_string(),
                })?;
            if state.generation != generation {
                return Ok(state.last.to_vec());
            }
            if state.departed > 0 {
                return Err(peer_departed(batch));
            }
        }
    }
}

impl Drop for ThreadCollective {
    fn drop(&mut self) {
        let mut state = match self.shared.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.departed += 1;
        self.shared.ready.notify_all();
    }
}
