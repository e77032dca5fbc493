//! Intra-process parallel evaluation over a batch of task indices.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::tree::{BranchDescriptor, BranchSet};

use super::accumulator::Accumulator;

/// Error type branch-evaluation functions return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The caller-supplied branch-evaluation function. Opaque to the core and
/// possibly arbitrarily expensive.
pub type Evaluator<R> = dyn Fn(&BranchDescriptor) -> Result<R, BoxError> + Send + Sync;

/// A failed branch evaluation. Fatal to the run; accumulator state from
/// results applied before the failure is retained.
#[derive(Debug, thiserror::Error)]
#[error("evaluation of branch {index} ({branch}) failed: {source}")]
pub struct EvalError {
    /// Task index of the failed branch.
    pub index: usize,
    /// Serialized branch name.
    pub branch: String,
    #[source]
    pub source: BoxError,
}

/// Pool lifecycle. A pool runs one batch and is then spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Running,
    Completed,
    Failed,
}

// ============================================================================
// WorkerPool
// ============================================================================

/// Evaluates a batch of branches on a fixed-size thread pool and feeds every
/// result to every accumulator.
///
/// Each accumulator slot is guarded by its own lock, and the order in which a
/// worker applies one result to the slots is shuffled per task. With many
/// accumulators this spreads the serialized `consume` cost evenly instead of
/// piling contention onto the first slot.
///
/// # Failure policy
///
/// On the first evaluation error the pool stops admitting new tasks, lets
/// already-started tasks finish, and surfaces that first error. Consumption
/// already applied to accumulators is **not** rolled back: after a failure
/// the accumulators reflect exactly the tasks that completed.
#[derive(Debug)]
pub struct WorkerPool {
    n_threads: usize,
    seed: u64,
    state: PoolState,
}

impl WorkerPool {
    /// `n_threads == 0` uses all available cores.
    pub fn new(n_threads: usize) -> Self {
        Self::with_seed(n_threads, 42)
    }

    /// Pool with an explicit shuffle seed. The seed only decorrelates the
    /// per-task slot orders; results do not depend on it.
    pub fn with_seed(n_threads: usize, seed: u64) -> Self {
        Self {
            n_threads,
            seed,
            state: PoolState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Evaluate every task in `batch` and apply each result to every slot in
    /// `accumulators`. Returns the number of tasks that completed.
    ///
    /// # Panics
    ///
    /// Panics if the pool already ran.
    pub fn run<R: Send>(
        &mut self,
        batch: &[usize],
        branches: &BranchSet,
        evaluator: &Evaluator<R>,
        accumulators: &[Mutex<Box<dyn Accumulator<R>>>],
    ) -> Result<usize, EvalError> {
        assert_eq!(self.state, PoolState::Idle, "worker pool already ran");
        self.state = PoolState::Running;

        let abort = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);
        let failure: Mutex<Option<EvalError>> = Mutex::new(None);
        let seed = self.seed;

        with_thread_pool(self.n_threads, || {
            batch.par_iter().for_each(|&index| {
                if abort.load(Ordering::Relaxed) {
                    return;
                }
                let branch = branches.get(index);
                match evaluator(branch) {
                    Ok(result) => {
                        apply_shuffled(seed, index, branch, &result, accumulators);
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(source) => {
                        abort.store(true, Ordering::Relaxed);
                        let mut first = failure.lock().expect("failure mutex poisoned");
                        if first.is_none() {
                            *first = Some(EvalError {
                                index,
                                branch: branch.file_name(),
                                source,
                            });
                        }
                    }
                }
            });
        });

        match failure.into_inner().expect("failure mutex poisoned") {
            Some(error) => {
                self.state = PoolState::Failed;
                Err(error)
            }
            None => {
                self.state = PoolState::Completed;
                Ok(completed.into_inner())
            }
        }
    }
}

/// Apply one result to every slot, in a per-task shuffled order.
fn apply_shuffled<R>(
    seed: u64,
    index: usize,
    branch: &BranchDescriptor,
    result: &R,
    accumulators: &[Mutex<Box<dyn Accumulator<R>>>],
) {
    // seeded per task so the order does not depend on thread scheduling
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(index as u64));
    let mut order: Vec<usize> = (0..accumulators.len()).collect();
    order.shuffle(&mut rng);

    for slot in order {
        let mut accumulator = accumulators[slot].lock().expect("accumulator mutex poisoned");
        accumulator.consume(branch, result);
    }
}

/// Run `op` on a pool of exactly `n_threads` workers (0 = the global pool).
fn with_thread_pool<T: Send>(n_threads: usize, op: impl FnOnce() -> T + Send) -> T {
    match n_threads {
        0 => op(),
        n => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .expect("Failed to create thread pool")
            .install(op),
    }
}
