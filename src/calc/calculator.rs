//! The per-process driver for a distributed run.
//!
//! Every cooperating process constructs one [`TaskCalculator`] over the same
//! branch set and a structurally identical accumulator list, then calls
//! [`run`](TaskCalculator::run). The driver walks a fixed phase sequence:
//!
//! ```text
//! Init -> BatchAssign -> Compute -> FinalAssembly -> Done
//! ```
//!
//! `BatchAssign` derives this rank's task block without communication;
//! `Compute` drives the [`WorkerPool`] over it; `FinalAssembly` streams every
//! worker rank's accumulator state to the coordinator, which merges each
//! payload into its own slot and drops it immediately — peak memory stays at
//! one extra accumulator, not one per rank. A rank that completed zero tasks
//! sends skip markers so empty state is never merged. After the last merge
//! the coordinator finalizes every accumulator in slot order and broadcasts
//! completion.
//!
//! # Comparison sub-computation
//!
//! A driver may own one nested driver computing a reference statistic over a
//! different branch set (typically with a single accumulator). The nested
//! driver runs its own full cycle between `Compute` and the primary
//! `FinalAssembly`; on the coordinator its finalized result is handed to an
//! injection closure right before the primary accumulators finalize. Worker
//! ranks' nested results are discarded.
//!
//! # Failure semantics
//!
//! Any evaluation or transfer error is fatal to the whole run: the error is
//! surfaced verbatim and nothing is retried. Accumulator state consumed
//! before an evaluation failure is retained.

use std::sync::Mutex;

use crate::logger::{RankLogger, Verbosity};
use crate::transport::{Frame, ProcessTopology, Rank, Transport, TransferError, COORDINATOR};
use crate::tree::{BranchDescriptor, BranchSet};

use super::accumulator::{Accumulator, DecodeError, EncodeError};
use super::batch::assign_batch;
use super::pool::{BoxError, EvalError, Evaluator, WorkerPool};

/// Driver-level errors. All fatal; the original cause is surfaced, never
/// wrapped in a generic failure code.
#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    /// The accumulator lists of two ranks disagree. Detected lazily as a
    /// slot-count mismatch during transfer.
    #[error("accumulator list mismatch: rank {rank} sent {got} slot(s), coordinator holds {expected}")]
    Configuration { rank: Rank, expected: usize, got: usize },

    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("failed to encode accumulator state: {0}")]
    Encode(#[from] EncodeError),

    #[error("failed to merge accumulator state from rank {rank}: {source}")]
    Merge {
        rank: Rank,
        #[source]
        source: DecodeError,
    },

    /// A peer sent a well-formed frame of the wrong kind for the protocol
    /// position.
    #[error("protocol violation from rank {rank}: {detail}")]
    Protocol { rank: Rank, detail: String },
}

/// Driver parameters.
#[derive(Debug, Clone)]
pub struct CalcParams {
    /// Worker threads per process. `0` uses all available cores.
    pub n_threads: usize,
    /// Seed for the per-task accumulator-order shuffles.
    pub seed: u64,
    /// Progress output level.
    pub verbosity: Verbosity,
}

impl Default for CalcParams {
    fn default() -> Self {
        Self {
            n_threads: 0,
            seed: 42,
            verbosity: Verbosity::default(),
        }
    }
}

/// Driver lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcPhase {
    Init,
    BatchAssign,
    Compute,
    FinalAssembly,
    Done,
}

// ============================================================================
// TaskCalculator
// ============================================================================

/// Per-process driver: owns this rank's branch slice, accumulators, and the
/// optional nested comparison driver.
pub struct TaskCalculator<R> {
    params: CalcParams,
    topology: ProcessTopology,
    branches: BranchSet,
    evaluator: Box<Evaluator<R>>,
    accumulators: Vec<Box<dyn Accumulator<R>>>,
    comparison: Option<Box<dyn ComparisonDriver<R>>>,
    phase: CalcPhase,
    completed_tasks: usize,
    logger: RankLogger,
}

impl<R> std::fmt::Debug for TaskCalculator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCalculator")
            .field("phase", &self.phase)
            .field("completed_tasks", &self.completed_tasks)
            .finish_non_exhaustive()
    }
}

impl<R: Send + 'static> TaskCalculator<R> {
    /// # Panics
    ///
    /// Panics if `accumulators` is empty — a run without collectors computes
    /// nothing.
    pub fn new(
        branches: BranchSet,
        evaluator: impl Fn(&BranchDescriptor) -> Result<R, BoxError> + Send + Sync + 'static,
        accumulators: Vec<Box<dyn Accumulator<R>>>,
        topology: ProcessTopology,
        params: CalcParams,
    ) -> Self {
        assert!(!accumulators.is_empty(), "no accumulators registered");
        let logger = RankLogger::new(topology.rank(), params.verbosity);
        Self {
            params,
            topology,
            branches,
            evaluator: Box::new(evaluator),
            accumulators,
            comparison: None,
            phase: CalcPhase::Init,
            completed_tasks: 0,
            logger,
        }
    }

    /// Attach a nested comparison driver.
    ///
    /// `nested` runs its full cycle to `Done` before this driver finalizes;
    /// on the coordinator, `inject` then receives the primary accumulator
    /// list and the nested driver's finalized accumulators.
    pub fn with_comparison<R2: Send + 'static>(
        mut self,
        nested: TaskCalculator<R2>,
        inject: impl FnOnce(&mut [Box<dyn Accumulator<R>>], &[Box<dyn Accumulator<R2>>])
            + Send
            + 'static,
    ) -> Self {
        self.comparison = Some(Box::new(NestedComparison {
            calc: nested,
            inject: Some(Box::new(inject)),
        }));
        self
    }

    #[inline]
    pub fn phase(&self) -> CalcPhase {
        self.phase
    }

    #[inline]
    pub fn topology(&self) -> ProcessTopology {
        self.topology
    }

    /// Tasks this rank completed. Meaningful after `Compute`.
    #[inline]
    pub fn completed_tasks(&self) -> usize {
        self.completed_tasks
    }

    /// The accumulator list. Only the coordinator's accumulators hold the
    /// merged, finalized result after a run; worker ranks' state is
    /// logically consumed by the transfer.
    #[inline]
    pub fn accumulators(&self) -> &[Box<dyn Accumulator<R>>] {
        &self.accumulators
    }

    /// Consume the driver, returning its accumulators.
    ///
    /// # Panics
    ///
    /// Panics unless the driver reached `Done`.
    pub fn into_accumulators(self) -> Vec<Box<dyn Accumulator<R>>> {
        assert_eq!(self.phase, CalcPhase::Done, "run the calculator first");
        self.accumulators
    }

    /// Execute the full phase sequence over `transport`.
    ///
    /// # Panics
    ///
    /// Panics if the driver already ran.
    pub fn run(&mut self, transport: &dyn Transport) -> Result<(), CalcError> {
        assert_eq!(self.phase, CalcPhase::Init, "calculator already ran");

        // BatchAssign: every rank derives its block independently.
        self.phase = CalcPhase::BatchAssign;
        let batch: Vec<usize> =
            assign_batch(self.branches.len(), self.topology.size(), self.topology.rank())
                .collect();

        // Compute
        self.phase = CalcPhase::Compute;
        self.logger.info(&format!(
            "evaluating {} of {} branches across {} accumulator(s)",
            batch.len(),
            self.branches.len(),
            self.accumulators.len()
        ));
        if !batch.is_empty() {
            self.compute(&batch)?;
        }
        self.logger.debug(&format!("completed {} task(s)", self.completed_tasks));

        // Nested comparison runs its entire cycle before primary assembly.
        if let Some(comparison) = self.comparison.as_mut() {
            self.logger.debug("running comparison sub-computation");
            comparison.run(transport)?;
        }

        // FinalAssembly
        self.phase = CalcPhase::FinalAssembly;
        if self.topology.is_coordinator() {
            self.assemble(transport)?;
        } else {
            self.send_partials(transport)?;
        }

        self.phase = CalcPhase::Done;
        self.logger.debug("done");
        Ok(())
    }

    /// Drive the worker pool over this rank's batch.
    fn compute(&mut self, batch: &[usize]) -> Result<(), CalcError> {
        let slots: Vec<Mutex<Box<dyn Accumulator<R>>>> =
            self.accumulators.drain(..).map(Mutex::new).collect();

        let mut pool = WorkerPool::with_seed(self.params.n_threads, self.params.seed);
        let outcome = pool.run(batch, &self.branches, &*self.evaluator, &slots);

        // restore ownership before surfacing any error so partial state
        // stays observable
        self.accumulators = slots
            .into_iter()
            .map(|slot| slot.into_inner().expect("accumulator mutex poisoned"))
            .collect();

        self.completed_tasks += outcome?;
        Ok(())
    }

    /// Coordinator side of FinalAssembly: gather and merge worker state in
    /// increasing rank order, inject the nested comparison result, finalize
    /// every accumulator in slot order, broadcast completion.
    fn assemble(&mut self, transport: &dyn Transport) -> Result<(), CalcError> {
        self.gather(transport)?;

        if let Some(mut comparison) = self.comparison.take() {
            self.logger.debug("injecting comparison result");
            comparison.inject(&mut self.accumulators);
        }

        for accumulator in &mut self.accumulators {
            accumulator.finalize();
        }

        for rank in 1..self.topology.size() {
            transport.send(rank, Frame::Complete)?;
        }
        Ok(())
    }

    /// Receive every worker rank's slots, merging each payload into our own
    /// slot and dropping it before the next arrives.
    fn gather(&mut self, transport: &dyn Transport) -> Result<(), CalcError> {
        let expected = self.accumulators.len();

        for source in 1..self.topology.size() {
            self.logger.debug(&format!("receiving accumulators from rank {source}"));

            let got = match transport.recv(source)? {
                Frame::Header { slots } => slots as usize,
                other => {
                    return Err(CalcError::Protocol {
                        rank: source,
                        detail: format!("expected header frame, got {other:?}"),
                    })
                }
            };
            if got != expected {
                return Err(CalcError::Configuration { rank: source, expected, got });
            }

            for slot in 0..expected {
                match transport.recv(source)? {
                    Frame::Slot { payload: Some(bytes) } => {
                        self.accumulators[slot]
                            .merge_encoded(&bytes)
                            .map_err(|source_err| CalcError::Merge {
                                rank: source,
                                source: source_err,
                            })?;
                        // bytes dropped here: the received partial is
                        // consumed exactly once
                    }
                    Frame::Slot { payload: None } => {
                        self.logger.debug(&format!("rank {source} skipped slot {slot}"));
                    }
                    other => {
                        return Err(CalcError::Protocol {
                            rank: source,
                            detail: format!("expected slot frame, got {other:?}"),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Worker side of FinalAssembly: stream state, await completion.
    fn send_partials(&mut self, transport: &dyn Transport) -> Result<(), CalcError> {
        transport.send(
            COORDINATOR,
            Frame::Header { slots: self.accumulators.len() as u32 },
        )?;

        for accumulator in &self.accumulators {
            let payload = if self.completed_tasks == 0 {
                None
            } else {
                Some(accumulator.encode()?)
            };
            transport.send(COORDINATOR, Frame::Slot { payload })?;
        }

        // block until the coordinator confirms the run is complete
        match transport.recv(COORDINATOR)? {
            Frame::Complete => Ok(()),
            other => Err(CalcError::Protocol {
                rank: COORDINATOR,
                detail: format!("expected completion frame, got {other:?}"),
            }),
        }
    }
}

// ============================================================================
// Nested comparison
// ============================================================================

/// Object-safe wrapper so a driver can own a nested driver with a different
/// result type.
trait ComparisonDriver<R>: Send {
    fn run(&mut self, transport: &dyn Transport) -> Result<(), CalcError>;
    fn inject(&mut self, primary: &mut [Box<dyn Accumulator<R>>]);
}

struct NestedComparison<R, R2> {
    calc: TaskCalculator<R2>,
    inject: Option<
        Box<dyn FnOnce(&mut [Box<dyn Accumulator<R>>], &[Box<dyn Accumulator<R2>>]) + Send>,
    >,
}

impl<R, R2: Send + 'static> ComparisonDriver<R> for NestedComparison<R, R2> {
    fn run(&mut self, transport: &dyn Transport) -> Result<(), CalcError> {
        self.calc.run(transport)
    }

    fn inject(&mut self, primary: &mut [Box<dyn Accumulator<R>>]) {
        if let Some(inject) = self.inject.take() {
            inject(primary, self.calc.accumulators());
        }
    }
}
