//! Distributed branch-ensemble evaluation.
//!
//! This module provides the core pipeline of a run:
//!
//! - [`Accumulator`]: the mergeable statistic-collector contract
//! - [`BranchSensitivityCollector`]: the histogram-backed concrete collector
//! - [`assign_batch`]: deterministic task partitioning across ranks
//! - [`WorkerPool`]: intra-process parallel evaluation over a batch
//! - [`TaskCalculator`]: the per-process driver, including the cross-rank
//!   final assembly and the optional nested comparison sub-computation
//!
//! A run wires these together: every rank builds the same accumulator list
//! and the same [`BranchSet`](crate::tree::BranchSet), constructs a
//! `TaskCalculator` with its own rank, and calls
//! [`run`](TaskCalculator::run) against a shared
//! [`Transport`](crate::transport::Transport). Afterwards only the
//! coordinator's accumulators hold the merged, finalized result.

mod accumulator;
mod batch;
mod calculator;
mod collector;
mod pool;

pub use accumulator::{Accumulator, DecodeError, EncodeError};
pub use batch::assign_batch;
pub use calculator::{CalcError, CalcParams, CalcPhase, TaskCalculator};
pub use collector::{BranchSensitivityCollector, BranchWeighting, SensitivitySummary};
pub use pool::{BoxError, EvalError, Evaluator, PoolState, WorkerPool};
