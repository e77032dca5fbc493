//! logictree: distributed evaluation and aggregation over logic-tree branch
//! ensembles.
//!
//! A logic tree is a combinatorial space of modeling choices; each concrete
//! combination (a *branch*) yields an expensive derived result on which many
//! statistics are collected. This crate partitions the branch evaluations
//! across a fixed group of cooperating processes, parallelizes each process's
//! share over a thread pool, and deterministically merges every process's
//! partial statistics into one final result on the coordinator.
//!
//! # Key Types
//!
//! - [`BranchSet`] / [`BranchDescriptor`] - the branch ensemble and its
//!   individual configurations
//! - [`Accumulator`] - the mergeable statistic-collector contract
//! - [`WeightedCategoryHistogram`] / [`BranchSensitivityCollector`] - the
//!   weighted sensitivity statistics engine and its collector adapter
//! - [`TaskCalculator`] / [`CalcParams`] - the per-process driver
//! - [`Transport`] / [`ChannelTransport`] / [`SocketTransport`] - pluggable
//!   message passing for the final assembly
//!
//! # A Run
//!
//! Every rank builds the same [`BranchSet`] and a structurally identical
//! accumulator list, constructs a [`TaskCalculator`] with its own
//! [`ProcessTopology`], and calls [`TaskCalculator::run`] against a shared
//! transport. Afterwards only the coordinator's accumulators hold the merged,
//! finalized result.

// Re-export approx for callers comparing statistics in their own tests
pub use approx;

pub mod calc;
pub mod logger;
pub mod stats;
pub mod testing;
pub mod transport;
pub mod tree;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Branch ensembles
pub use tree::{BranchAxis, BranchChoice, BranchDescriptor, BranchSet, BranchSetError};

// Statistics
pub use stats::{HistogramError, SummaryRow, TornadoValue, WeightedCategoryHistogram};

// Evaluation and aggregation
pub use calc::{
    assign_batch, Accumulator, BranchSensitivityCollector, BranchWeighting, CalcError,
    CalcParams, CalcPhase, EvalError, SensitivitySummary, TaskCalculator, WorkerPool,
};

// Message passing
pub use transport::{
    ChannelTransport, Frame, ProcessTopology, Rank, SocketTransport, Transport, TransferError,
    COORDINATOR,
};

// Logging
pub use logger::{RankLogger, Verbosity};
