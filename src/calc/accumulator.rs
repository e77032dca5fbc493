//! The mergeable statistic-collector contract.

use std::any::Any;

use crate::tree::BranchDescriptor;

/// Errors encoding accumulator state for transfer.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),
}

/// Errors replaying a peer's accumulator state.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("decoding error: {0}")]
    Decoding(#[from] postcard::Error),

    /// The peer state decoded but does not belong to this accumulator
    /// (e.g. a different quantity label in the same slot).
    #[error("incompatible state: {0}")]
    Incompatible(String),
}

/// A statistic collector that consumes per-branch evaluation results and can
/// be merged across process boundaries.
///
/// # Contract
///
/// - `consume` is not thread-safe by itself; callers serialize calls per
///   accumulator (the [`WorkerPool`](crate::calc::WorkerPool) guards each
///   accumulator with its own lock).
/// - Merging is associative and commutative up to floating-point rounding:
///   state built from disjoint task sets, merged in any order, is
///   observationally equivalent to one accumulator consuming the union.
/// - `finalize` derives reportable quantities from raw state. It is
///   idempotent, and must not run before all merges are complete.
///
/// Merging across ranks is expressed over encoded bytes: the sending rank
/// [`encode`](Accumulator::encode)s its raw state, the coordinator replays it
/// with [`merge_encoded`](Accumulator::merge_encoded) and drops the bytes.
/// Received state is consumed exactly once; it is never shared.
pub trait Accumulator<R>: Send {
    /// Fold one branch evaluation result into this collector.
    fn consume(&mut self, branch: &BranchDescriptor, result: &R);

    /// Encode the raw (pre-finalize) state for transfer to the coordinator.
    fn encode(&self) -> Result<Vec<u8>, EncodeError>;

    /// Decode a peer's partial state and merge it into this one.
    fn merge_encoded(&mut self, bytes: &[u8]) -> Result<(), DecodeError>;

    /// Derive reportable quantities from raw state. Idempotent.
    fn finalize(&mut self);

    /// Downcast support: callers recover their concrete collector from the
    /// finalized accumulator list after a run.
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
