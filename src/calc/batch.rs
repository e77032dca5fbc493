//! Deterministic task partitioning across ranks.

use std::ops::Range;

use crate::transport::Rank;

/// The contiguous block of task indices owned by `rank`.
///
/// `num_tasks` is divided into `size` contiguous blocks; the remainder goes
/// to the earliest ranks, so block sizes differ by at most one. Every index
/// in `0..num_tasks` is owned by exactly one rank, and every rank computes
/// its block without communication.
///
/// # Panics
///
/// Panics if `size == 0` or `rank >= size`.
pub fn assign_batch(num_tasks: usize, size: usize, rank: Rank) -> Range<usize> {
    assert!(size > 0, "process group must have at least one rank");
    assert!(rank < size, "rank {rank} out of range for size {size}");

    let base = num_tasks / size;
    let remainder = num_tasks % size;
    let start = rank * base + rank.min(remainder);
    let len = base + usize::from(rank < remainder);
    start..start + len
}
