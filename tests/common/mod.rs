//! Shared fixtures for integration tests.
//!
//! Provides a small synthetic logic tree, a deterministic branch evaluator,
//! a minimal mergeable collector, and a helper that hosts a multi-rank run
//! on threads over an in-process channel mesh.

#![allow(dead_code)]

use std::any::Any;
use std::thread;

use logictree::calc::{DecodeError, EncodeError};
use logictree::{
    Accumulator, BranchAxis, BranchChoice, BranchDescriptor, BranchSet, CalcError,
    ChannelTransport, ProcessTopology, TaskCalculator,
};

// Re-export assertion helpers for convenience
#[allow(unused_imports)]
pub use logictree::testing::{assert_close, assert_slices_close, DEFAULT_TOLERANCE_F64};

// =============================================================================
// Fixture logic tree
// =============================================================================

/// Three-axis tree with 2 x 3 x 2 = 12 branches and non-uniform weights.
pub fn fixture_tree() -> BranchSet {
    BranchSet::cross_product(vec![
        BranchAxis::new(
            "FaultModel",
            vec![
                BranchChoice::new("FM3_1", 0.5),
                BranchChoice::new("FM3_2", 0.5),
            ],
        ),
        BranchAxis::new(
            "DeformationModel",
            vec![
                BranchChoice::new("GEOL", 0.3),
                BranchChoice::new("ZENG", 0.3),
                BranchChoice::new("NEOK", 0.4),
            ],
        ),
        BranchAxis::new(
            "ScalingRelation",
            vec![
                BranchChoice::new("EllB", 0.6),
                BranchChoice::new("HB08", 0.4),
            ],
        ),
    ])
}

/// Deterministic per-branch scalar: a base rate plus a contribution per
/// chosen option.
pub fn synthetic_rate(branch: &BranchDescriptor) -> f64 {
    let mut rate = 5.0;
    for axis in 0..branch.axis_count() {
        let position = branch.axes()[axis]
            .choices
            .iter()
            .position(|c| c.name == branch.choice_name(axis))
            .unwrap() as f64;
        rate += (axis as f64 + 1.0) * 0.25 * position;
    }
    rate
}

// =============================================================================
// MeanCollector
// =============================================================================

/// Minimal mergeable collector: a weighted running total with an optional
/// externally injected reference mean.
#[derive(Debug, Default)]
pub struct MeanCollector {
    pub count: u64,
    pub weighted_sum: f64,
    pub weight_sum: f64,
    /// External input consumed by `finalize` (set by comparison injection).
    pub reference: Option<f64>,
    /// Weighted mean, derived by `finalize`.
    pub mean: Option<f64>,
    /// `mean - reference`, derived by `finalize` when a reference is set.
    pub shift: Option<f64>,
}

impl Accumulator<f64> for MeanCollector {
    fn consume(&mut self, branch: &BranchDescriptor, result: &f64) {
        let weight = branch.weight();
        self.count += 1;
        self.weighted_sum += result * weight;
        self.weight_sum += weight;
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(postcard_encode((self.count, self.weighted_sum, self.weight_sum)))
    }

    fn merge_encoded(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        let (count, weighted_sum, weight_sum): (u64, f64, f64) =
            postcard::from_bytes(bytes).map_err(DecodeError::Decoding)?;
        self.count += count;
        self.weighted_sum += weighted_sum;
        self.weight_sum += weight_sum;
        Ok(())
    }

    fn finalize(&mut self) {
        if self.mean.is_some() {
            return;
        }
        let mean = self.weighted_sum / self.weight_sum;
        self.mean = Some(mean);
        self.shift = self.reference.map(|reference| mean - reference);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn postcard_encode<T: serde::Serialize>(value: T) -> Vec<u8> {
    postcard::to_allocvec(&value).expect("test payload encodes")
}

/// Downcast one accumulator slot to a concrete collector type.
pub fn downcast<A: 'static, R>(accumulators: &[Box<dyn Accumulator<R>>], slot: usize) -> &A {
    accumulators[slot]
        .as_any()
        .downcast_ref::<A>()
        .expect("unexpected collector type in slot")
}

// =============================================================================
// Multi-rank harness
// =============================================================================

/// Host a `size`-rank run on threads over an in-process mesh.
///
/// `make` builds each rank's calculator; the per-rank outcomes come back in
/// rank order, each carrying the calculator for inspection.
pub fn run_mesh<R, F>(size: usize, make: F) -> Vec<Result<TaskCalculator<R>, CalcError>>
where
    R: Send + 'static,
    F: Fn(ProcessTopology) -> TaskCalculator<R> + Send + Sync,
{
    let mut endpoints = ChannelTransport::mesh(size, 16);

    thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .drain(..)
            .enumerate()
            .map(|(rank, transport)| {
                let make = &make;
                scope.spawn(move || {
                    let mut calc = make(ProcessTopology::new(rank, size));
                    calc.run(&transport).map(|()| calc)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("rank thread panicked"))
            .collect()
    })
}
