//! Ordered, filterable collections of branch descriptors.

use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::{BranchAxis, BranchDescriptor};

/// Branch set construction/selection errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BranchSetError {
    #[error("sample size {requested} exceeds branch set size {available}")]
    SampleSizeExceedsSet { requested: usize, available: usize },
}

/// An ordered collection of [`BranchDescriptor`]s with O(1) access by task
/// index.
///
/// Built once from the full combinatorial cross product of an axis list.
/// Never mutated afterwards: filtering and sampling return new sets over the
/// same shared axes.
#[derive(Debug, Clone)]
pub struct BranchSet {
    axes: Arc<[BranchAxis]>,
    branches: Vec<BranchDescriptor>,
}

impl BranchSet {
    /// Enumerate the full cross product of `axes`.
    ///
    /// Branches are ordered with the last axis varying fastest. An axis with
    /// no choices yields an empty set.
    pub fn cross_product(axes: Vec<BranchAxis>) -> Self {
        let axes: Arc<[BranchAxis]> = axes.into();
        let total: usize = axes.iter().map(|a| a.choices.len()).product();
        let mut branches = Vec::with_capacity(total);

        let mut ids = vec![0u32; axes.len()];
        for _ in 0..total {
            branches.push(BranchDescriptor::new(Arc::clone(&axes), ids.clone()));
            // odometer increment, last axis fastest
            for axis in (0..axes.len()).rev() {
                ids[axis] += 1;
                if (ids[axis] as usize) < axes[axis].choices.len() {
                    break;
                }
                ids[axis] = 0;
            }
        }

        Self { axes, branches }
    }

    /// The shared axis list.
    #[inline]
    pub fn axes(&self) -> &[BranchAxis] {
        &self.axes
    }

    /// Number of branches (the global task count).
    #[inline]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// The branch at task index `index`.
    #[inline]
    pub fn get(&self, index: usize) -> &BranchDescriptor {
        &self.branches[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BranchDescriptor> {
        self.branches.iter()
    }

    /// Retain branches whose serialized name contains **every** token.
    pub fn filter_include(&self, tokens: &[&str]) -> Self {
        self.filtered(|name| tokens.iter().all(|t| name.contains(t)))
    }

    /// Drop branches whose serialized name contains **any** token.
    pub fn filter_exclude(&self, tokens: &[&str]) -> Self {
        self.filtered(|name| !tokens.iter().any(|t| name.contains(t)))
    }

    fn filtered(&self, keep: impl Fn(&str) -> bool) -> Self {
        let branches = self
            .branches
            .iter()
            .filter(|b| keep(&b.file_name()))
            .cloned()
            .collect();
        Self {
            axes: Arc::clone(&self.axes),
            branches,
        }
    }

    /// A random sample of `n` branches without replacement.
    ///
    /// Partial Fisher-Yates over the index space; the same seed always
    /// selects the same branches.
    pub fn random_sample(&self, n: usize, seed: u64) -> Result<Self, BranchSetError> {
        if n > self.len() {
            return Err(BranchSetError::SampleSizeExceedsSet {
                requested: n,
                available: self.len(),
            });
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..self.len()).collect();
        for i in 0..n {
            let j = rng.gen_range(i..indices.len());
            indices.swap(i, j);
        }
        indices.truncate(n);

        let branches = indices.iter().map(|&i| self.branches[i].clone()).collect();
        Ok(Self {
            axes: Arc::clone(&self.axes),
            branches,
        })
    }
}
