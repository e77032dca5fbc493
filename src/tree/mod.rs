//! Logic-tree branch descriptors and branch sets.
//!
//! A logic tree is an ordered list of [`BranchAxis`] levels, each offering a
//! fixed set of weighted [`BranchChoice`] options. One concrete pick per axis
//! is a [`BranchDescriptor`]; the full combinatorial cross product (optionally
//! filtered or sub-sampled) is a [`BranchSet`].
//!
//! Branch sets are immutable after construction: every filter returns a new
//! set, and descriptors are shared read-only by many worker threads.

mod branch;
mod set;

pub use branch::{BranchAxis, BranchChoice, BranchDescriptor};
pub use set::{BranchSet, BranchSetError};
