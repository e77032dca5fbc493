//! Weighted categorical statistics.
//!
//! [`WeightedCategoryHistogram`] collects `(value, weight)` observations keyed
//! by `(category, choice)` and derives the weighted summary statistics used
//! for branch sensitivity analysis: per-choice means and standard deviations,
//! leave-one-choice-out variants, overall statistics, and tornado values.

mod histogram;

pub use histogram::{
    HistogramError, SummaryRow, TornadoValue, WeightedCategoryHistogram,
};
