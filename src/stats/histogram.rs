//! The weighted category histogram.
//!
//! # Storage Model
//!
//! Every `(category, choice)` key owns two parallel lists of equal length:
//! the observed values and their weights. Categories are additionally tracked
//! in first-seen order so reports are stable across runs; choices within a
//! category are kept sorted by name.
//!
//! # Statistics
//!
//! All weighted statistics are computed over **finite values only**;
//! non-finite values stay in storage but never contribute. A selection with
//! zero finite observations (or zero total weight) yields `NaN`, which is
//! propagated to the caller rather than masked — check with `is_nan()`.
//!
//! "Without choice X" statistics recompute over the union of all other
//! choices in the category. They are never derived by subtracting X's
//! contribution, so unequal per-choice sample counts are handled correctly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category/choice selection errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HistogramError {
    #[error("unknown category {category:?}")]
    UnknownCategory { category: String },

    #[error("unknown choice {choice:?} in category {category:?}")]
    UnknownChoice { category: String, choice: String },
}

/// Parallel value/weight lists for one `(category, choice)` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Samples {
    values: Vec<f64>,
    weights: Vec<f64>,
}

/// One row of [`WeightedCategoryHistogram::summary_rows`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub category: String,
    pub choice: String,
    pub mean: f64,
    pub std_dev: f64,
    pub mean_without: f64,
    pub std_dev_without: f64,
}

/// A per-choice sensitivity value, tagged by its `(category, choice)` key.
#[derive(Debug, Clone, PartialEq)]
pub struct TornadoValue {
    pub category: String,
    pub choice: String,
    pub value: f64,
}

// ============================================================================
// WeightedCategoryHistogram
// ============================================================================

/// Weighted `(value, weight)` observations keyed by `(category, choice)`.
///
/// Merging two histograms built from disjoint observation sets is equivalent
/// to one histogram consuming their union, in any order (element-wise list
/// concatenation per key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedCategoryHistogram {
    /// What the observed value measures, e.g. `"Total Rate"`. Carried into
    /// reports and checked on merge.
    label: String,
    /// category -> choice -> samples. BTreeMap keeps choices name-sorted.
    cells: BTreeMap<String, BTreeMap<String, Samples>>,
    /// Categories in first-seen order.
    category_order: Vec<String>,
}

impl WeightedCategoryHistogram {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cells: BTreeMap::new(),
            category_order: Vec::new(),
        }
    }

    /// The quantity label given at construction.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Total number of stored observations across all keys.
    pub fn num_observations(&self) -> usize {
        self.cells
            .values()
            .flat_map(|choices| choices.values())
            .map(|s| s.values.len())
            .sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_observations() == 0
    }

    /// Categories in the order they were first observed.
    #[inline]
    pub fn categories(&self) -> &[String] {
        &self.category_order
    }

    /// Choice names registered under `category`, sorted by name.
    pub fn choices(&self, category: &str) -> Result<Vec<&str>, HistogramError> {
        Ok(self.category_cells(category)?.keys().map(String::as_str).collect())
    }

    /// Append one observation. The category is registered in first-seen order
    /// on first use.
    pub fn add_observation(&mut self, category: &str, choice: &str, value: f64, weight: f64) {
        debug_assert!(weight >= 0.0, "negative weight for {category}/{choice}");
        if !self.cells.contains_key(category) {
            self.category_order.push(category.to_owned());
        }
        let samples = self
            .cells
            .entry(category.to_owned())
            .or_default()
            .entry(choice.to_owned())
            .or_default();
        samples.values.push(value);
        samples.weights.push(weight);
    }

    /// Merge `other` into `self` by replaying its observations per key.
    ///
    /// Associative and commutative up to floating-point rounding. Merging an
    /// empty histogram leaves `self` statistically unchanged.
    pub fn merge(&mut self, other: WeightedCategoryHistogram) {
        for category in &other.category_order {
            for (choice, samples) in &other.cells[category] {
                for (&value, &weight) in samples.values.iter().zip(&samples.weights) {
                    self.add_observation(category, choice, value, weight);
                }
            }
        }
    }

    fn category_cells(
        &self,
        category: &str,
    ) -> Result<&BTreeMap<String, Samples>, HistogramError> {
        self.cells.get(category).ok_or_else(|| HistogramError::UnknownCategory {
            category: category.to_owned(),
        })
    }

    /// Resolve a choice selection: empty means every choice of the category.
    fn selected(
        &self,
        category: &str,
        choices: &[&str],
    ) -> Result<Vec<&Samples>, HistogramError> {
        let cells = self.category_cells(category)?;
        if choices.is_empty() {
            return Ok(cells.values().collect());
        }
        choices
            .iter()
            .map(|&choice| {
                cells.get(choice).ok_or_else(|| HistogramError::UnknownChoice {
                    category: category.to_owned(),
                    choice: choice.to_owned(),
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Weighted statistics
    // ------------------------------------------------------------------

    /// Weighted mean over the selected choices of `category`.
    ///
    /// An empty `choices` slice selects every registered choice. For a
    /// non-empty finite selection the result always lies within the min/max
    /// of the contributing values.
    pub fn weighted_mean(&self, category: &str, choices: &[&str]) -> Result<f64, HistogramError> {
        Ok(mean_of(&self.selected(category, choices)?))
    }

    /// Weighted standard deviation over the selected choices, using the
    /// weighted mean computed over the same selection.
    pub fn weighted_std_dev(
        &self,
        category: &str,
        choices: &[&str],
    ) -> Result<f64, HistogramError> {
        let selection = self.selected(category, choices)?;
        Ok(std_dev_of(&selection, mean_of(&selection)))
    }

    /// Weighted mean over every choice of `category` except `choice`.
    ///
    /// If `category` has no other choice the selection is empty and the
    /// result is `NaN`.
    pub fn weighted_mean_without(
        &self,
        category: &str,
        choice: &str,
    ) -> Result<f64, HistogramError> {
        let others = self.choices_without(category, choice)?;
        let refs: Vec<&str> = others.iter().map(|c| c.as_str()).collect();
        if refs.is_empty() {
            return Ok(f64::NAN);
        }
        self.weighted_mean(category, &refs)
    }

    /// Weighted standard deviation over every choice of `category` except
    /// `choice`.
    pub fn weighted_std_dev_without(
        &self,
        category: &str,
        choice: &str,
    ) -> Result<f64, HistogramError> {
        let others = self.choices_without(category, choice)?;
        let refs: Vec<&str> = others.iter().map(|c| c.as_str()).collect();
        if refs.is_empty() {
            return Ok(f64::NAN);
        }
        self.weighted_std_dev(category, &refs)
    }

    fn choices_without(
        &self,
        category: &str,
        choice: &str,
    ) -> Result<Vec<String>, HistogramError> {
        let cells = self.category_cells(category)?;
        Ok(cells.keys().filter(|c| *c != choice).cloned().collect())
    }

    /// Weighted mean over every stored observation, regardless of key.
    pub fn overall_weighted_mean(&self) -> f64 {
        mean_of(&self.all_samples())
    }

    /// Weighted standard deviation over every stored observation.
    pub fn overall_weighted_std_dev(&self) -> f64 {
        let all = self.all_samples();
        std_dev_of(&all, mean_of(&all))
    }

    fn all_samples(&self) -> Vec<&Samples> {
        self.cells.values().flat_map(|choices| choices.values()).collect()
    }

    // ------------------------------------------------------------------
    // Tornado values
    // ------------------------------------------------------------------

    /// Per-choice sensitivity values for every category with more than one
    /// choice, in first-seen category order.
    ///
    /// With `use_mean_shift` each value is
    /// `overall mean - mean without the choice`; otherwise it is the choice's
    /// own weighted mean. Single-choice categories carry no sensitivity and
    /// are skipped.
    pub fn tornado_values(&self, use_mean_shift: bool) -> Vec<TornadoValue> {
        let overall = self.overall_weighted_mean();
        let mut out = Vec::new();

        for category in &self.category_order {
            let cells = &self.cells[category];
            if cells.len() <= 1 {
                continue;
            }
            for choice in cells.keys() {
                let value = if use_mean_shift {
                    // unwrap-free: category and choice come from our own keys
                    let without = self
                        .weighted_mean_without(category, choice)
                        .unwrap_or(f64::NAN);
                    overall - without
                } else {
                    self.weighted_mean(category, &[choice]).unwrap_or(f64::NAN)
                };
                out.push(TornadoValue {
                    category: category.clone(),
                    choice: choice.clone(),
                    value,
                });
            }
        }

        out
    }

    // ------------------------------------------------------------------
    // Ranges and binning
    // ------------------------------------------------------------------

    /// `(min, max)` over every stored finite value, or `None` if there is no
    /// finite value.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for samples in self.all_samples() {
            for &value in &samples.values {
                if !value.is_finite() {
                    continue;
                }
                range = Some(match range {
                    None => (value, value),
                    Some((min, max)) => (min.min(value), max.max(value)),
                });
            }
        }
        range
    }

    /// A delta-aligned `(min, max)` bin-center range that exactly covers the
    /// data range for bins of width `delta`.
    ///
    /// Bin count follows as `(max - min) / delta + 1`.
    pub fn snapped_range(&self, delta: f64) -> Option<(f64, f64)> {
        let (data_min, data_max) = self.value_range()?;
        let mut min = (data_min / delta).floor() * delta;
        // the bin above may still hold the data minimum given the bin width
        if min + 0.5 * delta < data_min {
            min += delta;
        }
        let mut max = min;
        while max + 0.5 * delta < data_max {
            max += delta;
        }
        Some((min, max))
    }

    /// Weight accumulated per bin for one `(category, choice)` key.
    ///
    /// Bins are centered at `min + i * delta` for `i in 0..bins`. Values
    /// outside the range are counted in the first/last bin; non-finite values
    /// are skipped.
    pub fn binned_weights(
        &self,
        category: &str,
        choice: &str,
        min: f64,
        bins: usize,
        delta: f64,
    ) -> Result<Vec<f64>, HistogramError> {
        let cells = self.category_cells(category)?;
        let samples = cells.get(choice).ok_or_else(|| HistogramError::UnknownChoice {
            category: category.to_owned(),
            choice: choice.to_owned(),
        })?;

        let mut out = vec![0.0; bins];
        for (&value, &weight) in samples.values.iter().zip(&samples.weights) {
            if !value.is_finite() || bins == 0 {
                continue;
            }
            let index = ((value - min) / delta).round();
            let index = if index < 0.0 {
                0
            } else {
                (index as usize).min(bins - 1)
            };
            out[index] += weight;
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Summary
    // ------------------------------------------------------------------

    /// Per-choice statistics for every key, in first-seen category order with
    /// choices sorted by name.
    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        let mut rows = Vec::new();
        for category in &self.category_order {
            for choice in self.cells[category].keys() {
                rows.push(SummaryRow {
                    category: category.clone(),
                    choice: choice.clone(),
                    mean: self.weighted_mean(category, &[choice]).unwrap_or(f64::NAN),
                    std_dev: self
                        .weighted_std_dev(category, &[choice])
                        .unwrap_or(f64::NAN),
                    mean_without: self
                        .weighted_mean_without(category, choice)
                        .unwrap_or(f64::NAN),
                    std_dev_without: self
                        .weighted_std_dev_without(category, choice)
                        .unwrap_or(f64::NAN),
                });
            }
        }
        rows
    }
}

// ============================================================================
// Weighted kernels
// ============================================================================

/// Weighted mean over the finite values of `samples`. `NaN` when the
/// selection holds no finite value or no weight.
fn mean_of(samples: &[&Samples]) -> f64 {
    let mut weight_sum = 0.0;
    let mut weighted_sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for s in samples {
        for (&value, &weight) in s.values.iter().zip(&s.weights) {
            if !value.is_finite() {
                continue;
            }
            weight_sum += weight;
            weighted_sum += value * weight;
            min = min.min(value);
            max = max.max(value);
        }
    }

    let mean = weighted_sum / weight_sum;
    if mean.is_finite() {
        debug_assert!(
            mean >= min && mean <= max,
            "weighted mean {mean} outside value range [{min}, {max}]"
        );
    }
    mean
}

/// Weighted standard deviation around `mean` over the finite values.
fn std_dev_of(samples: &[&Samples], mean: f64) -> f64 {
    let mut weight_sum = 0.0;
    let mut var = 0.0;

    for s in samples {
        for (&value, &weight) in s.values.iter().zip(&s.weights) {
            if !value.is_finite() {
                continue;
            }
            weight_sum += weight;
            var += (value - mean) * (value - mean) * weight;
        }
    }

    (var / weight_sum).sqrt()
}
