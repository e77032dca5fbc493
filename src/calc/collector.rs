//! Histogram-backed branch sensitivity collector.

use std::any::Any;

use crate::stats::{SummaryRow, WeightedCategoryHistogram};
use crate::tree::BranchDescriptor;

use super::accumulator::{Accumulator, DecodeError, EncodeError};

/// How a consumed branch is weighted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BranchWeighting {
    /// Product of the branch's per-choice a-priori weights.
    #[default]
    APriori,
    /// Every branch weighs 1.0.
    Uniform,
}

/// Reportable statistics derived by [`BranchSensitivityCollector::finalize`].
#[derive(Debug, Clone)]
pub struct SensitivitySummary {
    /// Per (category, choice) statistics, first-seen category order.
    pub rows: Vec<SummaryRow>,
    /// Weighted mean over every observation.
    pub overall_mean: f64,
    /// Weighted standard deviation over every observation.
    pub overall_std_dev: f64,
}

/// Collects one scalar per evaluated branch into a
/// [`WeightedCategoryHistogram`], keyed by every axis of the branch.
///
/// For each consumed branch the caller-supplied closure extracts the scalar
/// (e.g. a total rupture rate), and the collector records it once per axis
/// under `(axis name, chosen option name)`. An optional extra-pairs hook adds
/// further `(category, choice)` labels for groupings that are not logic-tree
/// axes.
pub struct BranchSensitivityCollector<R> {
    hist: WeightedCategoryHistogram,
    value: Box<dyn Fn(&BranchDescriptor, &R) -> f64 + Send + Sync>,
    weighting: BranchWeighting,
    extra: Option<Box<dyn Fn(&BranchDescriptor, &R) -> Vec<(String, String)> + Send + Sync>>,
    summary: Option<SensitivitySummary>,
}

impl<R> BranchSensitivityCollector<R> {
    /// Collector over a-priori branch weights.
    pub fn new(
        label: impl Into<String>,
        value: impl Fn(&BranchDescriptor, &R) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            hist: WeightedCategoryHistogram::new(label),
            value: Box::new(value),
            weighting: BranchWeighting::APriori,
            extra: None,
            summary: None,
        }
    }

    pub fn with_weighting(mut self, weighting: BranchWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Register a hook contributing extra `(category, choice)` pairs per
    /// consumed branch.
    pub fn with_extra_pairs(
        mut self,
        extra: impl Fn(&BranchDescriptor, &R) -> Vec<(String, String)> + Send + Sync + 'static,
    ) -> Self {
        self.extra = Some(Box::new(extra));
        self
    }

    /// The underlying histogram (raw observations, available at any time).
    #[inline]
    pub fn histogram(&self) -> &WeightedCategoryHistogram {
        &self.hist
    }

    /// The derived summary; `None` until [`finalize`](Accumulator::finalize)
    /// has run.
    #[inline]
    pub fn summary(&self) -> Option<&SensitivitySummary> {
        self.summary.as_ref()
    }
}

impl<R: 'static> Accumulator<R> for BranchSensitivityCollector<R> {
    fn consume(&mut self, branch: &BranchDescriptor, result: &R) {
        let value = (self.value)(branch, result);
        let weight = match self.weighting {
            BranchWeighting::APriori => branch.weight(),
            BranchWeighting::Uniform => 1.0,
        };

        for axis in 0..branch.axis_count() {
            self.hist.add_observation(
                &branch.axes()[axis].name,
                branch.choice_name(axis),
                value,
                weight,
            );
        }
        if let Some(extra) = &self.extra {
            for (category, choice) in extra(branch, result) {
                self.hist.add_observation(&category, &choice, value, weight);
            }
        }
    }

    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(postcard::to_allocvec(&self.hist)?)
    }

    fn merge_encoded(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        let other: WeightedCategoryHistogram = postcard::from_bytes(bytes)?;
        if other.label() != self.hist.label() {
            return Err(DecodeError::Incompatible(format!(
                "label {:?} does not match {:?}",
                other.label(),
                self.hist.label()
            )));
        }
        self.hist.merge(other);
        Ok(())
    }

    fn finalize(&mut self) {
        if self.summary.is_some() {
            return;
        }
        self.summary = Some(SensitivitySummary {
            rows: self.hist.summary_rows(),
            overall_mean: self.hist.overall_weighted_mean(),
            overall_std_dev: self.hist.overall_weighted_std_dev(),
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
