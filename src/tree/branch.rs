//! Branch axes, choices, and descriptors.

use std::fmt;
use std::sync::Arc;

// ============================================================================
// BranchChoice / BranchAxis
// ============================================================================

/// One categorical option on a logic-tree axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchChoice {
    /// Short name used in serialized branch names and category reporting.
    pub name: String,
    /// A-priori weight of this choice. Must be non-negative.
    pub weight: f64,
}

impl BranchChoice {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        let name = name.into();
        debug_assert!(weight >= 0.0, "negative weight for choice {name}");
        Self { name, weight }
    }

    /// A choice with weight 1.0.
    pub fn unweighted(name: impl Into<String>) -> Self {
        Self::new(name, 1.0)
    }
}

/// One level of the logic tree: a named axis with its candidate choices.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchAxis {
    /// Axis name, reported as the category of sensitivity statistics.
    pub name: String,
    /// Candidate choices, in declaration order.
    pub choices: Vec<BranchChoice>,
}

impl BranchAxis {
    pub fn new(name: impl Into<String>, choices: Vec<BranchChoice>) -> Self {
        Self {
            name: name.into(),
            choices,
        }
    }

    /// Axis with equally weighted choices named by `names`.
    pub fn unweighted(name: impl Into<String>, names: &[&str]) -> Self {
        Self::new(
            name,
            names.iter().map(|n| BranchChoice::unweighted(*n)).collect(),
        )
    }
}

// ============================================================================
// BranchDescriptor
// ============================================================================

/// An immutable tuple of categorical choices, one per axis.
///
/// Descriptors from the same [`BranchSet`](crate::tree::BranchSet) share one
/// axis list; cloning a descriptor is cheap. All accessors are read-only, so
/// descriptors can be consumed concurrently from many worker threads.
#[derive(Debug, Clone)]
pub struct BranchDescriptor {
    axes: Arc<[BranchAxis]>,
    /// Per-axis index into `axes[i].choices`.
    choice_ids: Arc<[u32]>,
}

impl BranchDescriptor {
    pub(crate) fn new(axes: Arc<[BranchAxis]>, choice_ids: Vec<u32>) -> Self {
        debug_assert_eq!(axes.len(), choice_ids.len());
        Self {
            axes,
            choice_ids: choice_ids.into(),
        }
    }

    /// Number of axes. Identical for every descriptor in a run.
    #[inline]
    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// The shared axis list.
    #[inline]
    pub fn axes(&self) -> &[BranchAxis] {
        &self.axes
    }

    /// The chosen option on axis `axis`.
    #[inline]
    pub fn choice(&self, axis: usize) -> &BranchChoice {
        &self.axes[axis].choices[self.choice_ids[axis] as usize]
    }

    /// Name of the chosen option on axis `axis`.
    #[inline]
    pub fn choice_name(&self, axis: usize) -> &str {
        &self.choice(axis).name
    }

    /// Serialized branch name: choice names joined with `_`.
    ///
    /// This is the name the token filters of
    /// [`BranchSet`](crate::tree::BranchSet) match against.
    pub fn file_name(&self) -> String {
        let mut name = String::new();
        for axis in 0..self.axis_count() {
            if axis > 0 {
                name.push('_');
            }
            name.push_str(self.choice_name(axis));
        }
        name
    }

    /// A-priori branch weight: the product of per-choice weights.
    ///
    /// Weights are not normalized across a set; callers that need relative
    /// weights normalize over the branches they actually evaluate.
    pub fn weight(&self) -> f64 {
        (0..self.axis_count()).map(|a| self.choice(a).weight).product()
    }
}

impl fmt::Display for BranchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axes() -> Arc<[BranchAxis]> {
        vec![
            BranchAxis::new(
                "FaultModel",
                vec![
                    BranchChoice::new("FM3_1", 0.5),
                    BranchChoice::new("FM3_2", 0.5),
                ],
            ),
            BranchAxis::new(
                "ScalingRelation",
                vec![
                    BranchChoice::new("EllB", 0.6),
                    BranchChoice::new("HB08", 0.4),
                ],
            ),
        ]
        .into()
    }

    #[test]
    fn file_name_joins_choice_names() {
        let branch = BranchDescriptor::new(axes(), vec![0, 1]);
        assert_eq!(branch.file_name(), "FM3_1_HB08");
        assert_eq!(branch.to_string(), "FM3_1_HB08");
    }

    #[test]
    fn weight_is_product_of_choice_weights() {
        let branch = BranchDescriptor::new(axes(), vec![1, 0]);
        assert_eq!(branch.weight(), 0.5 * 0.6);
    }

    #[test]
    fn choice_accessors() {
        let branch = BranchDescriptor::new(axes(), vec![1, 1]);
        assert_eq!(branch.axis_count(), 2);
        assert_eq!(branch.choice_name(0), "FM3_2");
        assert_eq!(branch.choice(1).weight, 0.4);
    }
}
