//! Weighted sensitivity statistics, exercised through the public API.

mod common;

use common::{assert_close, fixture_tree, synthetic_rate};
use logictree::{BranchSensitivityCollector, Accumulator, WeightedCategoryHistogram};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

const TOL: f64 = 1e-12;

#[test]
fn scaling_relation_scenario() {
    // ScalingRelation with choices A (values [1,2]) and B (values [3,4]),
    // all weights 1
    let mut hist = WeightedCategoryHistogram::new("Total Rate");
    hist.add_observation("ScalingRelation", "A", 1.0, 1.0);
    hist.add_observation("ScalingRelation", "A", 2.0, 1.0);
    hist.add_observation("ScalingRelation", "B", 3.0, 1.0);
    hist.add_observation("ScalingRelation", "B", 4.0, 1.0);

    assert_close(hist.weighted_mean("ScalingRelation", &["A"]).unwrap(), 1.5, TOL);
    assert_close(
        hist.weighted_mean_without("ScalingRelation", "A").unwrap(),
        3.5,
        TOL,
    );
    assert_close(hist.overall_weighted_mean(), 2.5, TOL);
}

#[test]
fn merge_matches_any_interleaving() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
    let observations: Vec<(usize, f64, f64)> = (0..60)
        .map(|_| {
            (
                rng.gen_range(0..4usize),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(0.1..2.0),
            )
        })
        .collect();

    let keys = [
        ("FaultModel", "FM3_1"),
        ("FaultModel", "FM3_2"),
        ("ScalingRelation", "EllB"),
        ("ScalingRelation", "HB08"),
    ];

    let fill = |indices: &dyn Fn(usize) -> bool| {
        let mut hist = WeightedCategoryHistogram::new("rate");
        for (i, &(key, value, weight)) in observations.iter().enumerate() {
            if indices(i) {
                let (category, choice) = keys[key];
                hist.add_observation(category, choice, value, weight);
            }
        }
        hist
    };

    let single = fill(&|_| true);

    // split at an offset, merge in both directions
    let mut front = fill(&|i| i < 23);
    let back = fill(&|i| i >= 23);
    front.merge(back);

    let mut rear = fill(&|i| i >= 23);
    let front_again = fill(&|i| i < 23);
    rear.merge(front_again);

    for hist in [&front, &rear] {
        assert_close(
            hist.overall_weighted_mean(),
            single.overall_weighted_mean(),
            1e-9,
        );
        assert_close(
            hist.overall_weighted_std_dev(),
            single.overall_weighted_std_dev(),
            1e-9,
        );
        assert_close(
            hist.weighted_std_dev("FaultModel", &[]).unwrap(),
            single.weighted_std_dev("FaultModel", &[]).unwrap(),
            1e-9,
        );
    }
}

#[test]
fn mean_stays_within_selection_range() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(23);
    let mut hist = WeightedCategoryHistogram::new("rate");
    for i in 0..200 {
        let choice = ["EllB", "HB08", "Shaw09"][i % 3];
        hist.add_observation(
            "ScalingRelation",
            choice,
            rng.gen_range(-100.0..100.0),
            rng.gen_range(0.0..3.0),
        );
    }

    for selection in [&["EllB"][..], &["EllB", "Shaw09"][..], &[][..]] {
        let mean = hist.weighted_mean("ScalingRelation", selection).unwrap();
        let (min, max) = hist.value_range().unwrap();
        assert!(mean >= min && mean <= max, "{mean} outside [{min}, {max}]");
    }
}

#[test]
fn tornado_never_reports_single_choice_categories() {
    let set = fixture_tree();
    let mut collector = BranchSensitivityCollector::new("rate", |b, _: &f64| synthetic_rate(b))
        .with_extra_pairs(|_, _| vec![("Constant".to_owned(), "only".to_owned())]);

    for branch in set.iter() {
        collector.consume(branch, &0.0);
    }

    for use_mean_shift in [false, true] {
        let values = collector.histogram().tornado_values(use_mean_shift);
        assert!(values.iter().all(|t| t.category != "Constant"));
        // 2 + 3 + 2 choices across the three real axes
        assert_eq!(values.len(), 7);
    }
}

#[test]
fn empty_selection_statistics_are_nan_not_errors() {
    let mut hist = WeightedCategoryHistogram::new("rate");
    hist.add_observation("Axis", "only", f64::NAN, 1.0);

    assert!(hist.weighted_mean("Axis", &[]).unwrap().is_nan());
    assert!(hist.weighted_mean_without("Axis", "only").unwrap().is_nan());
    assert!(hist.overall_weighted_mean().is_nan());
}

#[test]
fn merging_an_empty_histogram_changes_nothing() {
    let set = fixture_tree();
    let mut collector = BranchSensitivityCollector::new("rate", |b, _: &f64| synthetic_rate(b));
    for branch in set.iter() {
        collector.consume(branch, &0.0);
    }

    let before_mean = collector.histogram().overall_weighted_mean();
    let before_count = collector.histogram().num_observations();

    let empty = BranchSensitivityCollector::new("rate", |b, _: &f64| synthetic_rate(b));
    let bytes = Accumulator::<f64>::encode(&empty).unwrap();
    collector.merge_encoded(&bytes).unwrap();

    assert_close(collector.histogram().overall_weighted_mean(), before_mean, TOL);
    assert_eq!(collector.histogram().num_observations(), before_count);
}
