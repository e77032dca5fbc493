//! Assertion helpers shared by unit and integration tests.

use approx::AbsDiffEq;

/// Default tolerance for f64 statistic comparisons.
pub const DEFAULT_TOLERANCE_F64: f64 = 1e-9;

/// Assert that two f64 values are within `tolerance` of each other.
///
/// # Panics
///
/// Panics with both values and the difference on mismatch.
#[track_caller]
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        actual.abs_diff_eq(&expected, tolerance),
        "value mismatch: actual={actual}, expected={expected}, |diff|={}",
        (actual - expected).abs()
    );
}

/// Assert that two f64 slices are element-wise within `tolerance`.
#[track_caller]
pub fn assert_slices_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: actual={}, expected={}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            a.abs_diff_eq(e, tolerance),
            "mismatch at index {i}: actual={a}, expected={e}"
        );
    }
}
