//! Shared test utilities for the crop-weather workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Grid tile and daily weather generators
//! - The test domain fixture (boundary, grid, sample points)
//! - Approximate equality assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{create_constant_tile, admin_features};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Panics when two numbers differ by more than `epsilon`. Both sides are
/// widened to `f64`.
///
/// ```ignore
/// assert_approx_eq!(srad[0], 18.5, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        let diff = (left - right).abs();
        // NaN on either side fails too
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{left:?}`,\n right: `{right:?}`,\n  diff: `{diff:?}` > epsilon `{epsilon:?}`"
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_within_epsilon() {
        assert_approx_eq!(273.15 + 20.0, 293.15, 1e-9);
        assert_approx_eq!(18.5e6 / 1e6, 18.5, 1e-12);
        assert_approx_eq!(-0.5_f32, -0.5, 0.0);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_outside_epsilon() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_rejects_nan() {
        assert_approx_eq!(f64::NAN, 0.0, 1.0);
    }
}
