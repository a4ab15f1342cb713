//! Fixtures shared by the tracemap test suites.
//!
//! [`generators`] builds small rasters with known values on a fixed
//! north-up grid. [`fixtures`] writes them out as GeoTIFF files.

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;

/// Assert two numbers agree within an absolute tolerance.
///
/// Operands are widened to `f64`, so `f32` raster samples can be compared
/// against `f64` geometry directly.
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $tolerance:expr) => {{
        let (actual, expected, tolerance) = ($actual as f64, $expected as f64, $tolerance as f64);
        assert!(
            (actual - expected).abs() <= tolerance,
            "{} = {} is not within {} of {}",
            stringify!($actual),
            actual,
            tolerance,
            expected
        );
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_within_tolerance() {
        assert_approx_eq!(0.0200001_f32, 0.02_f64, 1e-6);
    }

    #[test]
    #[should_panic(expected = "is not within")]
    fn test_outside_tolerance() {
        assert_approx_eq!(0.03_f64, 0.02_f64, 1e-6);
    }
}
