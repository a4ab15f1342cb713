//! Min/max rescaling of raster samples to [0, 1].

use map_common::{MapError, MapResult, Raster};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do when the value range has zero width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Every non-missing cell becomes 0.
    #[default]
    ZeroFill,
    /// Fail with a degenerate range error.
    Error,
}

/// Finite minimum and maximum of the raster, ignoring NaN.
pub fn value_range(raster: &Raster) -> Option<(f32, f32)> {
    raster
        .data()
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Rescale samples to [0, 1].
///
/// Missing bounds are taken from the data. Samples outside explicit bounds
/// are clamped. NaN samples stay NaN.
pub fn normalize(
    raster: &Raster,
    min_val: Option<f32>,
    max_val: Option<f32>,
    policy: DegeneratePolicy,
) -> MapResult<Raster> {
    for (name, bound) in [("min_val", min_val), ("max_val", max_val)] {
        if let Some(b) = bound {
            if !b.is_finite() {
                return Err(MapError::invalid_parameter(name, "must be finite"));
            }
        }
    }

    let data_range = value_range(raster);
    let (min, max) = match (min_val, max_val, data_range) {
        (Some(lo), Some(hi), _) => (lo, hi),
        (lo, hi, Some((data_lo, data_hi))) => (lo.unwrap_or(data_lo), hi.unwrap_or(data_hi)),
        (_, _, None) => {
            debug!("Raster has no finite samples, nothing to normalize");
            return raster.with_data(vec![f32::NAN; raster.len()]);
        }
    };

    if min > max {
        return Err(MapError::invalid_parameter(
            "min_val",
            format!("{} is greater than max_val {}", min, max),
        ));
    }

    let range = max - min;
    if range == 0.0 {
        return match policy {
            DegeneratePolicy::ZeroFill => {
                warn!(min, "Zero-width value range, filling with zeros");
                let data = raster
                    .data()
                    .iter()
                    .map(|v| if v.is_nan() { f32::NAN } else { 0.0 })
                    .collect();
                raster.with_data(data)
            }
            DegeneratePolicy::Error => Err(MapError::DegenerateRange {
                min: min as f64,
                max: max as f64,
            }),
        };
    }

    debug!(min, max, "Normalizing raster");
    let data = raster
        .data()
        .iter()
        .map(|&v| {
            if v.is_nan() {
                f32::NAN
            } else {
                ((v - min) / range).clamp(0.0, 1.0)
            }
        })
        .collect();
    raster.with_data(data)
}
