//! Bin edges and per-cell class assignment.

use std::collections::BTreeMap;

use map_common::{MapError, MapResult, Raster};
use serde::{Deserialize, Serialize};

/// Class index given to cells with missing source data.
pub const MISSING_CLASS: u32 = u32::MAX;

/// Strictly increasing thresholds partitioning the value axis.
///
/// Intervals are right-inclusive: `v <= e[0]` is class 0,
/// `e[i-1] < v <= e[i]` is class `i`, and `v > e[n-1]` is the overflow
/// class `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    pub fn new(edges: Vec<f64>) -> MapResult<Self> {
        if edges.len() < 2 {
            return Err(MapError::format(format!(
                "at least 2 bin edges are required, got {}",
                edges.len()
            )));
        }
        if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
            return Err(MapError::format(format!("bin edge {} is not finite", bad)));
        }
        if let Some(pair) = edges.windows(2).find(|w| w[0] >= w[1]) {
            return Err(MapError::format(format!(
                "bin edges must be strictly increasing, found {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { edges })
    }

    /// Parse a user-typed list such as `"0, 0.25, 0.5 0.75 1"`.
    pub fn parse(s: &str) -> MapResult<Self> {
        let edges = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| MapError::format(format!("invalid bin edge '{}'", t)))
            })
            .collect::<MapResult<Vec<f64>>>()?;
        Self::new(edges)
    }

    /// `bins + 1` evenly spaced edges from `min` to `max`.
    pub fn uniform(min: f64, max: f64, bins: usize) -> MapResult<Self> {
        if bins == 0 {
            return Err(MapError::format("bin count must be at least 1"));
        }
        let step = (max - min) / bins as f64;
        let edges = (0..=bins)
            .map(|i| if i == bins { max } else { min + step * i as f64 })
            .collect();
        Self::new(edges)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of distinct class indices, `len + 1` including underflow and overflow.
    pub fn class_count(&self) -> usize {
        self.edges.len() + 1
    }

    /// Highest class index (the overflow class).
    pub fn max_class(&self) -> u32 {
        self.edges.len() as u32
    }

    /// Class index of a finite value.
    pub fn classify(&self, value: f64) -> u32 {
        // Number of edges strictly below the value.
        self.edges.partition_point(|&e| e < value) as u32
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = MapError;

    fn try_from(edges: Vec<f64>) -> MapResult<Self> {
        Self::new(edges)
    }
}

impl From<BinEdges> for Vec<f64> {
    fn from(edges: BinEdges) -> Self {
        edges.edges
    }
}

/// Per-cell class indices, same shape as the source raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedGrid {
    width: usize,
    height: usize,
    classes: Vec<u32>,
}

impl ClassifiedGrid {
    /// Build from raw class indices. `classes.len()` must equal `width * height`.
    pub fn from_classes(width: usize, height: usize, classes: Vec<u32>) -> MapResult<Self> {
        if classes.len() != width * height {
            return Err(MapError::format(format!(
                "class buffer has {} cells, expected {}",
                classes.len(),
                width * height
            )));
        }
        Ok(Self {
            width,
            height,
            classes,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn classes(&self) -> &[u32] {
        &self.classes
    }

    /// Class at (col, row); `None` when out of bounds or missing.
    pub fn class_at(&self, col: usize, row: usize) -> Option<u32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        match self.classes[row * self.width + col] {
            MISSING_CLASS => None,
            class => Some(class),
        }
    }

    /// Cell count per class, missing cells excluded.
    pub fn histogram(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for &class in self.classes.iter().filter(|&&c| c != MISSING_CLASS) {
            *counts.entry(class).or_insert(0) += 1;
        }
        counts
    }
}

/// Assign every cell its bin index; NaN cells get [`MISSING_CLASS`].
pub fn classify(raster: &Raster, edges: &BinEdges) -> ClassifiedGrid {
    let classes = raster
        .data()
        .iter()
        .map(|&v| {
            if v.is_nan() {
                MISSING_CLASS
            } else {
                edges.classify(v as f64)
            }
        })
        .collect();
    ClassifiedGrid {
        width: raster.width(),
        height: raster.height(),
        classes,
    }
}
