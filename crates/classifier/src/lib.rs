//! Classification of normalized rasters into labelled polygons.
//!
//! The pipeline is:
//! 1. [`normalize`] rescales samples to [0, 1]
//! 2. [`classify`] quantizes each cell against [`BinEdges`]
//! 3. [`polygonize`] traces 4-connected regions of equal class into polygons
//!
//! [`classify_and_vectorize`] runs steps 2 and 3 and returns a [`VectorLayer`].

pub mod bins;
pub mod normalize;
pub mod polygonize;
pub mod vector;

pub use bins::{classify, BinEdges, ClassifiedGrid, MISSING_CLASS};
pub use normalize::{normalize, value_range, DegeneratePolicy};
pub use polygonize::polygonize;
pub use vector::{PolygonRecord, Shape, VectorLayer};

use map_common::{MapResult, Raster};
use tracing::{info, instrument};

/// Quantize `raster` against `bin_edges` and trace each class region into a polygon.
///
/// Fails with a format error when `bin_edges` has fewer than two entries or
/// is not strictly increasing.
#[instrument(skip_all, fields(width = raster.width(), height = raster.height()))]
pub fn classify_and_vectorize(raster: &Raster, bin_edges: &[f64]) -> MapResult<VectorLayer> {
    let edges = BinEdges::new(bin_edges.to_vec())?;
    let grid = classify(raster, &edges);
    let records = polygonize(&grid, raster.transform());
    info!(
        classes = edges.class_count(),
        polygons = records.len(),
        "Vectorized classified raster"
    );
    Ok(VectorLayer::new(records))
}
