//! End-to-end tests for normalize -> classify -> polygonize.

use classifier::{
    classify, classify_and_vectorize, normalize, polygonize, BinEdges, DegeneratePolicy, Shape,
    VectorLayer,
};
use geo::{Area, Contains, Point};
use map_common::Raster;
use test_utils::{
    assert_approx_eq, checkerboard_raster, constant_raster, gradient_raster, plume_raster,
    ring_raster, with_missing, CELL_SIZE,
};

const QUARTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Every non-missing cell center lies in exactly one polygon, missing cells
/// in none, and the total area equals the non-missing footprint.
fn assert_tiles_raster(layer: &VectorLayer, raster: &Raster) {
    let cell_area = CELL_SIZE * CELL_SIZE;
    let total: f64 = layer
        .records()
        .iter()
        .flat_map(|r| r.geometry.polygons())
        .map(|p| p.unsigned_area())
        .sum();
    assert_approx_eq!(total, raster.valid_count() as f64 * cell_area, 1e-9);

    for row in 0..raster.height() {
        for col in 0..raster.width() {
            let (x, y) = raster.transform().cell_center(col, row);
            let point = Point::new(x, y);
            let hits = layer
                .records()
                .iter()
                .flat_map(|r| r.geometry.polygons())
                .filter(|p| p.contains(&point))
                .count();
            let expected = if raster.get(col, row).unwrap().is_nan() { 0 } else { 1 };
            assert_eq!(hits, expected, "cell ({}, {}) covered {} times", col, row, hits);
        }
    }
}

#[test]
fn test_constant_grid_is_one_polygon_of_class_two() {
    let raster = constant_raster(4, 4, 0.5);
    let layer = classify_and_vectorize(&raster, &QUARTILES).unwrap();

    assert_eq!(layer.len(), 1);
    assert_eq!(layer.records()[0].class_value, 2);
    let Shape::Polygon(polygon) = &layer.records()[0].geometry else {
        panic!("expected a simple polygon");
    };
    assert!(polygon.interiors().is_empty());
    assert_approx_eq!(polygon.unsigned_area(), 16.0 * CELL_SIZE * CELL_SIZE, 1e-9);
    assert_tiles_raster(&layer, &raster);
}

#[test]
fn test_single_edge_is_format_error() {
    let err = classify_and_vectorize(&constant_raster(2, 2, 0.5), &[0.5]).unwrap_err();
    assert_eq!(err.kind(), "FormatError");
}

#[test]
fn test_every_cell_gets_one_class_in_range() {
    let raster = with_missing(&gradient_raster(7, 3, -0.2, 1.3), &[(3, 1)]);
    let edges = BinEdges::new(QUARTILES.to_vec()).unwrap();
    let grid = classify(&raster, &edges);

    let classified: usize = grid.histogram().values().sum();
    assert_eq!(classified, raster.valid_count());
    assert!(grid
        .histogram()
        .keys()
        .all(|&class| class <= edges.max_class()));
}

#[test]
fn test_gradient_tiles_raster() {
    let raster = gradient_raster(10, 6, 0.0, 1.0);
    let layer = classify_and_vectorize(&raster, &QUARTILES).unwrap();

    // Columns fall into classes 0..=4 as vertical stripes.
    assert_eq!(layer.class_values(), vec![0, 1, 2, 3, 4]);
    assert_tiles_raster(&layer, &raster);
}

#[test]
fn test_checkerboard_tiles_raster() {
    let raster = checkerboard_raster(5, 4, 0.1, 0.9);
    let layer = classify_and_vectorize(&raster, &QUARTILES).unwrap();

    assert_eq!(layer.len(), 20);
    assert_tiles_raster(&layer, &raster);
}

#[test]
fn test_ring_produces_hole() {
    let raster = ring_raster(6, 2, 0.1, 0.9);
    let layer = classify_and_vectorize(&raster, &QUARTILES).unwrap();

    assert_eq!(layer.len(), 2);
    let outer = &layer.records()[0];
    assert_eq!(outer.class_value, 1);
    assert_eq!(outer.geometry.polygons()[0].interiors().len(), 1);
    assert_tiles_raster(&layer, &raster);
}

#[test]
fn test_missing_cells_leave_gaps() {
    let raster = with_missing(&constant_raster(5, 5, 0.4), &[(2, 2), (0, 4), (1, 4)]);
    let layer = classify_and_vectorize(&raster, &QUARTILES).unwrap();

    assert_eq!(layer.len(), 1);
    assert_eq!(layer.records()[0].geometry.polygons()[0].interiors().len(), 1);
    assert_tiles_raster(&layer, &raster);
}

#[test]
fn test_plume_pipeline_tiles_raster() {
    let raw = with_missing(&plume_raster(16, 12), &[(0, 0), (15, 11), (7, 6)]);
    let normalized = normalize(&raw, Some(0.0), Some(0.05), DegeneratePolicy::ZeroFill).unwrap();
    let layer = classify_and_vectorize(&normalized, &QUARTILES).unwrap();

    assert!(layer.len() > 1);
    assert_tiles_raster(&layer, &normalized);
    assert_tiles_raster(&layer.dissolve(), &normalized);
}

#[test]
fn test_vectorize_is_idempotent() {
    let raster = plume_raster(12, 9);
    let normalized = normalize(&raster, None, None, DegeneratePolicy::ZeroFill).unwrap();

    let first = classify_and_vectorize(&normalized, &QUARTILES).unwrap();
    let second = classify_and_vectorize(&normalized, &QUARTILES).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_polygonize_uses_transform() {
    let raster = constant_raster(2, 2, 0.5);
    let edges = BinEdges::new(QUARTILES.to_vec()).unwrap();
    let records = polygonize(&classify(&raster, &edges), raster.transform());

    let bounds = raster.bounds();
    let polygon = records[0].geometry.polygons()[0];
    for coord in polygon.exterior().coords() {
        assert!(bounds.contains_point(coord.x, coord.y));
    }
    assert!(polygon
        .exterior()
        .coords()
        .any(|c| c.x == bounds.west && c.y == bounds.north));
}
