//! Tests for vector overlays and the map document.

use classifier::classify_and_vectorize;
use renderer::{render_vector_overlay, ClassRamp, Color, MapDocument, OverlayLayer, ShapeStyle};
use test_utils::{checkerboard_raster, ring_raster};

const QUARTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

fn shapes(layer: &OverlayLayer) -> &[renderer::StyledShape] {
    match layer {
        OverlayLayer::Shapes { shapes, .. } => shapes,
        other => panic!("expected shapes, got {:?}", other),
    }
}

// ============================================================================
// Vector overlay tests
// ============================================================================

#[test]
fn test_one_shape_per_record_in_order() {
    let layer = classify_and_vectorize(&ring_raster(6, 2, 0.1, 0.9), &QUARTILES).unwrap();
    let ramp = ClassRamp::red_to_blue(5);
    let overlay = render_vector_overlay(&layer, |class| ramp.style(class));

    let shapes = shapes(&overlay);
    assert_eq!(shapes.len(), layer.len());
    for (shape, record) in shapes.iter().zip(layer.records()) {
        assert_eq!(shape.class_value, record.class_value);
        assert_eq!(shape.style, ramp.style(record.class_value));
    }
}

#[test]
fn test_style_bound_to_each_records_class() {
    // Alternating classes 1 and 4: every shape must carry its own colour,
    // not the colour of whichever record came last.
    let layer = classify_and_vectorize(&checkerboard_raster(3, 3, 0.1, 0.9), &QUARTILES).unwrap();
    let ramp = ClassRamp::new(Color::rgb(0, 0, 0), Color::rgb(200, 0, 0), 5);
    let overlay = render_vector_overlay(&layer, |class| ramp.style(class));

    for shape in shapes(&overlay) {
        let expected = if shape.class_value == 1 { "#320000" } else { "#c80000" };
        assert_eq!(shape.style.fill_color, expected);
    }
}

#[test]
fn test_custom_style_fn() {
    let layer = classify_and_vectorize(&ring_raster(4, 1, 0.1, 0.9), &QUARTILES).unwrap();
    let overlay = render_vector_overlay(&layer, |class| ShapeStyle {
        weight: class as f32,
        ..ShapeStyle::filled(Color::rgb(1, 2, 3))
    });

    let weights: Vec<f32> = shapes(&overlay).iter().map(|s| s.style.weight).collect();
    assert_eq!(weights, vec![1.0, 4.0]);
}

#[test]
fn test_geometry_is_geojson_polygon() {
    let layer = classify_and_vectorize(&ring_raster(4, 1, 0.1, 0.9), &QUARTILES).unwrap();
    let overlay = render_vector_overlay(&layer, |c| ClassRamp::red_to_blue(5).style(c));

    match &shapes(&overlay)[0].geometry.value {
        geojson::Value::Polygon(rings) => assert_eq!(rings.len(), 2),
        other => panic!("expected polygon, got {:?}", other),
    }
}

// ============================================================================
// Map document tests
// ============================================================================

#[test]
fn test_document_round_trip() {
    let layer = classify_and_vectorize(&ring_raster(4, 1, 0.1, 0.9), &QUARTILES).unwrap();
    let doc = MapDocument::new(-4.28, -25.01, 4)
        .unwrap()
        .with_layer(OverlayLayer::tiles(
            "S5P CO",
            "https://tiles.example/{z}/{x}/{y}",
            "Imagery API",
        ))
        .with_layer(render_vector_overlay(&layer, |c| ClassRamp::red_to_blue(5).style(c)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.json");
    doc.write(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let back = MapDocument::from_json(&text).unwrap();
    assert_eq!(back, doc);

    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["center"][0], -4.28);
    assert_eq!(json["zoom"], 4);
    assert_eq!(json["layers"][0]["type"], "tiles");
    assert_eq!(json["layers"][1]["type"], "shapes");
    assert_eq!(json["layers"][1]["shapes"][0]["style"]["color"], "#000000");
}

#[test]
fn test_document_layer_control_defaults_on() {
    let doc = MapDocument::from_json(r#"{"center":[0,0],"zoom":2,"layers":[]}"#).unwrap();
    assert!(doc.layer_control);
}

#[test]
fn test_document_write_to_missing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let doc = MapDocument::new(0.0, 0.0, 1).unwrap();
    let err = doc.write(dir.path().join("nope").join("map.json")).unwrap_err();
    assert_eq!(err.kind(), "ResourceNotFound");
}
