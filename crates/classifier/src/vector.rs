//! Labelled polygon collections.

use std::collections::BTreeMap;

use geo_types::{Geometry, MultiPolygon, Polygon};
use map_common::Crs;

/// Geometry of one record: a single polygon or a multi-part polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Shape {
    /// The component polygons, one for a simple shape.
    pub fn polygons(&self) -> Vec<&Polygon<f64>> {
        match self {
            Shape::Polygon(p) => vec![p],
            Shape::MultiPolygon(mp) => mp.0.iter().collect(),
        }
    }

    /// Convert an arbitrary geometry, keeping only polygonal ones.
    pub fn from_geometry(geometry: Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Polygon(p) => Some(Shape::Polygon(p)),
            Geometry::MultiPolygon(mp) => Some(Shape::MultiPolygon(mp)),
            _ => None,
        }
    }
}

impl From<Shape> for Geometry<f64> {
    fn from(shape: Shape) -> Self {
        match shape {
            Shape::Polygon(p) => Geometry::Polygon(p),
            Shape::MultiPolygon(mp) => Geometry::MultiPolygon(mp),
        }
    }
}

impl From<&Shape> for Geometry<f64> {
    fn from(shape: &Shape) -> Self {
        shape.clone().into()
    }
}

/// A polygon tagged with the bin index it was traced from.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRecord {
    pub geometry: Shape,
    pub class_value: u32,
}

/// Ordered polygon records in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    crs: Crs,
    records: Vec<PolygonRecord>,
}

impl VectorLayer {
    pub fn new(records: Vec<PolygonRecord>) -> Self {
        Self {
            crs: Crs::Epsg4326,
            records,
        }
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn records(&self) -> &[PolygonRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct class values in ascending order.
    pub fn class_values(&self) -> Vec<u32> {
        let mut values: Vec<u32> = self.records.iter().map(|r| r.class_value).collect();
        values.sort_unstable();
        values.dedup();
        values
    }

    /// Merge all records of a class into one multi-polygon record,
    /// ordered by class value.
    pub fn dissolve(&self) -> VectorLayer {
        let mut by_class: BTreeMap<u32, Vec<Polygon<f64>>> = BTreeMap::new();
        for record in &self.records {
            let parts = by_class.entry(record.class_value).or_default();
            parts.extend(record.geometry.polygons().into_iter().cloned());
        }
        let records = by_class
            .into_iter()
            .map(|(class_value, polygons)| PolygonRecord {
                geometry: Shape::MultiPolygon(MultiPolygon(polygons)),
                class_value,
            })
            .collect();
        VectorLayer::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn square(x: f64, y: f64) -> Polygon<f64> {
        polygon![(x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0)]
    }

    #[test]
    fn test_dissolve_groups_by_class() {
        let layer = VectorLayer::new(vec![
            PolygonRecord { geometry: Shape::Polygon(square(0.0, 0.0)), class_value: 2 },
            PolygonRecord { geometry: Shape::Polygon(square(5.0, 0.0)), class_value: 1 },
            PolygonRecord { geometry: Shape::Polygon(square(9.0, 0.0)), class_value: 2 },
        ]);

        let dissolved = layer.dissolve();
        assert_eq!(dissolved.len(), 2);
        assert_eq!(dissolved.records()[0].class_value, 1);
        assert_eq!(dissolved.records()[1].class_value, 2);
        assert_eq!(dissolved.records()[1].geometry.polygons().len(), 2);
        assert_eq!(layer.class_values(), vec![1, 2]);
    }

    #[test]
    fn test_shape_from_geometry() {
        let geometry: Geometry<f64> = square(0.0, 0.0).into();
        assert!(Shape::from_geometry(geometry).is_some());
        let point: Geometry<f64> = geo_types::Point::new(0.0, 0.0).into();
        assert!(Shape::from_geometry(point).is_none());
    }
}
