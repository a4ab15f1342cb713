//! Query and visualization parameters.

use std::fmt;

use chrono::NaiveDate;
use map_common::{BoundingBox, MapError, MapResult};
use serde::{Deserialize, Serialize};

/// Temporal reducer applied to the scenes matching a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    #[default]
    Mean,
    Median,
    Min,
    Max,
    Sum,
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Mean => "mean",
            Reducer::Median => "median",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Sum => "sum",
        };
        f.write_str(name)
    }
}

/// One aggregated-image request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryQuery {
    /// Collection identifier, e.g. `COPERNICUS/S5P/NRTI/L3_CO`.
    pub collection: String,
    pub band: String,
    /// First day included.
    pub start: NaiveDate,
    /// First day excluded.
    pub end: NaiveDate,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub reducer: Reducer,
}

impl ImageryQuery {
    pub fn new(
        collection: impl Into<String>,
        band: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            collection: collection.into(),
            band: band.into(),
            start,
            end,
            bbox,
            reducer: Reducer::default(),
        }
    }

    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    /// Parse an ISO 8601 calendar date (`YYYY-MM-DD`).
    pub fn parse_date(param: &str, value: &str) -> MapResult<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
            MapError::invalid_parameter(param, format!("'{}' is not a YYYY-MM-DD date: {}", value, e))
        })
    }

    pub fn validate(&self) -> MapResult<()> {
        if self.collection.trim().is_empty() {
            return Err(MapError::invalid_parameter("collection", "must not be empty"));
        }
        if self.band.trim().is_empty() {
            return Err(MapError::invalid_parameter("band", "must not be empty"));
        }
        if self.start >= self.end {
            return Err(MapError::invalid_parameter(
                "dates",
                format!("start {} must precede end {}", self.start, self.end),
            ));
        }
        self.bbox
            .validate()
            .map_err(|e| MapError::invalid_parameter("bbox", e.to_string()))
    }

    /// Key covering every field of the query and `vis`, for result caching.
    pub fn cache_key(&self, vis: Option<&VisParams>) -> FetchKey {
        FetchKey {
            collection: self.collection.clone(),
            band: self.band.clone(),
            start: self.start,
            end: self.end,
            bbox: self.bbox.to_array().map(f64::to_bits),
            reducer: self.reducer,
            vis: vis.map(|v| (v.min.to_bits(), v.max.to_bits(), v.palette.clone())),
        }
    }
}

/// Identity of one fetch. Coordinates and visualization bounds compare by
/// bit pattern, so only identical inputs share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    collection: String,
    band: String,
    start: NaiveDate,
    end: NaiveDate,
    bbox: [u64; 4],
    reducer: Reducer,
    vis: Option<(u64, u64, Vec<String>)>,
}

/// Server-side visualization for the tile URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

impl VisParams {
    pub fn validate(&self) -> MapResult<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min >= self.max {
            return Err(MapError::invalid_parameter(
                "visualization",
                format!("min {} must be below max {}", self.min, self.max),
            ));
        }
        if self.palette.is_empty() {
            return Err(MapError::invalid_parameter("visualization", "palette is empty"));
        }
        Ok(())
    }
}

impl Default for VisParams {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.05,
            palette: ["black", "blue", "purple", "cyan", "green", "yellow", "red"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> ImageryQuery {
        ImageryQuery::new(
            "COPERNICUS/S5P/NRTI/L3_CO",
            "CO_column_number_density",
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 5).unwrap(),
            BoundingBox::new(-45.0, -20.0, -5.0, 12.0),
        )
    }

    #[test]
    fn test_valid_query() {
        assert!(query().validate().is_ok());
    }

    #[test]
    fn test_reversed_dates() {
        let mut q = query();
        std::mem::swap(&mut q.start, &mut q.end);
        assert_eq!(q.validate().unwrap_err().kind(), "InvalidParameter");
    }

    #[test]
    fn test_same_day_rejected() {
        let mut q = query();
        q.end = q.start;
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_bad_bbox() {
        let mut q = query();
        q.bbox = BoundingBox::new(10.0, 0.0, 5.0, 1.0);
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            ImageryQuery::parse_date("start", "2024-11-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
        );
        assert!(ImageryQuery::parse_date("start", "11/01/2024").is_err());
    }

    #[test]
    fn test_cache_key_covers_reducer() {
        assert_ne!(
            query().cache_key(None),
            query().with_reducer(Reducer::Max).cache_key(None)
        );
    }

    #[test]
    fn test_cache_key_keeps_fields_apart() {
        let mut a = query();
        a.collection = "a|b".to_string();
        a.band = "c".to_string();
        let mut b = query();
        b.collection = "a".to_string();
        b.band = "b|c".to_string();
        assert_ne!(a.cache_key(None), b.cache_key(None));
    }

    #[test]
    fn test_cache_key_is_exact() {
        let mut nudged = query();
        nudged.bbox.west += 1e-9;
        assert_ne!(query().cache_key(None), nudged.cache_key(None));

        let vis = VisParams::default();
        let joined = VisParams {
            palette: vec!["black,blue".to_string()],
            ..VisParams::default()
        };
        let split = VisParams {
            palette: vec!["black".to_string(), "blue".to_string()],
            ..VisParams::default()
        };
        assert_eq!(query().cache_key(Some(&vis)), query().cache_key(Some(&vis.clone())));
        assert_ne!(query().cache_key(None), query().cache_key(Some(&vis)));
        assert_ne!(query().cache_key(Some(&joined)), query().cache_key(Some(&split)));
    }

    #[test]
    fn test_default_vis_params() {
        let vis = VisParams::default();
        assert!(vis.validate().is_ok());
        assert_eq!(vis.palette.len(), 7);
        assert_eq!(vis.max, 0.05);
    }
}
