//! JSON-over-HTTP imagery client.
//!
//! Request: `POST {base_url}/collections/{collection}/aggregate`
//!
//! ```json
//! {"band": "...", "start": "2024-11-01", "end": "2024-12-05",
//!  "bbox": [west, south, east, north], "reducer": "mean",
//!  "visualization": {"min": 0.0, "max": 0.05, "palette": ["black", "red"]}}
//! ```
//!
//! Response:
//!
//! ```json
//! {"width": 2, "height": 1, "transform": [x0, dx, 0, y0, 0, dy],
//!  "values": [0.01, null], "tile_url": "https://.../{z}/{x}/{y}"}
//! ```
//!
//! `transform` is in GDAL order; `null` values are missing.

use std::time::Duration;

use async_trait::async_trait;
use map_common::{GeoTransform, MapError, MapResult, Raster};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::query::{ImageryQuery, Reducer, VisParams};
use crate::source::{ImageryResult, ImagerySource};

/// Connection settings for [`HttpImageryClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct AggregateRequest<'a> {
    band: &'a str,
    start: String,
    end: String,
    bbox: [f64; 4],
    reducer: Reducer,
    #[serde(skip_serializing_if = "Option::is_none")]
    visualization: Option<&'a VisParams>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    width: usize,
    height: usize,
    transform: [f64; 6],
    values: Vec<Option<f64>>,
    #[serde(default)]
    tile_url: Option<String>,
}

impl AggregateResponse {
    fn into_result(self) -> MapResult<ImageryResult> {
        let transform = GeoTransform::from_gdal(self.transform)
            .map_err(|e| MapError::remote(format!("malformed transform: {}", e)))?;
        let data: Vec<f32> = self
            .values
            .into_iter()
            .map(|v| v.map(|v| v as f32).unwrap_or(f32::NAN))
            .collect();
        let raster = Raster::new(self.width, self.height, data, transform)
            .map_err(|e| MapError::remote(format!("malformed grid: {}", e)))?;
        Ok(ImageryResult {
            raster,
            tile_url: self.tile_url,
        })
    }
}

/// Imagery source backed by the aggregate endpoint.
pub struct HttpImageryClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpImageryClient {
    pub fn new(config: HttpClientConfig) -> MapResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            MapError::invalid_parameter("base_url", format!("'{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(MapError::invalid_parameter(
                "base_url",
                format!("'{}' cannot carry a path", config.base_url),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| MapError::remote(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    /// Endpoint for a collection; the identifier becomes one escaped path
    /// segment even when it contains slashes.
    pub fn aggregate_url(&self, collection: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["collections", collection, "aggregate"]);
        }
        url
    }
}

fn describe(err: reqwest::Error) -> MapError {
    if err.is_timeout() {
        MapError::remote(format!("request timed out: {}", err))
    } else if err.is_decode() {
        MapError::remote(format!("malformed response body: {}", err))
    } else {
        MapError::remote(err.to_string())
    }
}

#[async_trait]
impl ImagerySource for HttpImageryClient {
    #[instrument(skip(self, vis), fields(collection = %query.collection, band = %query.band))]
    async fn fetch(
        &self,
        query: &ImageryQuery,
        vis: Option<&VisParams>,
    ) -> MapResult<ImageryResult> {
        query.validate()?;
        if let Some(vis) = vis {
            vis.validate()?;
        }

        let url = self.aggregate_url(&query.collection);
        let body = AggregateRequest {
            band: &query.band,
            start: query.start.to_string(),
            end: query.end.to_string(),
            bbox: query.bbox.to_array(),
            reducer: query.reducer,
            visualization: vis,
        };
        debug!(url = %url, "Requesting aggregate");

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(describe)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MapError::remote(format!(
                "aggregate request failed: {} {}",
                status,
                detail.trim()
            )));
        }

        let payload: AggregateResponse = response.json().await.map_err(describe)?;
        let result = payload.into_result()?;
        info!(
            width = result.raster.width(),
            height = result.raster.height(),
            valid = result.raster.valid_count(),
            has_tiles = result.tile_url.is_some(),
            "Fetched aggregated imagery"
        );
        Ok(result)
    }
}
