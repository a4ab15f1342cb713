//! The seam between the pipeline and whichever imagery backend serves it.

use std::sync::Arc;

use async_trait::async_trait;
use map_common::{MapResult, Raster};

use crate::query::{ImageryQuery, VisParams};

/// Aggregated image returned for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageryResult {
    /// Reduced single-band grid; cells with no valid scene are NaN.
    pub raster: Raster,
    /// XYZ tile template (`{z}/{x}/{y}`) rendered with the requested
    /// visualization, when one was requested.
    pub tile_url: Option<String>,
}

/// A backend able to aggregate imagery.
#[async_trait]
pub trait ImagerySource: Send + Sync {
    /// Run one aggregation. Failures and timeouts are `RemoteApi` errors.
    async fn fetch(&self, query: &ImageryQuery, vis: Option<&VisParams>)
        -> MapResult<ImageryResult>;
}

#[async_trait]
impl<T: ImagerySource + ?Sized> ImagerySource for Box<T> {
    async fn fetch(
        &self,
        query: &ImageryQuery,
        vis: Option<&VisParams>,
    ) -> MapResult<ImageryResult> {
        (**self).fetch(query, vis).await
    }
}

#[async_trait]
impl<T: ImagerySource + ?Sized> ImagerySource for Arc<T> {
    async fn fetch(
        &self,
        query: &ImageryQuery,
        vis: Option<&VisParams>,
    ) -> MapResult<ImageryResult> {
        (**self).fetch(query, vis).await
    }
}
