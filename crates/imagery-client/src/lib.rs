//! Remote imagery API collaborator.
//!
//! A query names an image collection, a band, a date range and a bounding
//! box; the API reduces the matching scenes over time and returns one
//! aggregated single-band grid plus, when visualization parameters were
//! supplied, a tile URL template the map widget can draw directly.
//!
//! - [`ImagerySource`] is the seam the pipeline depends on
//! - [`HttpImageryClient`] speaks the JSON aggregate endpoint
//! - [`CachedImagerySource`] memoizes results per full query

pub mod cached;
pub mod http;
pub mod query;
pub mod source;

pub use cached::CachedImagerySource;
pub use http::{HttpClientConfig, HttpImageryClient};
pub use query::{FetchKey, ImageryQuery, Reducer, VisParams};
pub use source::{ImageryResult, ImagerySource};
