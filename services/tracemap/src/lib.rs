//! tracemap: raster -> classes -> polygons -> map overlay.
//!
//! The library half holds configuration loading and the pipeline driver so
//! both can be exercised without the CLI.

pub mod config;
pub mod pipeline;

pub use config::{ConfigError, LogFormat, TracemapConfig};
pub use pipeline::{
    ClassifyOutcome, FetchOutcome, OverlayOutcome, Pipeline, PipelineError, RasterSource, Stage,
};
