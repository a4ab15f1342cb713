//! Error types for tracemap pipelines.

use thiserror::Error;

/// Result type alias using MapError.
pub type MapResult<T> = Result<T, MapError>;

/// Primary error type for every pipeline stage.
#[derive(Debug, Error)]
pub enum MapError {
    /// Input path or upload does not resolve.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Undecodable raster, malformed bin list or malformed vector file.
    #[error("Format error: {0}")]
    Format(String),

    /// Zero-width normalization range under the strict policy.
    #[error("Degenerate value range: min {min} equals max {max}")]
    DegenerateRange { min: f64, max: f64 },

    /// Failure writing an export or staging an upload.
    #[error("I/O error: {0}")]
    Io(String),

    /// Imagery API query failure or timeout.
    #[error("Remote API error: {0}")]
    RemoteApi(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

impl MapError {
    /// Stable name of the error kind, as surfaced to users.
    pub fn kind(&self) -> &'static str {
        match self {
            MapError::ResourceNotFound(_) => "ResourceNotFound",
            MapError::Format(_) => "FormatError",
            MapError::DegenerateRange { .. } => "DegenerateRangeError",
            MapError::Io(_) => "IOError",
            MapError::RemoteApi(_) => "RemoteAPIError",
            MapError::InvalidParameter { .. } => "InvalidParameter",
        }
    }

    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a RemoteApi error.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteApi(msg.into())
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for MapError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => MapError::ResourceNotFound(err.to_string()),
            _ => MapError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::Format(format!("JSON error: {}", err))
    }
}
