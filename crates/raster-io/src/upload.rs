//! Staging of uploaded raster bytes.

use std::io::Write;
use std::path::Path;

use map_common::{MapError, MapResult};
use tempfile::{Builder, TempPath};
use tracing::debug;

/// Persist an uploaded byte stream to a temporary `.tif` file in `dir`.
///
/// The file is removed when the returned [`TempPath`] is dropped.
pub fn stage_upload(bytes: &[u8], dir: impl AsRef<Path>) -> MapResult<TempPath> {
    if bytes.is_empty() {
        return Err(MapError::ResourceNotFound("empty upload".to_string()));
    }
    let mut file = Builder::new()
        .prefix("upload-")
        .suffix(".tif")
        .tempfile_in(dir.as_ref())
        .map_err(|e| MapError::Io(format!("cannot create upload file: {}", e)))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| MapError::Io(format!("cannot write upload file: {}", e)))?;
    let path = file.into_temp_path();
    debug!(path = %path.display(), bytes = bytes.len(), "Staged upload");
    Ok(path)
}
