//! Pipeline orchestration: acquire -> normalize -> classify or render -> write.
//!
//! Every stage runs to completion before the next starts and the first
//! failure ends the run. Failures are reported as [`PipelineError`], which
//! names the stage alongside the error kind.
//!
//! Output files are staged next to their targets and only renamed into
//! place once every stage has succeeded, so a failed run leaves no new
//! outputs behind.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use classifier::{classify_and_vectorize, normalize, VectorLayer};
use imagery_client::{CachedImagerySource, HttpImageryClient, ImagerySource};
use map_common::{MapError, MapResult, Raster};
use raster_io::{CacheStats, CachedLoader};
use renderer::{render_raster_overlay, render_vector_overlay, MapDocument, OverlayLayer};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::TracemapConfig;

/// Pipeline stage, as reported in failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Fetch,
    Normalize,
    Classify,
    Render,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Classify => "classify",
            Stage::Render => "render",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed ({}): {source}", .source.kind())]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: MapError,
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> StageExt<T> for MapResult<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError { stage, source })
    }
}

/// Where the input raster comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterSource {
    /// Local GeoTIFF, read at the configured band.
    File(PathBuf),
    /// The configured imagery query.
    Imagery,
}

/// Result of the `classify` flow.
#[derive(Debug)]
pub struct ClassifyOutcome {
    pub layer: VectorLayer,
    pub document: MapDocument,
    pub document_path: PathBuf,
    pub export_path: Option<PathBuf>,
}

/// Result of the `overlay` flow.
#[derive(Debug)]
pub struct OverlayOutcome {
    pub document: MapDocument,
    pub document_path: PathBuf,
    pub image_path: PathBuf,
}

/// Result of the `fetch` flow.
#[derive(Debug)]
pub struct FetchOutcome {
    pub tile_url: Option<String>,
    pub width: usize,
    pub height: usize,
    pub document: MapDocument,
    pub document_path: PathBuf,
    pub image_path: Option<PathBuf>,
}

/// Acquired input plus the tile template the imagery API returned with it.
struct Acquired {
    raster: Arc<Raster>,
    tile_url: Option<String>,
    from_imagery: bool,
}

type SharedImagery = CachedImagerySource<Box<dyn ImagerySource>>;

/// One configured pipeline and the caches it owns.
///
/// Caches live exactly as long as this value. Running several flows on the
/// same `Pipeline` reuses decoded files and imagery results whose inputs are
/// unchanged.
pub struct Pipeline {
    config: TracemapConfig,
    loader: CachedLoader,
    imagery: Option<SharedImagery>,
}

impl Pipeline {
    /// Build a pipeline, connecting the HTTP imagery client when
    /// `imagery.base_url` is set.
    pub fn new(config: TracemapConfig) -> MapResult<Self> {
        let imagery = match config.http_client_config() {
            Some(client_config) => {
                let client: Box<dyn ImagerySource> =
                    Box::new(HttpImageryClient::new(client_config)?);
                Some(client)
            }
            None => None,
        };
        Ok(Self::build(config, imagery))
    }

    /// Build a pipeline around an explicit imagery backend.
    pub fn with_source(config: TracemapConfig, source: Box<dyn ImagerySource>) -> Self {
        Self::build(config, Some(source))
    }

    fn build(config: TracemapConfig, source: Option<Box<dyn ImagerySource>>) -> Self {
        let capacity = config.cache.capacity;
        Self {
            loader: CachedLoader::new(capacity),
            imagery: source.map(|s| CachedImagerySource::new(s, capacity)),
            config,
        }
    }

    pub fn config(&self) -> &TracemapConfig {
        &self.config
    }

    pub fn loader_stats(&self) -> CacheStats {
        self.loader.stats()
    }

    pub async fn imagery_stats(&self) -> Option<CacheStats> {
        match &self.imagery {
            Some(imagery) => Some(imagery.stats().await),
            None => None,
        }
    }

    /// Drop every cached load and imagery result.
    pub async fn clear_caches(&mut self) {
        self.loader.clear();
        if let Some(imagery) = &self.imagery {
            imagery.clear().await;
        }
    }

    // ------------------------------------------------------------------------
    // Flows
    // ------------------------------------------------------------------------

    /// Classify the input into polygons, write the map document and,
    /// when `export.path` is set, the vector export.
    #[instrument(skip(self))]
    pub async fn run_classify(
        &mut self,
        source: &RasterSource,
    ) -> Result<ClassifyOutcome, PipelineError> {
        let input = self.acquire(source).await?;
        let normalized = self.normalize(&input)?;

        let edges = self.config.bin_edges().stage(Stage::Classify)?;
        let mut layer =
            classify_and_vectorize(&normalized, edges.edges()).stage(Stage::Classify)?;
        if self.config.classify.dissolve {
            layer = layer.dissolve();
        }

        let styler = self
            .config
            .shape_styler(edges.class_count() as u32)
            .stage(Stage::Render)?;
        let shapes = render_vector_overlay(&layer, styler);

        let mut outputs = StagedOutputs::default();
        let export_path = match &self.config.export.path {
            Some(path) => {
                let format = self.config.export.resolved_format();
                let bytes = vector_export::to_bytes(&layer, format).stage(Stage::Export)?;
                outputs.stage(path, &bytes).stage(Stage::Export)?;
                Some(path.clone())
            }
            None => None,
        };

        let mut document = self.document(input.tile_url.as_deref())?;
        document.push_layer(shapes);
        let document_path = self.config.map.document_path.clone();
        outputs
            .stage(&document_path, document.to_json().stage(Stage::Render)?.as_bytes())
            .stage(Stage::Render)?;
        outputs.commit().stage(Stage::Render)?;

        info!(
            polygons = layer.len(),
            classes = layer.class_values().len(),
            document = %document_path.display(),
            "Classification complete"
        );
        Ok(ClassifyOutcome {
            layer,
            document,
            document_path,
            export_path,
        })
    }

    /// Render the input through the palette as an image overlay.
    #[instrument(skip(self))]
    pub async fn run_overlay(
        &mut self,
        source: &RasterSource,
    ) -> Result<OverlayOutcome, PipelineError> {
        let input = self.acquire(source).await?;
        let normalized = self.normalize(&input)?;

        let mut outputs = StagedOutputs::default();
        let image_path = self.config.render.image_path.clone();
        let layer = self.image_layer(&normalized, &image_path, &mut outputs)?;

        let mut document = self.document(input.tile_url.as_deref())?;
        document.push_layer(layer);
        let document_path = self.config.map.document_path.clone();
        outputs
            .stage(&document_path, document.to_json().stage(Stage::Render)?.as_bytes())
            .stage(Stage::Render)?;
        outputs.commit().stage(Stage::Render)?;

        Ok(OverlayOutcome {
            document,
            document_path,
            image_path,
        })
    }

    /// Query the imagery API and publish its tile layer, plus a locally
    /// rendered overlay of the aggregated grid when `with_overlay` is set.
    #[instrument(skip(self))]
    pub async fn run_fetch(&mut self, with_overlay: bool) -> Result<FetchOutcome, PipelineError> {
        let input = self.acquire(&RasterSource::Imagery).await?;
        let mut document = self.document(input.tile_url.as_deref())?;
        let mut outputs = StagedOutputs::default();

        let image_path = if with_overlay {
            let normalized = self.normalize(&input)?;
            let path = self.config.render.image_path.clone();
            document.push_layer(self.image_layer(&normalized, &path, &mut outputs)?);
            Some(path)
        } else {
            None
        };

        if document.layers.is_empty() {
            warn!("Imagery API returned no tile URL and no overlay was requested");
        }

        let document_path = self.config.map.document_path.clone();
        outputs
            .stage(&document_path, document.to_json().stage(Stage::Render)?.as_bytes())
            .stage(Stage::Render)?;
        outputs.commit().stage(Stage::Render)?;

        Ok(FetchOutcome {
            tile_url: input.tile_url,
            width: input.raster.width(),
            height: input.raster.height(),
            document,
            document_path,
            image_path,
        })
    }

    // ------------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------------

    async fn acquire(&mut self, source: &RasterSource) -> Result<Acquired, PipelineError> {
        match source {
            RasterSource::File(path) => {
                let raster = self
                    .loader
                    .load_band(path, self.config.input.band)
                    .stage(Stage::Load)?;
                Ok(Acquired {
                    raster,
                    tile_url: None,
                    from_imagery: false,
                })
            }
            RasterSource::Imagery => {
                let imagery = self
                    .imagery
                    .as_ref()
                    .ok_or_else(|| {
                        MapError::invalid_parameter("imagery.base_url", "no imagery API configured")
                    })
                    .stage(Stage::Fetch)?;
                let query = self.config.imagery_query().stage(Stage::Fetch)?;
                let vis = self.config.vis_params();
                let result = imagery.fetch(&query, Some(&vis)).await.stage(Stage::Fetch)?;
                info!(
                    collection = %query.collection,
                    width = result.raster.width(),
                    height = result.raster.height(),
                    "Fetched aggregated imagery"
                );
                Ok(Acquired {
                    raster: Arc::new(result.raster),
                    tile_url: result.tile_url,
                    from_imagery: true,
                })
            }
        }
    }

    /// Imagery falls back to the visualization range when no explicit
    /// bounds are configured; files fall back to their own data range.
    fn normalize(&self, input: &Acquired) -> Result<Raster, PipelineError> {
        let settings = &self.config.normalize;
        let (min, max) = if input.from_imagery {
            (
                settings.min.or(Some(self.config.render.vis_min as f32)),
                settings.max.or(Some(self.config.render.vis_max as f32)),
            )
        } else {
            (settings.min, settings.max)
        };
        normalize(&input.raster, min, max, settings.degenerate).stage(Stage::Normalize)
    }

    fn image_layer(
        &self,
        normalized: &Raster,
        path: &Path,
        outputs: &mut StagedOutputs,
    ) -> Result<OverlayLayer, PipelineError> {
        let palette = self.config.palette().stage(Stage::Render)?;
        let image = render_raster_overlay(normalized, &palette, self.config.render.opacity)
            .stage(Stage::Render)?;
        outputs
            .stage(path, &image.to_png().stage(Stage::Render)?)
            .stage(Stage::Render)?;
        Ok(image.into_layer(self.overlay_name(), image_url(path, &self.config.map.document_path)))
    }

    fn overlay_name(&self) -> String {
        format!("{} (local)", self.config.map.layer_name)
    }

    /// Empty document at the configured viewport, with the imagery tile
    /// layer first when there is one.
    fn document(&self, tile_url: Option<&str>) -> Result<MapDocument, PipelineError> {
        let map = &self.config.map;
        let mut document =
            MapDocument::new(map.center_lat, map.center_lon, map.zoom).stage(Stage::Render)?;
        if let Some(url) = tile_url {
            document.push_layer(OverlayLayer::tiles(
                map.layer_name.clone(),
                url,
                map.attribution.clone(),
            ));
        }
        Ok(document)
    }
}

/// Files written to temporaries beside their targets, renamed into place
/// by [`StagedOutputs::commit`]. Dropping without committing removes them.
#[derive(Default)]
struct StagedOutputs {
    files: Vec<(NamedTempFile, PathBuf)>,
}

impl StagedOutputs {
    fn stage(&mut self, path: &Path, bytes: &[u8]) -> MapResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let write = || -> std::io::Result<NamedTempFile> {
            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(bytes)?;
            tmp.as_file().sync_all()?;
            Ok(tmp)
        };
        let tmp = write().map_err(|e| MapError::Io(format!("writing {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Staged output");
        self.files.push((tmp, path.to_path_buf()));
        Ok(())
    }

    fn commit(self) -> MapResult<()> {
        for (tmp, path) in self.files {
            tmp.persist(&path)
                .map_err(|e| MapError::Io(format!("writing {}: {}", path.display(), e.error)))?;
            info!(path = %path.display(), "Wrote output");
        }
        Ok(())
    }
}

/// Image URL as seen from the document: relative when both share a directory.
fn image_url(image: &Path, document: &Path) -> String {
    let same_dir = image.parent().unwrap_or(Path::new("")) == document.parent().unwrap_or(Path::new(""));
    match image.file_name() {
        Some(name) if same_dir => name.to_string_lossy().into_owned(),
        _ => image.display().to_string(),
    }
}
