//! tracemap configuration.
//!
//! Values are resolved in three layers:
//! 1. Built-in defaults (the S5P CO demo)
//! 2. A YAML file, after `${VAR}` / `${VAR:-default}` substitution
//! 3. `TRACEMAP_*` environment variables
//!
//! The merged result is checked with [`TracemapConfig::validate`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use classifier::{BinEdges, DegeneratePolicy};
use imagery_client::{HttpClientConfig, ImageryQuery, Reducer, VisParams};
use map_common::{BoundingBox, MapError, MapResult};
use renderer::{ClassRamp, Color, Palette, ShapeStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vector_export::ExportFormat;

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable {0} is not set")]
    UnsetVariable(String),

    #[error("unclosed variable substitution: ${{{0}")]
    UnclosedVariable(String),

    #[error("invalid override {name}={value}")]
    InvalidOverride { name: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracemapConfig {
    pub input: InputConfig,
    pub imagery: ImageryConfig,
    pub normalize: NormalizeConfig,
    pub classify: ClassifyConfig,
    pub render: RenderConfig,
    pub map: MapConfig,
    pub export: ExportConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Local GeoTIFF input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: Option<PathBuf>,
    /// 1-based band index.
    pub band: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: None,
            band: 1,
        }
    }
}

/// Remote imagery API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageryConfig {
    /// Unset disables remote fetching.
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub collection: String,
    pub band: String,
    pub start: String,
    pub end: String,
    /// `west,south,east,north`
    pub bbox: String,
    pub reducer: Reducer,
    pub timeout_secs: u64,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "TRACEMAP_API_KEY".to_string(),
            collection: "COPERNICUS/S5P/NRTI/L3_CO".to_string(),
            band: "CO_column_number_density".to_string(),
            start: "2024-11-01".to_string(),
            end: "2024-12-05".to_string(),
            bbox: "-180,-90,180,90".to_string(),
            reducer: Reducer::Mean,
            timeout_secs: 120,
        }
    }
}

/// Normalization of local rasters. Unset bounds come from the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub degenerate: DegeneratePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    pub bin_edges: Vec<f64>,
    /// Merge all polygons of a class into one multi-polygon record.
    pub dissolve: bool,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            bin_edges: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            dissolve: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub palette: Vec<String>,
    /// Value mapped to the first palette colour for imagery results.
    pub vis_min: f64,
    /// Value mapped to the last palette colour for imagery results.
    pub vis_max: f64,
    pub opacity: f32,
    pub image_path: PathBuf,
    pub ramp_low: String,
    pub ramp_high: String,
    pub stroke: String,
    pub stroke_weight: f32,
    pub fill_opacity: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            palette: VisParams::default().palette,
            vis_min: 0.0,
            vis_max: 0.05,
            opacity: 0.7,
            image_path: PathBuf::from("overlay.png"),
            ramp_low: "#ff0000".to_string(),
            ramp_high: "#0000ff".to_string(),
            stroke: "#000000".to_string(),
            stroke_weight: 1.0,
            fill_opacity: 0.5,
        }
    }
}

/// Map widget viewport and output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub attribution: String,
    pub layer_name: String,
    pub document_path: PathBuf,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: -4.28,
            center_lon: -25.01,
            zoom: 4,
            attribution: "Google Earth Engine".to_string(),
            layer_name: "S5P CO".to_string(),
            document_path: PathBuf::from("map.json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Unset skips vector export.
    pub path: Option<PathBuf>,
    /// Unset infers the format from the path extension.
    pub format: Option<ExportFormat>,
}

impl ExportConfig {
    pub fn resolved_format(&self) -> ExportFormat {
        self.format
            .or_else(|| self.path.as_deref().and_then(ExportFormat::from_path))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries kept per cache before the least recently used is evicted.
    /// Unset keeps every result until the pipeline is dropped or cleared.
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl TracemapConfig {
    /// Defaults, overlaid with `path` when given, then with the process
    /// environment.
    ///
    /// The result is not validated: callers apply their own overrides first
    /// and then call [`TracemapConfig::validate`] once.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, |name| std::env::var(name).ok())
    }

    /// Parse YAML text, resolving `${VAR}` references through `lookup`.
    pub fn from_yaml_str<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_vars(content, &lookup)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `TRACEMAP_*` overrides resolved through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    name: name.to_string(),
                    value,
                })
        }

        if let Some(v) = lookup("TRACEMAP_INPUT") {
            self.input.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TRACEMAP_BAND") {
            self.input.band = parsed("TRACEMAP_BAND", v)?;
        }
        if let Some(v) = lookup("TRACEMAP_IMAGERY_URL") {
            self.imagery.base_url = Some(v);
        }
        if let Some(v) = lookup("TRACEMAP_BIN_EDGES") {
            let edges = BinEdges::parse(&v).map_err(|_| ConfigError::InvalidOverride {
                name: "TRACEMAP_BIN_EDGES".to_string(),
                value: v,
            })?;
            self.classify.bin_edges = edges.into();
        }
        if let Some(v) = lookup("TRACEMAP_CENTER_LAT") {
            self.map.center_lat = parsed("TRACEMAP_CENTER_LAT", v)?;
        }
        if let Some(v) = lookup("TRACEMAP_CENTER_LON") {
            self.map.center_lon = parsed("TRACEMAP_CENTER_LON", v)?;
        }
        if let Some(v) = lookup("TRACEMAP_ZOOM") {
            self.map.zoom = parsed("TRACEMAP_ZOOM", v)?;
        }
        if let Some(v) = lookup("TRACEMAP_EXPORT_PATH") {
            self.export.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TRACEMAP_CACHE_CAPACITY") {
            self.cache.capacity = Some(parsed("TRACEMAP_CACHE_CAPACITY", v)?);
        }
        if let Some(v) = lookup("TRACEMAP_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("TRACEMAP_LOG_FORMAT") {
            self.logging.format = match v.trim().to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        name: "TRACEMAP_LOG_FORMAT".to_string(),
                        value: v,
                    })
                }
            };
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.input.band == 0 {
            return Err("input.band is 1-based and must be > 0".to_string());
        }

        self.bin_edges().map_err(|e| format!("classify.bin_edges: {}", e))?;
        self.palette().map_err(|e| format!("render.palette: {}", e))?;
        self.class_ramp(1)
            .and_then(|_| Self::parse_color("stroke", &self.render.stroke))
            .map_err(|e| format!("render ramp/stroke: {}", e))?;

        if !(0.0..=1.0).contains(&self.render.opacity) {
            return Err("render.opacity must be within 0-1".to_string());
        }
        if !(0.0..=1.0).contains(&self.render.fill_opacity) {
            return Err("render.fill_opacity must be within 0-1".to_string());
        }
        if self.render.vis_min >= self.render.vis_max {
            return Err("render.vis_min must be below render.vis_max".to_string());
        }

        if !(-90.0..=90.0).contains(&self.map.center_lat) {
            return Err("map.center_lat must be within -90..90".to_string());
        }
        if !(-180.0..=180.0).contains(&self.map.center_lon) {
            return Err("map.center_lon must be within -180..180".to_string());
        }
        if self.map.zoom > renderer::overlay::MAX_ZOOM {
            return Err(format!("map.zoom must be <= {}", renderer::overlay::MAX_ZOOM));
        }

        if self.cache.capacity == Some(0) {
            return Err("cache.capacity must be > 0".to_string());
        }
        if self.imagery.timeout_secs == 0 {
            return Err("imagery.timeout_secs must be > 0".to_string());
        }
        if self.imagery.base_url.is_some() {
            let query = self.imagery_query().map_err(|e| format!("imagery: {}", e))?;
            query.validate().map_err(|e| format!("imagery: {}", e))?;
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("logging.level '{}' is not a log level", other)),
        }
    }

    // ------------------------------------------------------------------------
    // Typed views
    // ------------------------------------------------------------------------

    pub fn bin_edges(&self) -> MapResult<BinEdges> {
        BinEdges::new(self.classify.bin_edges.clone())
    }

    pub fn palette(&self) -> MapResult<Palette> {
        Palette::from_names(self.render.palette.as_slice())
    }

    fn parse_color(field: &str, value: &str) -> MapResult<Color> {
        Color::parse(value)
            .ok_or_else(|| MapError::format(format!("{} colour '{}' is unknown", field, value)))
    }

    pub fn class_ramp(&self, class_count: u32) -> MapResult<ClassRamp> {
        Ok(ClassRamp::new(
            Self::parse_color("ramp_low", &self.render.ramp_low)?,
            Self::parse_color("ramp_high", &self.render.ramp_high)?,
            class_count,
        ))
    }

    /// Per-class shape styling: ramp fill plus the configured stroke.
    pub fn shape_styler(&self, class_count: u32) -> MapResult<impl Fn(u32) -> ShapeStyle> {
        let ramp = self.class_ramp(class_count)?;
        let stroke = Self::parse_color("stroke", &self.render.stroke)?.to_hex();
        let weight = self.render.stroke_weight;
        let fill_opacity = self.render.fill_opacity;
        Ok(move |class_value: u32| ShapeStyle {
            fill_color: ramp.fill(class_value).to_hex(),
            color: stroke.clone(),
            weight,
            fill_opacity,
        })
    }

    pub fn vis_params(&self) -> VisParams {
        VisParams {
            min: self.render.vis_min,
            max: self.render.vis_max,
            palette: self.render.palette.clone(),
        }
    }

    pub fn imagery_query(&self) -> MapResult<ImageryQuery> {
        let bbox = BoundingBox::parse(&self.imagery.bbox)
            .map_err(|e| MapError::invalid_parameter("imagery.bbox", e.to_string()))?;
        let query = ImageryQuery::new(
            self.imagery.collection.clone(),
            self.imagery.band.clone(),
            ImageryQuery::parse_date("imagery.start", &self.imagery.start)?,
            ImageryQuery::parse_date("imagery.end", &self.imagery.end)?,
            bbox,
        );
        Ok(query.with_reducer(self.imagery.reducer))
    }

    /// Client settings, or `None` when no API is configured.
    pub fn http_client_config(&self) -> Option<HttpClientConfig> {
        let base_url = self.imagery.base_url.clone()?;
        let mut config = HttpClientConfig::new(base_url);
        config.api_key = std::env::var(&self.imagery.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        config.timeout = Duration::from_secs(self.imagery.timeout_secs);
        Some(config)
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references. YAML comments are
/// copied through untouched.
fn expand_vars<F>(content: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        let (value, comment) = line.split_at(comment_start(line));
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| ConfigError::UnclosedVariable(after.chars().take(32).collect()))?;
            result.push_str(&resolve_var(&after[..end], lookup)?);
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        result.push_str(comment);
    }

    Ok(result)
}

/// Byte offset of a `#` comment in `line`, or its length when there is none.
/// A `#` opens a comment at the start of the line or after whitespace,
/// outside quoted scalars.
fn comment_start(line: &str) -> usize {
    let opens_token = |prev: Option<char>| prev.map_or(true, |p| p.is_whitespace() || "[{,".contains(p));
    let mut quote = None;
    let mut prev = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if opens_token(prev) => quote = Some(c),
            (None, '#') if prev.map_or(true, char::is_whitespace) => return i,
            _ => {}
        }
        prev = Some(c);
    }
    line.len()
}

fn resolve_var<F>(expr: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match expr.split_once(":-") {
        Some((name, default)) => Ok(lookup(name.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())),
        None => {
            let name = expr.trim();
            lookup(name).ok_or_else(|| ConfigError::UnsetVariable(name.to_string()))
        }
    }
}
