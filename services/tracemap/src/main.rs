//! tracemap command-line entry point.
//!
//! Loads or fetches a concentration raster, then classifies it into
//! polygons or renders it as an image overlay, and writes a map document
//! for the browser widget.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use classifier::BinEdges;
use tracemap::{ConfigError, LogFormat, Pipeline, RasterSource, TracemapConfig};
use vector_export::ExportFormat;

#[derive(Parser, Debug)]
#[command(name = "tracemap")]
#[command(about = "Classify and map trace-gas concentration rasters")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "TRACEMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a raster into binned polygons
    Classify {
        /// GeoTIFF input (default: input.path from the configuration)
        input: Option<PathBuf>,

        /// Classify the configured imagery query instead of a file
        #[arg(long, conflicts_with = "input")]
        from_imagery: bool,

        /// Bin edges, e.g. "0,0.25,0.5,0.75,1"
        #[arg(long)]
        bins: Option<String>,

        /// Merge each class into a single multi-polygon
        #[arg(long)]
        dissolve: bool,

        /// Map document output path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the polygons to this vector file
        #[arg(long)]
        export: Option<PathBuf>,

        /// Export format (geojson or geojsonseq)
        #[arg(long)]
        format: Option<ExportFormat>,
    },

    /// Render a raster through the colour palette as an image overlay
    Overlay {
        /// GeoTIFF input (default: input.path from the configuration)
        input: Option<PathBuf>,

        /// Render the configured imagery query instead of a file
        #[arg(long, conflicts_with = "input")]
        from_imagery: bool,

        /// Map document output path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PNG output path
        #[arg(long)]
        image: Option<PathBuf>,

        /// Overlay opacity (0-1)
        #[arg(long)]
        opacity: Option<f32>,
    },

    /// Query the imagery API and map its tile layer
    Fetch {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Day after the last (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// west,south,east,north in degrees
        #[arg(long)]
        bbox: Option<String>,

        /// Also render the aggregated grid as a local image overlay
        #[arg(long)]
        overlay: bool,

        /// Map document output path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// PNG output path when --overlay is set
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TracemapConfig::load(cli.config.as_deref()).context("Loading configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config);

    let source = apply_command(&mut config, &cli.command)?;
    config.validate().map_err(ConfigError::Invalid)?;

    info!(
        command = command_name(&cli.command),
        config = ?cli.config,
        "Starting tracemap"
    );

    let mut pipeline = Pipeline::new(config).context("Creating pipeline")?;

    match &cli.command {
        Command::Classify { .. } => {
            let outcome = pipeline.run_classify(&source).await?;
            println!(
                "{} polygons -> {}",
                outcome.layer.len(),
                outcome.document_path.display()
            );
            if let Some(path) = outcome.export_path {
                println!("exported -> {}", path.display());
            }
        }
        Command::Overlay { .. } => {
            let outcome = pipeline.run_overlay(&source).await?;
            println!(
                "overlay {} -> {}",
                outcome.image_path.display(),
                outcome.document_path.display()
            );
        }
        Command::Fetch { overlay, .. } => {
            let outcome = pipeline.run_fetch(*overlay).await?;
            println!(
                "{}x{} grid, tiles: {} -> {}",
                outcome.width,
                outcome.height,
                outcome.tile_url.as_deref().unwrap_or("none"),
                outcome.document_path.display()
            );
        }
    }

    Ok(())
}

/// Fold subcommand flags into the configuration and pick the raster source.
fn apply_command(config: &mut TracemapConfig, command: &Command) -> Result<RasterSource> {
    match command {
        Command::Classify {
            input,
            from_imagery,
            bins,
            dissolve,
            output,
            export,
            format,
        } => {
            if let Some(bins) = bins {
                let edges = BinEdges::parse(bins).context("Parsing --bins")?;
                config.classify.bin_edges = edges.into();
            }
            config.classify.dissolve |= *dissolve;
            set_if_some(&mut config.map.document_path, output);
            if export.is_some() {
                config.export.path = export.clone();
            }
            if format.is_some() {
                config.export.format = *format;
            }
            resolve_source(config, input, *from_imagery)
        }
        Command::Overlay {
            input,
            from_imagery,
            output,
            image,
            opacity,
        } => {
            set_if_some(&mut config.map.document_path, output);
            set_if_some(&mut config.render.image_path, image);
            set_if_some(&mut config.render.opacity, opacity);
            resolve_source(config, input, *from_imagery)
        }
        Command::Fetch {
            start,
            end,
            bbox,
            overlay: _,
            output,
            image,
        } => {
            set_if_some(&mut config.imagery.start, start);
            set_if_some(&mut config.imagery.end, end);
            set_if_some(&mut config.imagery.bbox, bbox);
            set_if_some(&mut config.map.document_path, output);
            set_if_some(&mut config.render.image_path, image);
            if config.imagery.base_url.is_none() {
                bail!("fetch needs imagery.base_url (or TRACEMAP_IMAGERY_URL)");
            }
            Ok(RasterSource::Imagery)
        }
    }
}

fn resolve_source(
    config: &TracemapConfig,
    input: &Option<PathBuf>,
    from_imagery: bool,
) -> Result<RasterSource> {
    if from_imagery {
        if config.imagery.base_url.is_none() {
            bail!("--from-imagery needs imagery.base_url (or TRACEMAP_IMAGERY_URL)");
        }
        return Ok(RasterSource::Imagery);
    }
    match input.as_ref().or(config.input.path.as_ref()) {
        Some(path) => Ok(RasterSource::File(path.clone())),
        None => bail!("No input raster: pass a path or set input.path"),
    }
}

fn set_if_some<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Classify { .. } => "classify",
        Command::Overlay { .. } => "overlay",
        Command::Fetch { .. } => "fetch",
    }
}

fn init_tracing(config: &TracemapConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}
