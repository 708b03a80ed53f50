//! Command-line interface for `GeoExport`, which packages GIS vector layers as
//! zip archives in any format `ogr2ogr` can write.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for structured logging.
//! Library crates log through the `log` facade; [`LogTracer`] forwards those records to the
//! subscriber installed here.
//!
//! # Available Commands
//!
//! - `serve` - Run the HTTP export service
//! - `formats` - List the formats layers can be exported to
//! - `export` - Export a local GeoJSON layer without running the server

mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::filter::LevelFilter;

use geoexport_core::engine::{DEFAULT_PROGRAM, DEFAULT_TIMEOUT};
use geoexport_core::{DriverCatalog, ExportError, ExportSettings, Exporter, Ogr2Ogr};
use geoexport_http::{AppConfig, GeoJsonFileLayer, load_config};

#[derive(Parser)]
#[command(
    name = "geoexport",
    version,
    about = "Export GIS vector layers as zipped files in any OGR format",
    long_about = "GeoExport serves GET /resource/{id}/ogr_export/{fmt}: it converts a layer with \
                  ogr2ogr, reprojecting to EPSG:4326, and streams the result as a zip archive."
)]
/// Command-line arguments and options for the `GeoExport` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `GeoExport` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Runs the HTTP export service.
    Serve {
        /// TOML configuration file; `GEOEXPORT__*` environment variables override it.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Lists the formats layers can be exported to.
    Formats {
        /// The `ogr2ogr` executable to query.
        #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_PROGRAM)]
        program: PathBuf,
    },

    /// Exports a GeoJSON file (coordinates in EPSG:3857) to a zip archive.
    Export {
        /// Path to the input GeoJSON layer.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Layer display name, used for the files inside the archive.
        #[arg(short, long)]
        name: String,

        /// Canonical target format (e.g. "shp", "csv", "kml").
        #[arg(short, long, value_name = "FMT")]
        format: String,

        /// Where to write the archive. Defaults to `{name}.{format}.zip`.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// The `ogr2ogr` executable to run.
        #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_PROGRAM)]
        program: PathBuf,

        /// Conversion timeout in seconds.
        #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,

        /// Directory for temporary files. Defaults to the system temp dir.
        #[arg(long, value_name = "DIR")]
        work_root: Option<PathBuf>,
    },
}

/// Entry point for the `GeoExport` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `serve` reads its default level from the configuration file.
    let config = match &cli.command {
        Commands::Serve { config } => Some(load_config(config.as_deref()).map_err(|e| anyhow!(e))?),
        _ => None,
    };

    let log_level = if cli.debug {
        LevelFilter::DEBUG
    } else if cli.verbose {
        LevelFilter::INFO
    } else if let Some(cfg) = &config {
        cfg.logging
            .level
            .parse()
            .with_context(|| format!("invalid logging.level '{}'", cfg.logging.level))?
    } else {
        LevelFilter::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true) // Show module paths for better context
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { .. } => {
            let cfg = config.context("configuration not loaded")?;
            handle_serve(cfg).await?;
        },
        Commands::Formats { program } => {
            handle_formats(&program).await?;
        },
        Commands::Export {
            input,
            name,
            format,
            output,
            program,
            timeout,
            work_root,
        } => {
            info!("Exporting {} as {format}", input.display());
            let engine = Ogr2Ogr::new(program).with_timeout(Duration::from_secs(timeout));
            let settings = work_root.map_or_else(ExportSettings::default, |work_root| {
                ExportSettings { work_root }
            });
            handle_export(engine, settings, &input, &name, &format, output.as_deref()).await?;
        },
    }

    Ok(())
}

async fn handle_serve(cfg: AppConfig) -> Result<()> {
    info!(
        "Starting export service on {} with {} layer(s)",
        cfg.addr(),
        cfg.layers.len()
    );
    geoexport_http::run(cfg).await
}

/// Handles the `formats` subcommand by querying the engine and printing a table.
async fn handle_formats(program: &Path) -> Result<()> {
    let engine = Ogr2Ogr::new(program);
    let catalog = DriverCatalog::discover(&engine)
        .await
        .map_err(describe)?;
    display::display_formats(&catalog);
    Ok(())
}

async fn handle_export(
    engine: Ogr2Ogr,
    settings: ExportSettings,
    input: &Path,
    name: &str,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    if !input.is_file() {
        return Err(anyhow!("Input file '{}' not found.", input.display()));
    }

    let exporter = Exporter::discover(Arc::new(engine), settings)
        .await
        .map_err(describe)?;
    let layer = GeoJsonFileLayer::new(0, name, input);
    let archive = exporter
        .export(Arc::new(layer), format)
        .await
        .map_err(describe)?;

    let destination = output.map_or_else(|| PathBuf::from(archive.file_name()), Path::to_path_buf);
    let file_name = archive.file_name().to_string();
    let len = archive.len();
    debug!("Persisting {} to {}", archive.path().display(), destination.display());

    archive
        .persist(&destination)
        .await
        .with_context(|| format!("failed to write {}", destination.display()))?;
    display::display_export_summary(&file_name, len, &destination);
    info!("Export complete.");
    Ok(())
}

/// Turns a pipeline error into the message shown to the user.
fn describe(err: ExportError) -> anyhow::Error {
    debug!("{err:?}");
    match err.recovery_suggestion() {
        Some(hint) => anyhow!("{}\nHint: {hint}", err.user_message()),
        None => anyhow!("{}", err.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_export() {
        let cli = Cli::try_parse_from([
            "geoexport", "export", "-i", "roads.geojson", "-n", "Roads", "-f", "shp",
        ])
        .unwrap();
        match cli.command {
            Commands::Export {
                input,
                name,
                format,
                output,
                program,
                timeout,
                work_root,
            } => {
                assert_eq!(input, PathBuf::from("roads.geojson"));
                assert_eq!(name, "Roads");
                assert_eq!(format, "shp");
                assert!(output.is_none());
                assert_eq!(program, PathBuf::from("ogr2ogr"));
                assert_eq!(timeout, 300);
                assert!(work_root.is_none());
            },
            _ => panic!("expected export"),
        }
    }

    #[tokio::test]
    async fn test_handle_export_missing_input() {
        let dir = TempDir::new().unwrap();
        let result = handle_export(
            Ogr2Ogr::default(),
            ExportSettings::default(),
            &dir.path().join("missing.geojson"),
            "Roads",
            "shp",
            None,
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_handle_export_missing_engine() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("roads.geojson");
        std::fs::write(&input, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();

        let result = handle_export(
            Ogr2Ogr::new(dir.path().join("no-ogr2ogr")),
            ExportSettings {
                work_root: dir.path().to_path_buf(),
            },
            &input,
            "Roads",
            "shp",
            None,
        )
        .await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("conversion engine is unavailable"), "{message}");
    }
}
