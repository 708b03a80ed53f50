//! `geoexport-core` is the export pipeline of the `GeoExport` project: it turns a
//! host feature layer into a zip archive of any format the conversion engine can write.
//!
//! This crate includes:
//! - **Driver Catalog** ([`drivers`]): the set of exportable formats, normalized from the engine's driver list.
//! - **Interchange Writer** ([`interchange`]): serializes a layer to a CRS-tagged `GeoJSON` file.
//! - **Format Converter** ([`converter`], [`engine`]): runs `ogr2ogr` with explicit reprojection.
//! - **Archive Builder** ([`archive`]): zips the converter output with legacy CP866 entry names.
//! - **Export Orchestrator** ([`operations`]): sequences the stages and owns temporary resources.

pub mod archive;
pub mod converter;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod interchange;
pub mod operations;
pub mod types;
pub mod utils;

pub use drivers::{DriverCatalog, DriverDescriptor};
pub use engine::Ogr2Ogr;
pub use error::{ExportError, Result};
pub use operations::Exporter;
pub use types::{ArchiveStream, ExportArchive, ExportSettings, ExportStage};
