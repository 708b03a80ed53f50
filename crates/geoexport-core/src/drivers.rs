//! Driver catalog: the set of formats a layer can be exported to.
//!
//! The catalog is built once from the conversion engine's driver list. Engine
//! driver names are lowercased and a few long names are remapped to their
//! conventional file extensions, producing the *canonical format identifiers*
//! used in request paths (`shp`, `csv`, `tab`, `kml`, ...). Drivers that cannot
//! produce a single-file export are excluded.
//!
//! # Examples
//!
//! ```
//! use geoexport_core::drivers::DriverCatalog;
//! use geoexport_core_common::EngineDriver;
//!
//! let catalog = DriverCatalog::from_drivers([
//!     EngineDriver::named("ESRI Shapefile"),
//!     EngineDriver::named("PostgreSQL"),
//!     EngineDriver::named("CSV"),
//! ]);
//!
//! assert!(catalog.is_supported("shp"));
//! assert!(!catalog.is_supported("postgresql"));
//! assert_eq!(catalog.resolve_engine_name("shp"), "ESRI Shapefile");
//! ```

use std::collections::BTreeMap;

use geoexport_core_common::{ConversionEngine, EngineDriver, SupportStatus};
use log::{debug, info};

use crate::error::{DriverError, ExportError};

/// Lowercase engine driver names remapped to short conventional extensions.
pub const FORMAT_REPLACEMENTS: &[(&str, &str)] = &[
    ("esri shapefile", "shp"),
    ("mapinfo file", "tab"),
    ("geoconcept", "gxt"),
    ("interlis 1", "itf"),
    ("interlis 2", "xtf"),
    ("gpstrackmaker", "gtm"),
];

/// Lowercase driver names that are never offered for export: database and
/// network drivers, in-memory or virtual drivers, read-mostly exotic formats and
/// formats that do not make sense as a single downloadable file.
pub const EXCLUDED_DRIVERS: &[&str] = &[
    "htf",
    "openair",
    "segy",
    "arcgen",
    "aeronavfaa",
    "mssqlspatial",
    "gme",
    "cartodb",
    "mysql",
    "edigeo",
    "uk .ntf",
    "s57",
    "nas",
    "idrisi",
    "memory",
    "xplane",
    "rec",
    "couchdb",
    "vrt",
    "avcbin",
    "walk",
    "vfk",
    "tiger",
    "segukooa",
    "pds",
    "wfs",
    "openfilegdb",
    "avce00",
    "geomedia",
    "ogdi",
    "postgresql",
    "sua",
    "gpsbabel",
    "svg",
    "odbc",
    "dods",
    "elasticsearch",
    "osm",
    "xls",
    "sdts",
];

/// Normalizes an engine driver name into a canonical format identifier.
///
/// ```
/// use geoexport_core::drivers::canonical_name;
///
/// assert_eq!(canonical_name("ESRI Shapefile"), "shp");
/// assert_eq!(canonical_name("GeoJSON"), "geojson");
/// ```
#[must_use]
pub fn canonical_name(engine_name: &str) -> String {
    let lower = engine_name.to_lowercase();
    FORMAT_REPLACEMENTS
        .iter()
        .find(|(long, _)| *long == lower)
        .map_or(lower, |(_, short)| (*short).to_string())
}

/// Maps a canonical identifier back to an engine driver name using the static
/// remapping table only. Identifiers that were never remapped come back unchanged.
///
/// ```
/// use geoexport_core::drivers::engine_name_for;
///
/// assert_eq!(engine_name_for("tab"), "mapinfo file");
/// assert_eq!(engine_name_for("kml"), "kml");
/// ```
#[must_use]
pub fn engine_name_for(canonical: &str) -> &str {
    FORMAT_REPLACEMENTS
        .iter()
        .find(|(_, short)| *short == canonical)
        .map_or(canonical, |(long, _)| *long)
}

/// Returns `true` if the name (engine or canonical, any case) is on the exclusion list.
#[must_use]
pub fn is_excluded(name: &str) -> bool {
    let lower = name.to_lowercase();
    EXCLUDED_DRIVERS.contains(&lower.as_str())
}

/// An exportable format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDescriptor {
    /// Canonical format identifier used in request paths (e.g. `"shp"`).
    pub canonical_name: String,
    /// Driver name as the engine reports it (e.g. `"ESRI Shapefile"`).
    pub engine_name: String,
    /// Long descriptive name.
    pub long_name: String,
    /// Write support reported by the engine.
    pub write: SupportStatus,
}

/// Immutable catalog of exportable formats, keyed by canonical identifier.
#[derive(Debug, Clone, Default)]
pub struct DriverCatalog {
    drivers: BTreeMap<String, DriverDescriptor>,
}

impl DriverCatalog {
    /// Builds a catalog from engine drivers.
    ///
    /// Excluded drivers and drivers reported as read-only are skipped. When two
    /// engine drivers normalize to the same identifier the first one wins.
    pub fn from_drivers(drivers: impl IntoIterator<Item = EngineDriver>) -> Self {
        let mut catalog = BTreeMap::new();

        for driver in drivers {
            let canonical = canonical_name(&driver.name);

            if is_excluded(&driver.name) || is_excluded(&canonical) {
                debug!("Skipping excluded driver '{}'", driver.name);
                continue;
            }
            if !driver.capabilities.write.is_available() {
                debug!("Skipping read-only driver '{}'", driver.name);
                continue;
            }

            catalog
                .entry(canonical.clone())
                .or_insert_with(|| DriverDescriptor {
                    canonical_name: canonical,
                    engine_name: driver.name,
                    long_name: driver.long_name,
                    write: driver.capabilities.write,
                });
        }

        Self { drivers: catalog }
    }

    /// Queries the engine for its drivers and builds the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Discovery`] if the engine cannot list its drivers.
    pub async fn discover(engine: &dyn ConversionEngine) -> Result<Self, ExportError> {
        let drivers = engine.list_drivers().await.map_err(DriverError::from)?;
        let total = drivers.len();
        let catalog = Self::from_drivers(drivers);
        info!(
            "Driver catalog ready: {} exportable format(s) out of {total} engine driver(s)",
            catalog.len()
        );
        Ok(catalog)
    }

    /// Number of exportable formats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns `true` if no format is exportable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Canonical identifiers of all exportable formats, sorted.
    #[must_use]
    pub fn supported_formats(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    /// Returns `true` if `format` is an exportable canonical identifier.
    ///
    /// Matching is exact: canonical identifiers are lowercase.
    #[must_use]
    pub fn is_supported(&self, format: &str) -> bool {
        self.drivers.contains_key(format)
    }

    /// Looks up the descriptor for a canonical identifier.
    #[must_use]
    pub fn find(&self, format: &str) -> Option<&DriverDescriptor> {
        self.drivers.get(format)
    }

    /// All descriptors, sorted by canonical identifier.
    pub fn descriptors(&self) -> impl Iterator<Item = &DriverDescriptor> {
        self.drivers.values()
    }

    /// Resolves the engine driver name for a canonical identifier.
    ///
    /// Uses the name the engine reported; identifiers not in the catalog fall back
    /// to the static reverse lookup.
    #[must_use]
    pub fn resolve_engine_name<'a>(&'a self, format: &'a str) -> &'a str {
        self.find(format)
            .map_or_else(|| engine_name_for(format), |d| d.engine_name.as_str())
    }
}
