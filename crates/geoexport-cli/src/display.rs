//! Display utilities for formatting CLI output.

use tabled::{Table, Tabled};

use geoexport_core::DriverCatalog;

/// Table row representation for displaying an exportable format.
#[derive(Tabled)]
pub struct FormatRow {
    /// Canonical identifier used in export requests (e.g. `shp`).
    #[tabled(rename = "Format")]
    pub format: String,
    /// Engine driver name (e.g. `ESRI Shapefile`).
    #[tabled(rename = "Driver")]
    pub driver: String,
    /// Full descriptive name of the driver format.
    #[tabled(rename = "Long Name")]
    pub long_name: String,
    /// Write support as reported by the engine.
    #[tabled(rename = "Write")]
    pub write: String,
}

/// Builds one row per exportable format, sorted by identifier.
pub fn format_rows(catalog: &DriverCatalog) -> Vec<FormatRow> {
    catalog
        .descriptors()
        .map(|d| FormatRow {
            format: d.canonical_name.clone(),
            driver: d.engine_name.clone(),
            long_name: d.long_name.clone(),
            write: d.write.as_str().to_string(),
        })
        .collect()
}

/// Prints the exportable formats as a table on standard output.
pub fn display_formats(catalog: &DriverCatalog) {
    println!("\nExportable Formats ({} total):\n", catalog.len());
    println!("{}", Table::new(format_rows(catalog)));
}

/// Prints a one-line summary of a written archive.
pub fn display_export_summary(file_name: &str, len: u64, destination: &std::path::Path) {
    println!("Wrote {file_name} ({len} bytes) to {}", destination.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoexport_core_common::{EngineDriver, SupportStatus};

    #[test]
    fn test_format_rows() {
        let catalog = DriverCatalog::from_drivers([
            EngineDriver::new(
                "MapInfo File",
                "MapInfo File",
                SupportStatus::Supported,
                SupportStatus::Supported,
            ),
            EngineDriver::named("CSV"),
        ]);

        let rows = format_rows(&catalog);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].format, "csv");
        assert_eq!(rows[0].write, SupportStatus::Unknown.as_str());
        assert_eq!(rows[1].format, "tab");
        assert_eq!(rows[1].driver, "MapInfo File");
        assert_eq!(rows[1].write, SupportStatus::Supported.as_str());
    }

    #[test]
    fn test_display_formats_empty() {
        // Ensures an empty catalog renders without panicking
        display_formats(&DriverCatalog::default());
    }
}
