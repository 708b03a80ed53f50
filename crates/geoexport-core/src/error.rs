//! Custom error types for `GeoExport` operations.
//!
//! This module provides structured error handling using `thiserror`. Each pipeline
//! stage has its own error enum, and [`ExportError`] wraps them so callers can map
//! a failure to the stage that produced it and to a user-facing message.

use std::path::PathBuf;

use geoexport_core_common::{EngineError, HostError};
use thiserror::Error;

use crate::types::ExportStage;

/// Main error type for export jobs.
///
/// Uses `#[error(transparent)]` to delegate display formatting to the
/// underlying stage error.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Format negotiation errors (unsupported format, engine discovery)
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Errors reported by the host application
    #[error(transparent)]
    Host(#[from] HostError),

    /// Temporary workspace errors
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Interchange file could not be produced
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The conversion engine failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The archive could not be assembled
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The job task ended without producing a result
    #[error("Export job aborted: {0}")]
    Aborted(String),
}

/// Format negotiation errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The requested format is not in the catalog
    #[error("Unsupported format '{format}'")]
    UnsupportedFormat {
        /// The requested canonical format
        format: String,
        /// Comma-separated list of supported formats
        available: String,
    },

    /// The engine's driver list could not be read
    #[error("Failed to discover engine drivers: {0}")]
    Discovery(#[from] EngineError),
}

/// Errors creating the per-job working directory.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Failed to create the temporary directory
    #[error("Failed to create working directory under '{root}': {source}")]
    Create {
        /// The configured work root
        root: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Interchange file errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// An attribute value is not a scalar
    #[error("Attribute '{attribute}' of feature {} is not a scalar value ({found})", feature.map(|id| id.to_string()).unwrap_or_else(|| "without id".to_string()))]
    InvalidAttribute {
        /// The feature identifier, if any
        feature: Option<i64>,
        /// The attribute name
        attribute: String,
        /// JSON type found instead of a scalar
        found: &'static str,
    },

    /// The document could not be encoded
    #[error("Failed to encode interchange document: {0}")]
    Encode(#[from] serde_json::Error),

    /// The document could not be written
    #[error("Failed to write interchange file '{path}': {source}")]
    Write {
        /// The interchange file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Conversion engine errors.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The engine exited with a non-zero status
    #[error("Conversion to '{driver}' failed with exit code {}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none (terminated)".to_string()))]
    Failed {
        /// The engine driver name
        driver: String,
        /// The exit code, `None` if terminated by a signal
        exit_code: Option<i32>,
        /// Captured standard error output
        stderr: String,
    },

    /// The engine could not be run
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The interchange file could not be removed after conversion
    #[error("Failed to remove interchange file '{path}': {source}")]
    RemoveInterchange {
        /// The interchange file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Archive assembly errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// A file name has no representation in the archive code page
    #[error("File name '{name}' cannot be encoded in CP866")]
    UnencodableName {
        /// The offending name
        name: String,
    },

    /// A file name on disk is not valid UTF-8
    #[error("File name {name:?} is not valid UTF-8")]
    NonUtf8Name {
        /// Lossy rendering of the name
        name: String,
    },

    /// The conversion produced no files
    #[error("No output files found in '{path}'")]
    Empty {
        /// The directory that was scanned
        path: PathBuf,
    },

    /// A file could not be read or the archive could not be written
    #[error("Archive I/O failed for '{path}': {source}")]
    Io {
        /// The file involved
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The zip writer failed
    #[error("Failed to write zip archive: {0}")]
    Zip(#[from] async_zip::error::ZipError),
}

/// Type alias for Results using `ExportError`.
pub type Result<T> = std::result::Result<T, ExportError>;

impl ExportError {
    /// The pipeline stage this error belongs to.
    #[must_use]
    pub fn stage(&self) -> ExportStage {
        match self {
            Self::Driver(_) => ExportStage::Validating,
            Self::Host(HostError::Query { .. }) => ExportStage::Serializing,
            Self::Host(_) => ExportStage::Validating,
            Self::Workspace(_) | Self::Serialization(_) => ExportStage::Serializing,
            Self::Conversion(_) => ExportStage::Converting,
            Self::Archive(_) | Self::Aborted(_) => ExportStage::Archiving,
        }
    }

    /// Returns `true` if the request itself is at fault (unsupported format).
    #[must_use]
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::Driver(DriverError::UnsupportedFormat { .. }))
    }

    /// Get a user-friendly error message.
    ///
    /// Engine diagnostics and file system paths are left out; they go to the log.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Driver(e) => e.user_message(),
            Self::Host(e) => e.to_string(),
            Self::Workspace(_) => "Could not prepare the export workspace.".to_string(),
            Self::Serialization(e) => format!("Could not serialize layer features: {}", e.summary()),
            Self::Conversion(e) => e.user_message(),
            Self::Archive(e) => format!("Could not build the export archive: {}", e.summary()),
            Self::Aborted(_) => "The export job was aborted.".to_string(),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Driver(DriverError::UnsupportedFormat { .. }) => {
                Some("Request one of the formats listed at /ogr_export/formats.".to_string())
            },
            Self::Archive(ArchiveError::UnencodableName { .. }) => {
                Some("Rename the layer using Latin or Cyrillic characters.".to_string())
            },
            Self::Conversion(ConversionError::Engine(EngineError::Spawn { .. }))
            | Self::Driver(DriverError::Discovery(EngineError::Spawn { .. })) => {
                Some("Check that ogr2ogr is installed and engine.program is correct.".to_string())
            },
            _ => None,
        }
    }
}

impl DriverError {
    fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat { format, available } => {
                format!("Unsupported format '{format}'. Supported formats: {available}")
            },
            Self::Discovery(_) => "The conversion engine is unavailable.".to_string(),
        }
    }
}

impl SerializationError {
    fn summary(&self) -> String {
        match self {
            Self::InvalidAttribute { .. } => self.to_string(),
            Self::Encode(_) => "encoding failed".to_string(),
            Self::Write { .. } => "write failed".to_string(),
        }
    }
}

impl ConversionError {
    fn user_message(&self) -> String {
        match self {
            Self::Failed { driver, .. } => format!("Conversion to '{driver}' failed."),
            Self::Engine(EngineError::TimedOut { after, .. }) => {
                format!("Conversion did not finish within {}s.", after.as_secs())
            },
            Self::Engine(_) => "The conversion engine could not be run.".to_string(),
            Self::RemoveInterchange { .. } => "Conversion cleanup failed.".to_string(),
        }
    }
}

impl ArchiveError {
    fn summary(&self) -> String {
        match self {
            Self::UnencodableName { .. } | Self::Empty { .. } => self.to_string(),
            Self::NonUtf8Name { .. } => "output file name is not valid UTF-8".to_string(),
            Self::Io { .. } | Self::Zip(_) => "write failed".to_string(),
        }
    }
}

/// Helper to create `DriverError::UnsupportedFormat` listing the supported formats.
#[must_use]
pub fn unsupported_format(format: &str, supported: &[&str]) -> DriverError {
    DriverError::UnsupportedFormat {
        format: format.to_string(),
        available: supported.join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unsupported_format_message() {
        let err: ExportError = unsupported_format("bogus", &["csv", "shp"]).into();
        assert!(err.is_unsupported_format());
        assert_eq!(err.stage(), ExportStage::Validating);
        assert_eq!(err.to_string(), "Unsupported format 'bogus'");
        assert_eq!(
            err.user_message(),
            "Unsupported format 'bogus'. Supported formats: csv, shp"
        );
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_conversion_failure_hides_stderr_from_user() {
        let err: ExportError = ConversionError::Failed {
            driver: "ESRI Shapefile".to_string(),
            exit_code: Some(1),
            stderr: "ERROR 1: /tmp/secret/path".to_string(),
        }
        .into();

        assert_eq!(err.stage(), ExportStage::Converting);
        assert_eq!(
            err.to_string(),
            "Conversion to 'ESRI Shapefile' failed with exit code 1"
        );
        assert!(!err.user_message().contains("/tmp"));
    }

    #[test]
    fn test_timeout_message() {
        let err: ExportError = ConversionError::Engine(EngineError::TimedOut {
            program: PathBuf::from("ogr2ogr"),
            after: Duration::from_secs(5),
        })
        .into();
        assert_eq!(err.user_message(), "Conversion did not finish within 5s.");
    }

    #[test]
    fn test_host_error_stages() {
        let denied: ExportError = HostError::PermissionDenied { id: 1 }.into();
        let query: ExportError = HostError::Query {
            id: 1,
            message: "db down".to_string(),
        }
        .into();
        assert_eq!(denied.stage(), ExportStage::Validating);
        assert_eq!(query.stage(), ExportStage::Serializing);
    }

    #[test]
    fn test_invalid_attribute_message() {
        let err = SerializationError::InvalidAttribute {
            feature: Some(4),
            attribute: "tags".to_string(),
            found: "array",
        };
        assert_eq!(
            err.to_string(),
            "Attribute 'tags' of feature 4 is not a scalar value (array)"
        );
    }
}
