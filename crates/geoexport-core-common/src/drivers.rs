//! Driver metadata reported by a conversion engine.
//!
//! The engine (for example `ogr2ogr`) registers one driver per file format. These
//! types describe a driver as the engine reports it, before any normalization
//! into canonical format identifiers.

/// Support status for a specific driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    /// The engine reports the operation as available.
    Supported,
    /// The engine reports the operation as unavailable.
    NotSupported,
    /// The engine did not report this capability.
    Unknown,
}

impl SupportStatus {
    /// Returns `true` if the operation is reported as supported.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, SupportStatus::Supported)
    }

    /// Returns `true` unless the operation is explicitly unsupported.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self, SupportStatus::NotSupported)
    }

    /// Returns the string representation of this support status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportStatus::Supported => "Supported",
            SupportStatus::NotSupported => "Not Supported",
            SupportStatus::Unknown => "Unknown",
        }
    }
}

/// Capabilities of an engine driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCapabilities {
    /// Support status for reading this format.
    pub read: SupportStatus,
    /// Support status for writing this format.
    pub write: SupportStatus,
}

impl DriverCapabilities {
    /// Capabilities for an engine that does not report them.
    pub const UNKNOWN: Self = Self {
        read: SupportStatus::Unknown,
        write: SupportStatus::Unknown,
    };
}

/// A driver as registered in the conversion engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDriver {
    /// Engine-specific driver name, e.g. `"ESRI Shapefile"`.
    pub name: String,
    /// Long descriptive name, e.g. `"ESRI Shapefile"` or `"Comma Separated Value (.csv)"`.
    pub long_name: String,
    /// Operations the engine supports for this driver.
    pub capabilities: DriverCapabilities,
}

impl EngineDriver {
    /// Creates a driver whose long name equals its short name and whose capabilities are unknown.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            long_name: name.clone(),
            name,
            capabilities: DriverCapabilities::UNKNOWN,
        }
    }

    /// Creates a fully described driver.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        long_name: impl Into<String>,
        read: SupportStatus,
        write: SupportStatus,
    ) -> Self {
        Self {
            name: name.into(),
            long_name: long_name.into(),
            capabilities: DriverCapabilities { read, write },
        }
    }
}
