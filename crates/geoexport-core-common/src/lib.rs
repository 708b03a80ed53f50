//! Common types and traits shared across `GeoExport` crates.
//!
//! This crate provides the feature data model and the collaborator contracts
//! (host layers, permissions, conversion engine) that `geoexport-core` consumes
//! and that hosts and engine bindings implement.

pub mod drivers;
pub mod error;
pub mod features;
pub mod io;

// Re-export commonly used types
pub use drivers::{DriverCapabilities, EngineDriver, SupportStatus};
pub use error::{EngineError, HostError};
pub use features::{
    Attributes, Crs, Feature, FeatureCollection, FeatureQuery, WEB_MERCATOR, WGS84,
};
pub use io::{
    ConversionEngine, ConversionOutcome, ConversionRequest, FeatureLayer, Permission, Principal,
    ResourceProvider,
};
