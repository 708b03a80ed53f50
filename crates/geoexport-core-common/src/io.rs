//! Collaborator traits consumed by the export pipeline.
//!
//! The pipeline never talks to the host application or the conversion engine
//! directly. Hosts implement [`ResourceProvider`] and [`FeatureLayer`]; engine
//! bindings implement [`ConversionEngine`].

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::drivers::EngineDriver;
use crate::error::{EngineError, HostError};
use crate::features::{Crs, FeatureCollection, FeatureQuery};

/// A vector layer that can be queried for features.
#[async_trait]
pub trait FeatureLayer: Send + Sync {
    /// Host resource identifier.
    fn id(&self) -> u64;

    /// Human-readable name used for output file names.
    fn display_name(&self) -> &str;

    /// Runs a feature query. Geometries are returned in `EPSG:3857`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Query`] if the features cannot be read.
    async fn feature_query(&self, query: FeatureQuery) -> Result<FeatureCollection, HostError>;
}

/// Access level requested on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Read the layer's data.
    Read,
}

/// Credentials presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// Bearer token, if one was supplied.
    pub token: Option<String>,
}

impl Principal {
    /// A principal without credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A principal identified by a bearer token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

/// Host resource and permission service.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Resolves a resource identifier to a feature layer.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotFound`] for unknown identifiers.
    async fn feature_layer(&self, id: u64) -> Result<Arc<dyn FeatureLayer>, HostError>;

    /// Checks that `principal` holds `permission` on `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Unauthenticated`] or [`HostError::PermissionDenied`].
    async fn authorize(
        &self,
        layer: &dyn FeatureLayer,
        principal: &Principal,
        permission: Permission,
    ) -> Result<(), HostError>;
}

/// One invocation of the conversion engine.
///
/// Reprojection parameters are always explicit: the request carries both the
/// source and the target CRS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Engine driver name of the target format.
    pub driver: String,
    /// Path of the file to produce.
    pub output: PathBuf,
    /// Path of the interchange file to read.
    pub input: PathBuf,
    /// CRS of the input coordinates.
    pub source_crs: Crs,
    /// CRS of the output coordinates.
    pub target_crs: Crs,
    /// Format-specific extra arguments.
    pub options: Vec<String>,
}

impl ConversionRequest {
    /// Builds the engine argument list.
    ///
    /// The order is `-f DRIVER OUTPUT INPUT -s_srs SRC -t_srs DST [options...]`.
    /// Paths are passed as OS strings so non-ASCII file names survive unchanged.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            self.driver.clone().into(),
            self.output.clone().into_os_string(),
            self.input.clone().into_os_string(),
            "-s_srs".into(),
            self.source_crs.identifier().into(),
            "-t_srs".into(),
            self.target_crs.identifier().into(),
        ];
        args.extend(self.options.iter().map(OsString::from));
        args
    }
}

/// Result of a finished engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard error output.
    pub stderr: String,
}

impl ConversionOutcome {
    /// Returns `true` if the process exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// External geometry-conversion engine.
///
/// The default binding shells out to `ogr2ogr`; a direct library binding can
/// replace it without touching the rest of the pipeline.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Lists the drivers registered in the engine.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the engine cannot be queried.
    async fn list_drivers(&self) -> Result<Vec<EngineDriver>, EngineError>;

    /// Runs one conversion to completion.
    ///
    /// A non-zero exit is reported through [`ConversionOutcome`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the process cannot be started or times out.
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome, EngineError>;
}
