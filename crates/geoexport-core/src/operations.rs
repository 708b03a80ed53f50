//! Export orchestration.
//!
//! This module sequences the pipeline stages for one request (serialize, convert,
//! archive) and owns every temporary resource the stages create. The working
//! directory is removed whether the job succeeds or fails; on success the only
//! file left behind is the archive, which is deleted once it has been streamed.

use std::sync::Arc;

use geoexport_core_common::{ConversionEngine, FeatureLayer};
use log::{debug, error, info, warn};
use tempfile::NamedTempFile;

use crate::archive::build_archive;
use crate::converter::{self, requires_single_part};
use crate::drivers::DriverCatalog;
use crate::error::{ArchiveError, ConversionError, ExportError, Result, unsupported_format};
use crate::interchange::write_interchange;
use crate::types::{ExportArchive, ExportJob, ExportSettings, ExportStage};
use crate::utils::archive_file_name;

/// Runs export jobs against a fixed driver catalog and conversion engine.
///
/// Cheap to clone; clones share the catalog and the engine.
#[derive(Clone)]
pub struct Exporter {
    catalog: Arc<DriverCatalog>,
    engine: Arc<dyn ConversionEngine>,
    settings: ExportSettings,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("formats", &self.catalog.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Creates an exporter from an already built catalog.
    pub fn new(
        catalog: DriverCatalog,
        engine: Arc<dyn ConversionEngine>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            engine,
            settings,
        }
    }

    /// Builds the catalog by querying `engine`, then creates the exporter.
    ///
    /// # Errors
    ///
    /// Returns a discovery error if the engine cannot list its drivers.
    pub async fn discover(
        engine: Arc<dyn ConversionEngine>,
        settings: ExportSettings,
    ) -> Result<Self> {
        let catalog = DriverCatalog::discover(engine.as_ref()).await?;
        Ok(Self::new(catalog, engine, settings))
    }

    /// The driver catalog this exporter validates against.
    #[must_use]
    pub fn catalog(&self) -> &DriverCatalog {
        &self.catalog
    }

    /// Settings shared by every job.
    #[must_use]
    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Checks `format` against the catalog. Touches nothing on disk.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-format error listing the exportable formats.
    pub fn validate_format(&self, format: &str) -> Result<()> {
        if self.catalog.is_supported(format) {
            return Ok(());
        }
        warn!("Rejected export to unsupported format '{format}'");
        Err(unsupported_format(format, &self.catalog.supported_formats()).into())
    }

    /// Exports `layer` as `format` and returns the finished archive.
    ///
    /// The job runs on its own task: if the caller goes away mid-job, the job
    /// still runs to completion and releases its working directory. Permission
    /// checks are the caller's responsibility and must happen before this call.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub async fn export(&self, layer: Arc<dyn FeatureLayer>, format: &str) -> Result<ExportArchive> {
        self.validate_format(format)?;

        let exporter = self.clone();
        let format = format.to_string();
        tokio::spawn(async move { exporter.run_job(layer, &format).await })
            .await
            .map_err(|e| ExportError::Aborted(e.to_string()))?
    }

    async fn run_job(&self, layer: Arc<dyn FeatureLayer>, format: &str) -> Result<ExportArchive> {
        let resource_id = layer.id();
        info!(
            "Exporting resource {resource_id} ('{}') as {format}",
            layer.display_name()
        );

        let job = ExportJob::create(
            &self.settings.work_root,
            resource_id,
            layer.display_name(),
            format,
        )
        .inspect_err(|e| error!("Export of resource {resource_id} failed while serializing: {e}"))?;

        let result = self.run_stages(&job, layer.as_ref()).await;

        let work_dir = job.work_dir().to_path_buf();
        if let Err(e) = job.cleanup() {
            warn!(
                "Failed to remove working directory {}: {e}",
                work_dir.display()
            );
        }

        let archive = match result {
            Ok(archive) => archive,
            Err(e) => {
                error!(
                    "Export of resource {resource_id} failed while {}: {e}",
                    e.stage()
                );
                debug!("Resource {resource_id}: {} -> {}", e.stage(), ExportStage::Failed);
                return Err(e);
            },
        };

        let file_name = archive_file_name(layer.display_name(), format);
        let path = archive.path().to_path_buf();
        let archive = ExportArchive::new(file_name, archive)
            .map_err(|source| ArchiveError::Io { path, source })?;

        info!(
            "Export of resource {resource_id} ready: {} ({} bytes)",
            archive.file_name(),
            archive.len()
        );
        Ok(archive)
    }

    async fn run_stages(&self, job: &ExportJob, layer: &dyn FeatureLayer) -> Result<NamedTempFile> {
        let id = job.resource_id;

        enter(id, ExportStage::Serializing);
        let interchange = job.interchange_path();
        write_interchange(layer, &interchange, requires_single_part(&job.format)).await?;

        enter(id, ExportStage::Converting);
        converter::convert(
            self.engine.as_ref(),
            &self.catalog,
            &interchange,
            &job.output_path(),
            &job.format,
        )
        .await?;

        // Only converter output may end up in the archive.
        tokio::fs::remove_file(&interchange)
            .await
            .map_err(|source| ConversionError::RemoveInterchange {
                path: interchange.clone(),
                source,
            })?;

        enter(id, ExportStage::Archiving);
        let work_root = &self.settings.work_root;
        let io_error = |source| ArchiveError::Io {
            path: work_root.clone(),
            source,
        };
        let archive = tempfile::Builder::new()
            .prefix(&format!("geoexport-{id}-"))
            .suffix(".zip")
            .tempfile_in(work_root)
            .map_err(io_error)?;

        let mut file = tokio::fs::File::from_std(archive.as_file().try_clone().map_err(io_error)?);
        build_archive(job.work_dir(), job.stem(), &mut file).await?;
        file.sync_all().await.map_err(io_error)?;

        Ok(archive)
    }
}

fn enter(resource_id: u64, stage: ExportStage) {
    debug!("Resource {resource_id}: entering {stage}");
}
