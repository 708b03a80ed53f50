//! Data types for export jobs.
//!
//! This module defines the job lifecycle states, the per-job temporary workspace
//! and the finished archive handed back to the caller.

use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use log::{debug, warn};
use tempfile::{NamedTempFile, TempDir, TempPath};
use tokio_util::io::ReaderStream;

use crate::error::WorkspaceError;
use crate::interchange::INTERCHANGE_EXTENSION;
use crate::utils::file_stem_for;

/// Lifecycle state of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStage {
    /// Checking the requested format against the driver catalog.
    Validating,
    /// Writing the interchange file.
    Serializing,
    /// Running the conversion engine.
    Converting,
    /// Zipping the converter output.
    Archiving,
    /// Sending the archive to the client.
    Streaming,
    /// The archive was fully sent.
    Done,
    /// The job failed; temporary resources have been released.
    Failed,
}

impl ExportStage {
    /// Returns the lowercase name of the stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::Validating => "validating",
            ExportStage::Serializing => "serializing",
            ExportStage::Converting => "converting",
            ExportStage::Archiving => "archiving",
            ExportStage::Streaming => "streaming",
            ExportStage::Done => "done",
            ExportStage::Failed => "failed",
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStage::Done | ExportStage::Failed)
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by all export jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    /// Directory under which per-job working directories and archives are created.
    pub work_root: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir(),
        }
    }
}

/// Ephemeral state of one export request.
///
/// Owns the job's working directory; dropping the job deletes it. Call
/// [`ExportJob::cleanup`] to delete it explicitly and observe failures.
#[derive(Debug)]
pub struct ExportJob {
    /// Host resource identifier.
    pub resource_id: u64,
    /// Canonical target format.
    pub format: String,
    stem: String,
    work_dir: TempDir,
}

impl ExportJob {
    /// Creates the job and its uniquely named working directory under `work_root`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Create`] if the directory cannot be created.
    pub fn create(
        work_root: &Path,
        resource_id: u64,
        display_name: &str,
        format: &str,
    ) -> Result<Self, WorkspaceError> {
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("geoexport-{resource_id}-"))
            .tempdir_in(work_root)
            .map_err(|source| WorkspaceError::Create {
                root: work_root.to_path_buf(),
                source,
            })?;

        debug!(
            "Created working directory {} for resource {resource_id}",
            work_dir.path().display()
        );

        Ok(Self {
            resource_id,
            format: format.to_string(),
            stem: file_stem_for(display_name),
            work_dir,
        })
    }

    /// File-system safe base name shared by every output file.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// The job's working directory.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Path of the interchange file, `{stem}.json`.
    #[must_use]
    pub fn interchange_path(&self) -> PathBuf {
        self.work_dir
            .path()
            .join(format!("{}.{INTERCHANGE_EXTENSION}", self.stem))
    }

    /// Path the converter writes to, `{stem}.{format}`.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.work_dir
            .path()
            .join(format!("{}.{}", self.stem, self.format))
    }

    /// Deletes the working directory and everything left in it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if removal fails.
    pub fn cleanup(self) -> std::io::Result<()> {
        let path = self.work_dir.path().to_path_buf();
        self.work_dir.close()?;
        debug!("Removed working directory {}", path.display());
        Ok(())
    }
}

/// A finished export archive backed by a temporary file.
///
/// The file is deleted when the archive (or the stream made from it) is dropped.
#[derive(Debug)]
pub struct ExportArchive {
    file_name: String,
    len: u64,
    file: File,
    path: TempPath,
}

impl ExportArchive {
    /// Wraps a fully written temporary archive file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file metadata cannot be read.
    pub fn new(file_name: String, archive: NamedTempFile) -> std::io::Result<Self> {
        let (mut file, path) = archive.into_parts();
        let len = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            file_name,
            len,
            file,
            path,
        })
    }

    /// Download file name, `{display name}.{format}.zip`.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Archive size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the archive file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Location of the temporary archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the archive to `destination`, then deletes the temporary file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the copy fails; the temporary file is still deleted.
    pub async fn persist(self, destination: &Path) -> std::io::Result<u64> {
        let copied = tokio::fs::copy(&self.path, destination).await?;
        if let Err(e) = self.path.close() {
            warn!("Failed to remove temporary archive: {e}");
        }
        Ok(copied)
    }

    /// Turns the archive into a byte stream that deletes the file when dropped.
    #[must_use]
    pub fn into_stream(self) -> ArchiveStream {
        debug!("Streaming {} ({} bytes)", self.file_name, self.len);
        ArchiveStream {
            inner: ReaderStream::new(tokio::fs::File::from_std(self.file)),
            path: Some(self.path),
            file_name: self.file_name,
            finished: false,
        }
    }
}

/// Chunked reader over a temporary archive.
///
/// Dropping the stream deletes the archive, whether it was fully sent or the
/// transfer was cut short.
#[derive(Debug)]
pub struct ArchiveStream {
    inner: ReaderStream<tokio::fs::File>,
    path: Option<TempPath>,
    file_name: String,
    finished: bool,
}

impl Stream for ArchiveStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = polled {
            self.finished = true;
        }
        polled
    }
}

impl Drop for ArchiveStream {
    fn drop(&mut self) {
        let stage = if self.finished {
            ExportStage::Done
        } else {
            warn!("Transfer of {} ended before completion", self.file_name);
            ExportStage::Failed
        };
        debug!("{}: {} -> {stage}", self.file_name, ExportStage::Streaming);

        if let Some(path) = self.path.take() {
            let display = path.to_path_buf();
            if let Err(e) = path.close() {
                warn!("Failed to remove temporary archive {}: {e}", display.display());
            }
        }
    }
}
