//! Archive builder: packs the converter output into a zip archive.
//!
//! Every file lands under a single folder named after the layer, so a
//! multi-file format such as a shapefile unpacks into one directory.
//!
//! Entry names are encoded in CP866 and stored without the UTF-8 flag. This is
//! a compatibility format: the archive tools this output is meant for decode
//! non-flagged names with the DOS Cyrillic code page. Names outside CP866 are
//! rejected rather than silently mangled.

use std::path::{Path, PathBuf};

use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, StringEncoding, ZipEntryBuilder, ZipString};
use encoding_rs::IBM866;
use log::{debug, info};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

use crate::error::ArchiveError;

/// Encodes an entry name in CP866.
///
/// # Errors
///
/// Returns [`ArchiveError::UnencodableName`] if any character has no CP866 form.
///
/// # Examples
///
/// ```
/// use geoexport_core::archive::encode_archive_entry_name;
///
/// assert_eq!(encode_archive_entry_name("Roads/Roads.shp").unwrap(), b"Roads/Roads.shp");
/// assert_eq!(encode_archive_entry_name("Я").unwrap(), vec![0x9F]);
/// assert!(encode_archive_entry_name("道路").is_err());
/// ```
pub fn encode_archive_entry_name(name: &str) -> Result<Vec<u8>, ArchiveError> {
    let (bytes, _, had_errors) = IBM866.encode(name);
    if had_errors {
        return Err(ArchiveError::UnencodableName {
            name: name.to_string(),
        });
    }
    Ok(bytes.into_owned())
}

/// Lists the regular files directly inside `dir`, sorted by name.
async fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let io_error = |source| ArchiveError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        if !entry.file_type().await.map_err(io_error)?.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|raw| ArchiveError::NonUtf8Name {
                name: raw.to_string_lossy().into_owned(),
            })?;
        files.push((name, entry.path()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Writes every regular file in `source_dir` to `writer` as a deflated zip
/// archive, each entry named `{folder}/{file name}`. Returns the entry count.
///
/// All names are encoded before anything is written, so an unencodable name
/// fails the build without producing a partial archive.
///
/// # Errors
///
/// Returns [`ArchiveError::Empty`] if the directory holds no files, a name error
/// if any entry name cannot be encoded, or an I/O or zip error.
pub async fn build_archive<W>(
    source_dir: &Path,
    folder: &str,
    writer: &mut W,
) -> Result<usize, ArchiveError>
where
    W: AsyncWrite + Unpin,
{
    let files = list_files(source_dir).await?;
    if files.is_empty() {
        return Err(ArchiveError::Empty {
            path: source_dir.to_path_buf(),
        });
    }

    let entries = files
        .into_iter()
        .map(|(name, path)| {
            let entry_name = format!("{folder}/{name}");
            encode_archive_entry_name(&entry_name).map(|raw| (entry_name, raw, path))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut zip = ZipFileWriter::new((&mut *writer).compat_write());
    for (entry_name, raw, path) in &entries {
        let io_error = |source| ArchiveError::Io {
            path: path.clone(),
            source,
        };

        let builder = ZipEntryBuilder::new(
            ZipString::new(raw.clone(), StringEncoding::Raw),
            Compression::Deflate,
        );
        let mut source = tokio::fs::File::open(path)
            .await
            .map_err(io_error)?
            .compat();
        let mut entry = zip.write_entry_stream(builder).await?;
        let copied = futures::io::copy(&mut source, &mut entry)
            .await
            .map_err(io_error)?;
        entry.close().await?;

        debug!("Archived {entry_name} ({copied} bytes)");
    }
    zip.close().await?;

    writer.flush().await.map_err(|source| ArchiveError::Io {
        path: source_dir.to_path_buf(),
        source,
    })?;

    info!(
        "Archived {} file(s) from {} under '{folder}/'",
        entries.len(),
        source_dir.display()
    );
    Ok(entries.len())
}
