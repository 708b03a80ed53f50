//! Format converter: turns the interchange file into the target format.
//!
//! Every conversion reprojects from `EPSG:3857` to `EPSG:4326`, with both CRSs
//! passed explicitly. A few formats get extra layer creation options.

use std::path::Path;

use geoexport_core_common::{ConversionEngine, ConversionRequest, WEB_MERCATOR, WGS84};
use log::{debug, info, warn};

use crate::drivers::DriverCatalog;
use crate::error::ConversionError;

/// Extra engine arguments per canonical format.
pub const ADDITIONAL_FLAGS: &[(&str, &[&str])] = &[
    // Points as X/Y columns instead of a geometry column.
    ("csv", &["-lco", "GEOMETRY=AS_XY"]),
    ("shp", &["-lco", "ENCODING=UTF-8"]),
];

/// Formats that cannot hold multi-part geometries; layers are decomposed before export.
pub const SINGLE_PART_FORMATS: &[&str] = &["csv"];

/// Returns the extra engine arguments for a canonical format.
#[must_use]
pub fn extra_options(format: &str) -> Vec<String> {
    ADDITIONAL_FLAGS
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, flags)| flags.iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}

/// Returns `true` if `format` needs single-part geometries.
#[must_use]
pub fn requires_single_part(format: &str) -> bool {
    SINGLE_PART_FORMATS.contains(&format)
}

/// Builds the engine request for converting `input` into `output` as `format`.
#[must_use]
pub fn build_request(
    catalog: &DriverCatalog,
    input: &Path,
    output: &Path,
    format: &str,
) -> ConversionRequest {
    ConversionRequest {
        driver: catalog.resolve_engine_name(format).to_string(),
        output: output.to_path_buf(),
        input: input.to_path_buf(),
        source_crs: WEB_MERCATOR,
        target_crs: WGS84,
        options: extra_options(format),
    }
}

/// Runs one conversion. A non-zero exit status fails the job; there is no retry.
///
/// # Errors
///
/// Returns [`ConversionError::Failed`] on a non-zero exit, or
/// [`ConversionError::Engine`] if the engine cannot be run or times out.
pub async fn convert(
    engine: &dyn ConversionEngine,
    catalog: &DriverCatalog,
    input: &Path,
    output: &Path,
    format: &str,
) -> Result<(), ConversionError> {
    let request = build_request(catalog, input, output, format);
    debug!("Conversion request: {request:?}");

    let outcome = engine.convert(&request).await?;

    if !outcome.success() {
        warn!(
            "Engine failed converting to '{}' (exit code {:?}): {}",
            request.driver,
            outcome.code,
            outcome.stderr.trim()
        );
        return Err(ConversionError::Failed {
            driver: request.driver,
            exit_code: outcome.code,
            stderr: outcome.stderr,
        });
    }

    if !outcome.stderr.trim().is_empty() {
        debug!("Engine diagnostics: {}", outcome.stderr.trim());
    }
    info!("Converted {} to '{}'", input.display(), request.driver);
    Ok(())
}
