use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use geoexport_core::utils::archive_file_name;
use geoexport_core_common::{Permission, Principal};
use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;
use crate::server::AppState;

/// `GET /resource/{id}/ogr_export/{fmt}`
///
/// Streams the layer as a zip archive in the requested format. The permission
/// check and the format check both happen before any file is written.
pub async fn export_layer(
    State(state): State<AppState>,
    Path((id, format)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id: u64 = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid resource id '{id}'")))?;
    let principal = principal_from(&headers)?;

    let layer = state.provider.feature_layer(id).await?;
    state
        .provider
        .authorize(layer.as_ref(), &principal, Permission::Read)
        .await?;

    let legacy = state.legacy_unsupported_status;
    state
        .exporter
        .validate_format(&format)
        .map_err(|e| ApiError::from_export(e, legacy))?;
    let disposition = content_disposition(&archive_file_name(layer.display_name(), &format))?;

    let archive = state
        .exporter
        .export(layer, &format)
        .await
        .map_err(|e| ApiError::from_export(e, legacy))?;

    tracing::info!(
        resource = id,
        format = %format,
        file = archive.file_name(),
        bytes = archive.len(),
        "sending export"
    );

    let length = archive.len();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"))
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(archive.into_stream()))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Reads an optional `Authorization: Bearer <token>` header.
fn principal_from(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Principal::anonymous());
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("malformed Authorization header".into()))?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(Principal::with_token(token.trim()))
        },
        _ => Err(ApiError::Unauthorized(
            "unsupported Authorization scheme, expected Bearer".into(),
        )),
    }
}

/// `attachment; filename="{name}"` with quotes and backslashes escaped and
/// control characters replaced by `_`.
///
/// Non-ASCII names are sent as raw UTF-8 bytes.
pub fn content_disposition(file_name: &str) -> Result<HeaderValue, ApiError> {
    let escaped: String = file_name
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    HeaderValue::from_bytes(format!("attachment; filename=\"{escaped}\"").as_bytes())
        .map_err(|_| ApiError::Internal(format!("file name {file_name:?} is not a valid header value")))
}

#[derive(Debug, Serialize)]
pub struct FormatEntry {
    pub format: String,
    pub driver: String,
    pub long_name: String,
    pub write: &'static str,
}

/// `GET /ogr_export/formats`
pub async fn list_formats(State(state): State<AppState>) -> Json<Vec<FormatEntry>> {
    Json(
        state
            .exporter
            .catalog()
            .descriptors()
            .map(|d| FormatEntry {
                format: d.canonical_name.clone(),
                driver: d.engine_name.clone(),
                long_name: d.long_name.clone(),
                write: d.write.as_str(),
            })
            .collect(),
    )
}

/// `GET /healthz`
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "formats": state.exporter.catalog().len(),
    }))
}
