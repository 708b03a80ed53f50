use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use geoexport_core::{ExportError, ExportStage};
use geoexport_core_common::HostError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{message}")]
    UnsupportedFormat {
        message: String,
        /// Report with 500, as older clients expect.
        legacy_status: bool,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Export {
        stage: ExportStage,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedFormat {
                legacy_status: true,
                ..
            } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnsupportedFormat { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Export { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a pipeline error, logging the full detail server-side.
    pub fn from_export(err: ExportError, legacy_unsupported_status: bool) -> Self {
        if err.is_unsupported_format() {
            return ApiError::UnsupportedFormat {
                message: err.user_message(),
                legacy_status: legacy_unsupported_status,
            };
        }
        match err {
            ExportError::Host(e) => e.into(),
            other => {
                tracing::error!(stage = %other.stage(), error = %other, "export failed");
                ApiError::Export {
                    stage: other.stage(),
                    message: other.user_message(),
                }
            },
        }
    }

    fn stage(&self) -> Option<&'static str> {
        match self {
            ApiError::UnsupportedFormat { .. } => Some(ExportStage::Validating.as_str()),
            ApiError::Export { stage, .. } => Some(stage.as_str()),
            _ => None,
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            ApiError::UnsupportedFormat { .. } => {
                Some("GET /ogr_export/formats lists the exportable formats.".to_string())
            },
            ApiError::Unauthorized(_) => {
                Some("Send an 'Authorization: Bearer <token>' header.".to_string())
            },
            _ => None,
        }
    }
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            HostError::Unauthenticated { .. } => ApiError::Unauthorized(err.to_string()),
            HostError::PermissionDenied { .. } => ApiError::Forbidden(err.to_string()),
            HostError::Query { .. } => {
                tracing::error!(error = %err, "feature query failed");
                ApiError::Export {
                    stage: ExportStage::Serializing,
                    message: "Could not read layer features.".to_string(),
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
            stage: self.stage(),
            hint: self.hint(),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
