//! OData error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::odata::filter::FilterError;

pub type Result<T> = std::result::Result<T, ODataError>;

#[derive(Debug, thiserror::Error)]
pub enum ODataError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid $filter: {0}")]
    Filter(#[from] FilterError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("method not allowed on this resource")]
    MethodNotAllowed,

    #[error("database request failed")]
    Database(#[from] sqlx::Error),
}

impl ODataError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ODataError::BadRequest(_) | ODataError::Filter(_) => StatusCode::BAD_REQUEST,
            ODataError::NotFound(_) => StatusCode::NOT_FOUND,
            ODataError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ODataError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ODataError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{"error": {"code": ..., "message": ...}}` body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
}

impl IntoResponse for ODataError {
    fn into_response(self) -> Response {
        let status = self.status();
        let target = match &self {
            ODataError::Filter(_) => Some("$filter".to_owned()),
            _ => None,
        };

        if let ODataError::Database(err) = &self {
            tracing::error!(error = %err, "odata request failed on database");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: status.as_u16().to_string(),
                message: self.to_string(),
                target,
            },
        };

        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            super::ODATA_VERSION_HEADER,
            axum::http::HeaderValue::from_static(super::ODATA_VERSION),
        );
        response
    }
}
