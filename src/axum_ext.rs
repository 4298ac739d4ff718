//! Axum integration: extractors and error responses.
//!
//! Handlers return `Result<_, Error>`; the [`IntoResponse`] impl below turns
//! every error into a JSON `{"error": "..."}` body with a matching status.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{routing::get, Json, Router};
//! use inky_frame::axum_ext::PhotoName;
//! use inky_frame::Error;
//!
//! async fn show(PhotoName(name): PhotoName) -> Result<Json<String>, Error> {
//!     // `name` is already a safe filename here
//!     Ok(Json(name))
//! }
//!
//! let app: Router = Router::new().route("/photos/{name}", get(show));
//! ```

use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::messages::ErrorResponse;
use crate::photos::validate_filename;
use crate::Error;

/// Photo filename from the single path parameter, validated.
///
/// Rejects anything [`validate_filename`] would (400) before a handler runs,
/// so traversal attempts never reach the photo store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoName(pub String);

impl<S> FromRequestParts<S> for PhotoName
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(name) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| Error::validation(e.body_text()))?;
        validate_filename(&name)?;
        Ok(PhotoName(name))
    }
}

/// JSON body whose rejections become [`Error::Validation`] (400).
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| Error::validation(e.body_text()))?;
        Ok(JsonBody(value))
    }
}

impl Error {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::HardwareUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Storage(_)
            | Error::Image(_)
            | Error::Display(_)
            | Error::Serialization(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
