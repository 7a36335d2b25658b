//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use mmbi_core::{DomainFailure, Error};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("method not allowed: {0}")]
  MethodNotAllowed(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Unwrap a backend error into the domain failure it carries, if any.
  pub fn from_store<E: DomainFailure>(err: E) -> Self {
    match err.into_domain() {
      Ok(domain) => domain.into(),
      Err(other) => ApiError::Store(Box::new(other)),
    }
  }

  /// An update aimed at a missing record is the caller's fault.
  pub(crate) fn on_update(self) -> Self {
    match self {
      ApiError::NotFound(m) => ApiError::BadRequest(m),
      other => other,
    }
  }
}

impl From<Error> for ApiError {
  fn from(err: Error) -> Self {
    let message = err.to_string();
    match err {
      Error::NotFound { .. } => ApiError::NotFound(message),
      Error::MissingIdentifier(_) => ApiError::MethodNotAllowed(message),
      Error::StillReferenced { .. } => ApiError::Conflict(message),
      Error::Serialization(e) => ApiError::Store(Box::new(e)),
      Error::Validation { .. }
      | Error::IdentifierConflict(_)
      | Error::IdentifierMismatch { .. }
      | Error::UnknownReference { .. }
      | Error::InvalidFilter { .. }
      | Error::InvalidSort(_)
      | Error::MalformedBody { .. } => ApiError::BadRequest(message),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::MethodNotAllowed(m) => (StatusCode::METHOD_NOT_ALLOWED, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
