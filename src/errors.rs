use crate::fields::ValidationError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Request body could not be decoded.
    BadRequest(String),
    /// Token did not match the expected digest.
    Forbidden(String),
    /// Unknown route or method.
    NotFound(String),
    /// Envelope or method arguments failed validation.
    InvalidRequest(ValidationError),
    /// Store failure that survived the store's own failure policy.
    Store(StoreError),
    /// Internal server error.
    InternalError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body returned to the caller. Internal causes are not included.
    pub fn body(&self) -> Value {
        let code = self.status().as_u16();
        match self {
            AppError::BadRequest(_) => json!({"error": "Bad Request", "code": code}),
            AppError::Forbidden(_) => json!({"error": "Forbidden", "code": code}),
            AppError::NotFound(msg) => json!({"error": msg, "code": code}),
            AppError::InvalidRequest(err) => json!({
                "error": err.to_string(),
                "code": code,
                "kind": err.kind(),
                "field": err.field(),
            }),
            AppError::Store(_) | AppError::InternalError(_) => {
                json!({"error": "Internal Server Error", "code": code})
            }
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidRequest(err) => write!(f, "Invalid request: {}", err),
            AppError::Store(err) => write!(f, "Store error: {}", err),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        match &self {
            AppError::BadRequest(msg) => tracing::info!("Bad request: {}", msg),
            AppError::Forbidden(msg) => tracing::warn!("Forbidden: {}", msg),
            AppError::NotFound(msg) => tracing::info!("Not found: {}", msg),
            AppError::InvalidRequest(err) => tracing::info!("Invalid request: {}", err),
            AppError::Store(err) => tracing::error!("Store error: {}", err),
            AppError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
        }

        (self.status(), Json(self.body())).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidRequest(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BackendError;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidRequest(ValidationError::MissingCombination).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::InternalError("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_request_body_carries_reason() {
        let body = AppError::from(ValidationError::MissingField { field: "client_ids" }).body();
        assert_eq!(body["code"], 422);
        assert_eq!(body["kind"], "missing_field");
        assert_eq!(body["field"], "client_ids");
        assert_eq!(body["error"], "field 'client_ids' is required");
    }

    #[test]
    fn test_store_error_is_not_leaked() {
        let err = AppError::from(StoreError::Unavailable {
            operation: "get",
            attempts: 3,
            source: BackendError::Transient("10.0.0.5:5432 refused".into()),
        });
        let body = err.body();
        assert_eq!(body["code"], 500);
        assert_eq!(body["error"], "Internal Server Error");
        assert!(!body.to_string().contains("10.0.0.5"));
    }
}
