use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use thiserror::Error;

/// Every failure a handler can report. The variant decides the status code.
#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Validation failed: {}", .0.join("; "))]
    InvalidBatch(Vec<String>),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Store(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBatch(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                Self::Conflict(format!("Duplicate value rejected by the store: {detail}"))
            }
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                Self::Conflict(format!("Referenced row rejected by the store: {detail}"))
            }
            _ => Self::Store(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                Self::validation("No data provided (expected an application/json body)")
            }
            other => Self::Validation(format!("Invalid JSON body: {}", other.body_text())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::InvalidBatch(details) => json!({
                "error": "Validation failed",
                "details": details,
            }),
            Self::Store(_) => json!({ "error": "Internal server error" }),
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(Err::<(), ApiError>(self));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_errors_list_every_item() {
        let err = ApiError::InvalidBatch(vec![
            "Item 1: Missing spec_name".into(),
            "Item 3: spec_value cannot be empty".into(),
        ]);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Validation failed: Item 1: Missing spec_name; Item 3: spec_value cannot be empty"
        );
    }

    #[test]
    fn store_errors_hide_details_from_the_body() {
        let response = ApiError::Store("disk I/O error".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response
            .extensions()
            .get::<Result<(), ApiError>>()
            .is_some_and(|outcome| outcome.is_err()));
    }

    #[test]
    fn custom_db_errors_are_store_errors() {
        let err: ApiError = DbErr::Custom("boom".into()).into();
        assert!(matches!(err, ApiError::Store(_)));
    }
}
