use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::response::{ApiResponse, Meta};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("{message}")]
    Validation {
        message: String,
        fields: Option<FieldErrors>,
    },

    #[error("Insufficient stock for product {product_id}")]
    OutOfStock { product_id: Uuid },

    #[error("Cannot place an order from an empty cart")]
    EmptyOrder,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("You have already reviewed this product")]
    DuplicateReview,

    #[error("Cannot change status from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid email or password")]
    AuthFailed,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Internal Server Error")]
    DbError(#[from] sqlx::Error),

    #[error("Internal Server Error")]
    OrmError(DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            fields: None,
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.clone()]);
        AppError::Validation {
            message,
            fields: Some(fields),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::OutOfStock { .. }
            | AppError::EmptyOrder
            | AppError::DuplicateReview
            | AppError::InvalidStateTransition { .. }
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidQuantity | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthFailed | AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                tracing::debug!(%detail, "unique constraint violated");
                AppError::Conflict("Resource already exists".into())
            }
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                tracing::debug!(%detail, "foreign key constraint violated");
                AppError::Conflict("Resource is still referenced".into())
            }
            _ => AppError::OrmError(err),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|err| {
                        err.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| err.code.to_string())
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        AppError::Validation {
            message: "Validation failed".into(),
            fields: Some(fields),
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            match &self {
                AppError::DbError(err) => tracing::error!(error = %err, "pool failure"),
                AppError::OrmError(err) => tracing::error!(error = %err, "database failure"),
                AppError::Internal(err) => tracing::error!(error = ?err, "internal failure"),
                _ => {}
            }
        }

        let message = self.to_string();
        let fields = match self {
            AppError::Validation { fields, .. } => fields,
            _ => None,
        };

        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData {
                error: message,
                fields,
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_errors_map_to_conflict() {
        assert_eq!(AppError::EmptyOrder.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::OutOfStock {
                product_id: Uuid::nil()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::DuplicateReview.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn validation_is_unprocessable() {
        let err = AppError::field("rating", "must be between 1 and 5");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        match err {
            AppError::Validation { fields, .. } => {
                let fields = fields.unwrap();
                assert_eq!(fields["rating"], vec!["must be between 1 and 5".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn infrastructure_errors_hide_details() {
        let err = AppError::OrmError(DbErr::Custom("relation \"x\" does not exist".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal Server Error");
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = AppError::Internal(anyhow::anyhow!("secret detail"));
        assert_eq!(err.to_string(), "Internal Server Error");
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        assert_eq!(AppError::AuthFailed.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Unauthenticated("missing token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
    }
}
