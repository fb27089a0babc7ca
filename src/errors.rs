use crate::services::{guestbook::GuestbookError, object_store::StoreError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request errors that keeps the message local.
///
/// Internal failures are logged in full and surfaced to the client only as
/// a generic message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 that hides the underlying cause from the client.
    pub fn internal(err: impl fmt::Display) -> Self {
        tracing::error!("internal error: {err}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<GuestbookError> for AppError {
    fn from(err: GuestbookError) -> Self {
        match err {
            GuestbookError::Validation(msg) => Self::bad_request(msg),
            GuestbookError::PayloadTooLarge => {
                Self::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
            }
            GuestbookError::Unavailable => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            GuestbookError::EntryNotFound(_) => Self::not_found(err.to_string()),
            GuestbookError::Store(store_err) => store_err.into(),
            GuestbookError::Db(sqlx::Error::RowNotFound) => Self::not_found("not found"),
            GuestbookError::Db(db_err) => Self::internal(db_err),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ObjectNotFound { .. } | StoreError::BucketNotFound(_) => {
                Self::not_found(err.to_string())
            }
            // A hostile key never names a real object.
            StoreError::InvalidObjectKey => Self::not_found(err.to_string()),
            other => Self::internal(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guestbook_errors_map_to_expected_statuses() {
        let cases = [
            (
                AppError::from(GuestbookError::Validation("no file uploaded")),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(GuestbookError::PayloadTooLarge),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::from(GuestbookError::Unavailable),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(GuestbookError::EntryNotFound(7)),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(StoreError::ObjectNotFound {
                    bucket: "media".into(),
                    key: "x.png".into(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(GuestbookError::Db(sqlx::Error::PoolClosed)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status, status, "message: {}", err.message);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::from(GuestbookError::Db(sqlx::Error::PoolClosed));
        assert_eq!(err.message, "internal server error");
    }
}
