use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("validation error")]
    Validation(Value),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    /// Single-field validation failure in the `[{loc, msg}]` detail shape.
    pub fn field(loc: &str, msg: impl Into<String>) -> Self {
        ApiError::Validation(json!([{ "loc": [loc], "msg": msg.into() }]))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::InvalidJson(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let (error, details) = match self {
            ApiError::UnsupportedMediaType(msg) => ("Invalid request", Value::String(msg)),
            ApiError::InvalidJson(msg) => ("Invalid JSON format", Value::String(msg)),
            ApiError::Validation(details) => ("Validation Error", details),
            ApiError::ServiceUnavailable(msg) => ("Service Unavailable", Value::String(msg)),
            ApiError::Internal(msg) => ("Internal Server Error", Value::String(msg)),
        };

        let body = Json(json!({ "error": error, "details": details }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_class() {
        assert_eq!(
            ApiError::UnsupportedMediaType("x".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(ApiError::field("question", "required").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidJson("eof".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::ServiceUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn field_error_carries_location() {
        let ApiError::Validation(details) = ApiError::field("question", "field required") else {
            panic!("expected validation error");
        };
        assert_eq!(details[0]["loc"][0], "question");
        assert_eq!(details[0]["msg"], "field required");
    }
}
