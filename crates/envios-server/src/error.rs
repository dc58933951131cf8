use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use envios_core::LifecycleError;
use envios_types::FieldError;
use serde::Serialize;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub fields: Vec<FieldError>,
}

#[derive(Debug)]
pub enum ApiError {
    Lifecycle(LifecycleError),
    Unauthorized(String),
    BadRequest(String),
    PayloadTooLarge(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Lifecycle(e) => lifecycle_status(e),
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Lifecycle(e) => ErrorBody {
                error: e.kind(),
                detail: e.to_string(),
                fields: e.fields().to_vec(),
            },
            ApiError::Unauthorized(detail) => ErrorBody {
                error: "unauthorized",
                detail: detail.clone(),
                fields: Vec::new(),
            },
            ApiError::BadRequest(detail) => ErrorBody {
                error: "bad_request",
                detail: detail.clone(),
                fields: Vec::new(),
            },
            ApiError::PayloadTooLarge(detail) => ErrorBody {
                error: "payload_too_large",
                detail: detail.clone(),
                fields: Vec::new(),
            },
        }
    }
}

fn lifecycle_status(err: &LifecycleError) -> StatusCode {
    match err {
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::Forbidden { .. } => StatusCode::FORBIDDEN,
        LifecycleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LifecycleError::InvalidTransition { .. } | LifecycleError::RetryLimitReached { .. } => {
            StatusCode::BAD_REQUEST
        }
        LifecycleError::Conflict(_) => StatusCode::CONFLICT,
        LifecycleError::ImagePersistFailure(_) => StatusCode::BAD_GATEWAY,
        LifecycleError::StoreReadFailure(_) | LifecycleError::StoreWriteFailure(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(rejection.body_text());
        }
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
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = ?self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}
