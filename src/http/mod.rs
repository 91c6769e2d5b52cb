//! HTTP surface
//!
//! ```text
//! request ──▶ handler ──▶ TelemetryService ──▶ cache gateway / store
//!                │
//!                └── Error ──▶ ApiError ──▶ {"success": false, "message": ..}
//! ```
//!
//! Topic path parameters are percent-decoded leniently: a segment that does
//! not decode is used as-is.

pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::{error, warn};

use crate::error::Error;
use crate::service::TelemetryService;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state
pub struct AppState {
    pub service: TelemetryService,
}

impl AppState {
    pub fn new(service: TelemetryService) -> Self {
        Self { service }
    }
}

// =============================================================================
// Error Responses
// =============================================================================

/// Error returned from handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg),
            Error::NotFound(msg) => ApiError::new(StatusCode::NOT_FOUND, msg),
            other => {
                error!(error = %other, "Request failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "Rejected request body");
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Topic metadata
        .route("/all-topics-labels", get(handlers::all_topic_labels))
        .route("/get-single-topic-label", post(handlers::single_topic_label))
        .route("/topic-label-update/:id", put(handlers::update_topic_label))
        .route("/create-tagname", post(handlers::create_tag_name))
        .route("/get-all-tagname", get(handlers::all_tag_names))
        .route("/get-recent-5-tagname", get(handlers::recent_tag_names))
        .route("/delete-topic/:topic", delete(handlers::delete_topic))
        // Subscriptions
        .route("/subscribe", post(handlers::subscribe))
        .route("/subscribe-to-all", post(handlers::subscribe_all))
        .route("/unsubscribe-from-all", post(handlers::unsubscribe_all))
        .route("/get-all-subscribedtopics", get(handlers::subscribed_topics))
        // Readings
        .route("/messages", post(handlers::messages))
        .route(
            "/realtime-data/last-2-hours",
            post(handlers::realtime_last_two_hours),
        )
        .route("/realtime-data/range", post(handlers::realtime_range))
        // Reports and predictions
        .route("/report-filter", post(handlers::report_filter))
        .route("/prediction/:topic", get(handlers::prediction))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_error_status_mapping() {
        let err: ApiError = Error::validation("Topic is required").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Topic is required");

        let err: ApiError = Error::not_found("Topic not found").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = Error::from(StoreError::Unavailable("db down".to_string())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("db down"));
    }
}
