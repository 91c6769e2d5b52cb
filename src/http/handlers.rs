//! HTTP Handlers
//!
//! Each handler unpacks its request, calls the service and wraps the
//! outcome; errors become `ApiError` responses.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};

use super::types::*;
use super::{ApiResult, AppState};
use crate::report::ReportRequest;
use crate::trend::PredictionQuery;

// =============================================================================
// Helper Functions
// =============================================================================

/// Percent-decode a path segment, keeping the raw text when it does not decode
pub fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Decoded path remainder after a route prefix such as `/prediction/`
fn path_param(uri: &Uri, prefix: &str) -> String {
    let raw = uri.path().strip_prefix(prefix).unwrap_or_default();
    decode_segment(raw)
}

// =============================================================================
// Health & Metrics Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cache = state.service.cache();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        cache: cache.state(),
        cache_backend: cache.backend_name(),
    })
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.service.cache().metrics().export();
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body)
}

// =============================================================================
// Topic Metadata Handlers
// =============================================================================

/// `GET /all-topics-labels`
pub async fn all_topic_labels(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let topics = state.service.all_topic_labels().await?;
    Ok(Json(ApiResponse::ok(topics)))
}

/// `POST /get-single-topic-label`
pub async fn single_topic_label(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TopicBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let topic = state.service.topic_label(&body.topic).await?;
    Ok(Json(ApiResponse::ok(topic)))
}

/// `PUT /topic-label-update/:id`
pub async fn update_topic_label(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    body: Result<Json<LabelUpdateBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let id = path_param(&uri, "/topic-label-update/");
    let topic = state
        .service
        .update_topic_label(&id, &body.updated_label)
        .await?;
    Ok(Json(ApiResponse::with_message(topic, "Label updated")))
}

/// `POST /create-tagname`
pub async fn create_tag_name(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateTagBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let topic = state
        .service
        .create_topic(&body.topic, &body.device, &body.label)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(topic, "Topic created")),
    ))
}

/// `GET /get-all-tagname`
pub async fn all_tag_names(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let names = state.service.all_tag_names().await?;
    Ok(Json(ApiResponse::ok(names)))
}

/// `GET /get-recent-5-tagname`
pub async fn recent_tag_names(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let names = state.service.recent_tag_names().await?;
    Ok(Json(ApiResponse::ok(names)))
}

/// `DELETE /delete-topic/:topic`
pub async fn delete_topic(
    State(state): State<Arc<AppState>>,
    uri: Uri,
) -> ApiResult<impl IntoResponse> {
    let topic = path_param(&uri, "/delete-topic/");
    let outcome = state.service.delete_topic(&topic).await?;
    let message = format!(
        "Topic {} deleted with {} messages",
        outcome.topic, outcome.deleted_messages
    );
    Ok(Json(ApiResponse::with_message(outcome, message)))
}

// =============================================================================
// Subscription Handlers
// =============================================================================

/// `POST /subscribe`
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TopicBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let outcome = state.service.subscribe(&body.topic).await?;
    let message = if outcome.already_subscribed {
        "Already subscribed to topic"
    } else {
        "Subscribed to topic"
    };
    Ok(Json(ApiResponse::with_message(outcome, message)))
}

/// `POST /subscribe-to-all`
pub async fn subscribe_all(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let topics = state.service.subscribe_all().await?;
    let message = format!("Subscribed to {} topics", topics.len());
    Ok(Json(ApiResponse::with_message(topics, message)))
}

/// `POST /unsubscribe-from-all`
pub async fn unsubscribe_all(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let topics = state.service.unsubscribe_all().await?;
    let message = format!("Unsubscribed from {} topics", topics.len());
    Ok(Json(ApiResponse::with_message(topics, message)))
}

/// `GET /get-all-subscribedtopics`
pub async fn subscribed_topics(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let topics = state.service.subscribed_topics().await?;
    Ok(Json(ApiResponse::ok(topics)))
}

// =============================================================================
// Reading Handlers
// =============================================================================

/// `POST /messages`
pub async fn messages(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TopicBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let summary = state.service.messages(&body.topic).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// `POST /realtime-data/last-2-hours`
pub async fn realtime_last_two_hours(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TopicBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let readings = state.service.realtime_last_two_hours(&body.topic).await?;
    Ok(Json(ApiResponse::ok(readings)))
}

/// `POST /realtime-data/range`
pub async fn realtime_range(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RangeBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let readings = state
        .service
        .realtime_range(&body.topic, &body.start_time, &body.end_time)
        .await?;
    Ok(Json(ApiResponse::ok(readings)))
}

// =============================================================================
// Report & Prediction Handlers
// =============================================================================

/// `POST /report-filter`
pub async fn report_filter(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let page = state.service.report(&request).await?;
    Ok(Json(ReportResponse {
        success: true,
        page,
    }))
}

/// `GET /prediction/:topic`
pub async fn prediction(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    query: Result<Query<PredictionQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let topic = path_param(&uri, "/prediction/");
    let result = state.service.predict(&topic, &query).await?;
    Ok(Json(ApiResponse::ok(result)))
}
