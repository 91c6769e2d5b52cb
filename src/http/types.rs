//! HTTP request and response bodies

use serde::{Deserialize, Serialize};

use crate::cache::ConnectionState;
use crate::report::ReportPage;

// =============================================================================
// Request Bodies
// =============================================================================

/// Body carrying a single topic
#[derive(Debug, Default, Deserialize)]
pub struct TopicBody {
    #[serde(default)]
    pub topic: String,
}

/// Label update body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelUpdateBody {
    #[serde(default)]
    pub updated_label: String,
}

/// Topic creation body
#[derive(Debug, Default, Deserialize)]
pub struct CreateTagBody {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub label: String,
}

/// Realtime range body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBody {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

// =============================================================================
// Response Bodies
// =============================================================================

/// Standard `{success, data}` envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// Report envelope: the page fields sit next to `success`
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub success: bool,
    #[serde(flatten)]
    pub page: ReportPage,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cache: ConnectionState,
    pub cache_backend: &'static str,
}
