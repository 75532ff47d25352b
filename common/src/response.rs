//! JSON response envelope.
//!
//! Every endpoint of the service answers with [`ApiResponse`], successful or
//! not, so clients only handle one shape.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard response wrapper.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,

    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    pub meta: ResponseMeta,
}

/// Error details.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Stable code, e.g. `INSUFFICIENT_STOCK` or `DATABASE_UNAVAILABLE`.
    pub code: String,

    /// Human-readable message.
    pub message: String,
}

/// Response metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,

    /// Handler time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Service that produced the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            duration_ms: None,
            service: None,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    /// Successful response tagged with the producing service.
    pub fn ok_with_service(data: T, service: impl Into<String>) -> Self {
        Self::ok(data).with_service(service)
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.meta.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.meta.service = Some(service.into());
        self
    }
}

impl ApiResponse<()> {
    /// Failed response.
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
            meta: ResponseMeta::default(),
        }
    }
}
