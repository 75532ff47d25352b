//! Request ID middleware.
//!
//! Every request gets an `x-request-id` (kept if the client sent one), the
//! id is echoed on the response and recorded on the request's tracing span
//! so gateway statement logs can be correlated with the HTTP call.

use axum::{
    body::Body,
    http::{header::HeaderName, HeaderValue, Request},
};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Span;
use uuid::Uuid;

/// Header name for request ID.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeUuidRequestId;

impl MakeRequestId for MakeUuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Assigns a request id to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeUuidRequestId> {
    SetRequestIdLayer::new(REQUEST_ID_HEADER.clone(), MakeUuidRequestId)
}

/// Copies the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(REQUEST_ID_HEADER.clone())
}

/// Span factory for `TraceLayer::make_span_with`.
pub fn make_request_span(req: &Request<Body>) -> Span {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        uri = %req.uri(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_uuids() {
        let req = Request::new(Body::empty());
        let id = MakeUuidRequestId.make_request_id(&req).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }
}
