use axum::{
    extract::{MatchedPath, Request},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

/// Logs one `metrics` event per request, keyed by the route template so
/// session ids and object keys do not explode cardinality.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let request_bytes = content_length(req.headers());

    let response = next.run(req).await;

    let latency_ms = start.elapsed().as_millis();
    let status = response.status();
    let response_bytes = content_length(response.headers());

    if status.is_server_error() {
        warn!(
            target: "metrics",
            method = %method,
            route = %route,
            status = status.as_u16(),
            latency_ms = %latency_ms,
            "request_failed"
        );
    } else {
        info!(
            target: "metrics",
            method = %method,
            route = %route,
            status = status.as_u16(),
            latency_ms = %latency_ms,
            request_bytes = request_bytes,
            response_bytes = response_bytes,
            "request_completed"
        );
    }

    response
}

fn content_length(headers: &axum::http::HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5242880"));
        assert_eq!(content_length(&headers), 5_242_880);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&headers), 0);
    }
}
