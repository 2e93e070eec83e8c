//! Span constructors shared across crates so field names stay consistent.

use tracing::{Level, Span, span};

/// Span for one HTTP request.
pub fn request_span(method: &str, path: &str, request_id: &str) -> Span {
    span!(
        Level::INFO,
        "http.request",
        http.method = method,
        http.route = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
    )
}

/// Span for one delivery of a queued job.
pub fn job_span(queue: &str, job_id: &str, attempt: u32) -> Span {
    span!(
        Level::INFO,
        "job.process",
        queue.name = queue,
        job.id = job_id,
        job.attempt = attempt,
    )
}

/// Span for a cache operation.
pub fn cache_span(operation: &str, namespace: &str) -> Span {
    span!(
        Level::DEBUG,
        "cache.operation",
        operation = operation,
        cache.namespace = namespace,
    )
}
