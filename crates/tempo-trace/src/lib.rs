//! Tracing setup for Tempo binaries.
//!
//! Installs a `tracing` subscriber with plain or JSON output and, when an
//! OTLP endpoint is configured, exports spans through OpenTelemetry.

pub mod spans;
pub mod tracer;

pub use spans::{cache_span, job_span, request_span};
pub use tracer::{OtlpConfig, TracerError, TracingConfig, init_tracer, shutdown_tracer};
