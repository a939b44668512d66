//! Tablecache Telemetry - Logging Infrastructure
//!
//! Structured JSON logs through `tracing-subscriber`. Request spans come from
//! `tower_http::trace::TraceLayer` in the router.

pub mod tracer;

pub use tracer::{init_tracing, TelemetryConfig};
