//! Observability setup for Flowline: tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
