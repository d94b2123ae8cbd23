//! Telemetry for change feed consumers.
//!
//! Sets up structured logging with environment-specific formats: JSON to rotating files in
//! production-like environments, pretty console output in development.

pub mod tracing;
