//! Telemetry bootstrap for close-etl services.

pub mod tracing;
