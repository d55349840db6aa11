//! Tracing bootstrap shared by the domain-hopper service.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{LogFormat, OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
