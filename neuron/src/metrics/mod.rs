//! Metrics and instrumentation for the client.
//!
//! This module defines Prometheus-compatible metrics for proof-of-work
//! registration and weight commit-reveal, and exposes a small HTTP exporter
//! that serves `/metrics` in Prometheus text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use neuron::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9899".parse()?;
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! // Hand the metrics to the engines:
//! let orchestrator = RegistrationOrchestrator::new(ledger, cfg)
//!     .with_metrics(registry.registration.clone());
//! ```

pub mod prometheus;

pub use prometheus::{
    MetricsRegistry, RegistrationMetrics, WeightMetrics, run_prometheus_http_server,
};
