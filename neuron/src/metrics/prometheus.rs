//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry plus the registration and weight-submission metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::warn;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Metrics updated by the registration orchestrator.
#[derive(Clone)]
pub struct RegistrationMetrics {
    /// Nonces hashed by the worker pools, as reported by the workers.
    pub hashes_total: IntCounter,
    /// Solve cycles started (one per update interval).
    pub solve_cycles_total: IntCounter,
    /// Solutions discarded because the chain moved past them.
    pub stale_solutions_total: IntCounter,
    /// Registration submissions, labelled by `outcome`
    /// (`included`, `already_registered`, `rejected`, `error`).
    pub submissions_total: IntCounterVec,
    /// Wall-clock time from pool start to a solution, in seconds.
    pub solve_seconds: Histogram,
}

impl RegistrationMetrics {
    /// Registers registration metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let hashes_total = IntCounter::with_opts(Opts::new(
            "registration_hashes_total",
            "Total number of proof-of-work nonces hashed",
        ))?;
        registry.register(Box::new(hashes_total.clone()))?;

        let solve_cycles_total = IntCounter::with_opts(Opts::new(
            "registration_solve_cycles_total",
            "Total number of proof-of-work solve cycles",
        ))?;
        registry.register(Box::new(solve_cycles_total.clone()))?;

        let stale_solutions_total = IntCounter::with_opts(Opts::new(
            "registration_stale_solutions_total",
            "Solutions discarded because the chain advanced past their block",
        ))?;
        registry.register(Box::new(stale_solutions_total.clone()))?;

        let submissions_total = IntCounterVec::new(
            Opts::new(
                "registration_submissions_total",
                "Registration extrinsics submitted, by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        // Solves at realistic difficulties take seconds to minutes.
        let solve_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "registration_solve_seconds",
                "Time from starting a search to finding a solution in seconds",
            )
            .buckets(vec![
                0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
            ]),
        )?;
        registry.register(Box::new(solve_seconds.clone()))?;

        Ok(Self {
            hashes_total,
            solve_cycles_total,
            stale_solutions_total,
            submissions_total,
            solve_seconds,
        })
    }
}

/// Metrics updated by the commit-reveal scheduler.
#[derive(Clone)]
pub struct WeightMetrics {
    /// Weight commitments, labelled by `outcome` (`included`, `rejected`, `error`).
    pub commits_total: IntCounterVec,
    /// Reveals, labelled by `outcome` (`revealed`, `rejected`, `expired`, `error`).
    pub reveals_total: IntCounterVec,
}

impl WeightMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let commits_total = IntCounterVec::new(
            Opts::new("weights_commits_total", "Weight commitments submitted, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(commits_total.clone()))?;

        let reveals_total = IntCounterVec::new(
            Opts::new("weights_reveals_total", "Weight reveals attempted, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reveals_total.clone()))?;

        Ok(Self {
            commits_total,
            reveals_total,
        })
    }
}

/// Wrapper around a Prometheus registry and the client metrics.
///
/// This is the main handle you pass around in the client. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub registration: RegistrationMetrics,
    pub weights: WeightMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// (prefix `neuron`) and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("neuron".to_string()), None)?;
        let registration = RegistrationMetrics::register(&registry)?;
        let weights = WeightMetrics::register(&registry)?;
        Ok(Self {
            registry,
            registration,
            weights,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// Intended to be spawned onto a Tokio runtime:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9899".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "prometheus HTTP connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(respond(req.method(), req.uri().path(), &metrics))
}

fn respond(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    let (status, content_type, body) = match (method, path) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4",
            metrics.gather_text(),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain",
            "not found".to_string(),
        ),
    };
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type),
    );
    response
}
