//! Prometheus metrics for the broker.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup. The helper functions
//! (`inc_request`, `record_backend_call`, …) are no-ops if `init_metrics` was
//! never called, so the broker is always safe to run and observability
//! simply degrades gracefully.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `broker_requests_total` | Counter | `source` |
//! | `broker_backend_calls_total` | Counter | `backend`, `outcome` |
//! | `broker_backend_duration_seconds` | Histogram | `backend` |
//! | `broker_validation_rejections_total` | Counter | |

use crate::BrokerError;
use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

/// All Prometheus metrics for the broker, stored in a single [`OnceLock`].
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Completed analyses by the stage that produced the result.
    pub requests_total: CounterVec,
    /// Backend invocations by backend name and outcome.
    pub backend_calls: CounterVec,
    /// Backend call latency.
    pub backend_duration: HistogramVec,
    /// Requests rejected before reaching the orchestrator.
    pub validation_rejections: IntCounter,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn register<C>(registry: &Registry, collector: C) -> Result<C, BrokerError>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| BrokerError::Other(format!("metrics registration failed: {e}")))?;
    Ok(collector)
}

fn build(registry: Registry) -> Result<Metrics, BrokerError> {
    let init_err = |e: prometheus::Error| BrokerError::Other(format!("metrics init failed: {e}"));

    let requests_total = register(
        &registry,
        CounterVec::new(
            Opts::new("broker_requests_total", "Analyses completed by result source"),
            &["source"],
        )
        .map_err(init_err)?,
    )?;

    let backend_calls = register(
        &registry,
        CounterVec::new(
            Opts::new(
                "broker_backend_calls_total",
                "Backend invocations by backend and outcome",
            ),
            &["backend", "outcome"],
        )
        .map_err(init_err)?,
    )?;

    let backend_duration = register(
        &registry,
        HistogramVec::new(
            HistogramOpts::new(
                "broker_backend_duration_seconds",
                "Backend call latency per backend",
            ),
            &["backend"],
        )
        .map_err(init_err)?,
    )?;

    let validation_rejections = register(
        &registry,
        IntCounter::new(
            "broker_validation_rejections_total",
            "Requests rejected by input validation",
        )
        .map_err(init_err)?,
    )?;

    Ok(Metrics {
        registry,
        requests_total,
        backend_calls,
        backend_duration,
        validation_rejections,
    })
}

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`BrokerError::Other`] if metric construction or registration fails.
pub fn init_metrics() -> Result<(), BrokerError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let metrics = build(Registry::new())?;

    // If another thread raced us, the first one wins; both bundles are identical.
    let _ = METRICS.set(metrics);

    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Count one completed analysis attributed to `source`.
pub fn inc_request(source: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.requests_total.get_metric_with_label_values(&[source]) {
            c.inc();
        }
    }
}

/// Record one backend invocation: its outcome label and latency.
pub fn record_backend_call(backend: &str, outcome: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.backend_calls.get_metric_with_label_values(&[backend, outcome]) {
            c.inc();
        }
        if let Ok(h) = m.backend_duration.get_metric_with_label_values(&[backend]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Count one request rejected by input validation.
pub fn inc_validation_rejection() {
    if let Some(m) = metrics() {
        m.validation_rejections.inc();
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// A structured snapshot of the counters.
#[derive(Debug, Default)]
pub struct MetricsSummary {
    /// Completed analyses keyed by source label.
    pub requests_total: HashMap<String, u64>,
    /// Backend calls keyed by `"backend:outcome"`.
    pub backend_calls: HashMap<String, u64>,
    /// Requests rejected by validation.
    pub validation_rejections: u64,
}

fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
    metric
        .get_label()
        .iter()
        .find(|l| l.get_name() == name)
        .map_or("unknown", |l| l.get_value())
}

/// Return a structured summary of current counter values.
///
/// Returns a zeroed [`MetricsSummary`] if metrics have not been initialised.
pub fn get_metrics_summary() -> MetricsSummary {
    let Some(m) = metrics() else {
        return MetricsSummary::default();
    };

    summarize(m)
}

fn summarize(m: &Metrics) -> MetricsSummary {
    let mut summary = MetricsSummary::default();

    for family in m.requests_total.collect() {
        for metric in family.get_metric() {
            let value = metric.get_counter().get_value() as u64;
            summary
                .requests_total
                .insert(label(metric, "source").to_string(), value);
        }
    }

    for family in m.backend_calls.collect() {
        for metric in family.get_metric() {
            let key = format!("{}:{}", label(metric, "backend"), label(metric, "outcome"));
            let value = metric.get_counter().get_value() as u64;
            summary.backend_calls.insert(key, value);
        }
    }

    summary.validation_rejections = m.validation_rejections.get();

    summary
}
