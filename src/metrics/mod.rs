//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Individual submissions by outcome
//! - Inclusions, failures and inclusion latency
//! - Remaining budget

use crate::error::{IncludeError, SendError};
use crate::tx::ResubmitterObserver;

use alloy::primitives::utils::format_ether;
use alloy::primitives::U256;
use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use regex::Regex;
use std::net::SocketAddr;
use tracing::{info, warn};

lazy_static! {
    pub static ref TX_SUBMISSIONS: CounterVec = register_counter_vec!(
        "txinclude_submissions_total",
        "Total transaction submissions by outcome",
        &["status"]
    ).unwrap();

    pub static ref TX_INCLUDED: CounterVec = register_counter_vec!(
        "txinclude_transactions_included_total",
        "Total transactions included",
        &[]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "txinclude_transactions_failed_total",
        "Total transactions that could not be included",
        &["reason"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "txinclude_inclusion_latency_seconds",
        "Time from the include call to inclusion",
        &[],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref BUDGET_BALANCE: GaugeVec = register_gauge_vec!(
        "txinclude_budget_balance_eth",
        "Remaining budget in ETH",
        &[]
    ).unwrap();

    static ref NOT_ALLOWED: Regex = Regex::new(r"[^a-zA-Z0-9_]+").unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Turn arbitrary text into a valid Prometheus label value
pub fn sanitize_label(s: &str) -> String {
    let sanitized = NOT_ALLOWED.replace_all(s, "_");
    let sanitized = sanitized.trim_end_matches('_');
    match sanitized.chars().next() {
        Some(c) if !c.is_ascii_alphabetic() && c != '_' => format!("_{}", sanitized),
        _ => sanitized.to_string(),
    }
}

/// Counts every submission by its outcome
pub struct PrometheusObserver;

impl ResubmitterObserver for PrometheusObserver {
    fn submission_result(&self, err: Option<&SendError>) {
        let status = match err {
            None => "success".to_string(),
            Some(SendError::Unrecognized(msg)) => sanitize_label(msg),
            Some(e) => e.label().to_string(),
        };
        TX_SUBMISSIONS.with_label_values(&[&status]).inc();
    }
}

// Helper functions to record metrics

pub fn record_included(latency_secs: f64) {
    TX_INCLUDED.with_label_values(&[]).inc();
    TX_LATENCY.with_label_values(&[]).observe(latency_secs);
}

pub fn record_failed(err: &IncludeError) {
    TX_FAILED.with_label_values(&[err.label()]).inc();
}

pub fn record_budget_balance(balance: U256) {
    let eth = format_ether(balance).parse::<f64>().unwrap_or(f64::MAX);
    BUDGET_BALANCE.with_label_values(&[]).set(eth);
}
