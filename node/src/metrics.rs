//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus at
//! the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

use pegvault_protocol::engine::{AcceptCode, ErrorCategory};
use pegvault_protocol::EngineResult;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Deposits that changed state (or passed through).
    pub deposits_accepted_total: IntCounter,
    /// Deposits rejected before any write.
    pub deposits_rejected_total: IntCounter,
    pub mints_total: IntCounter,
    pub redemptions_total: IntCounter,
    /// Deposits absorbed into a vault without a payout.
    pub absorbs_total: IntCounter,
    pub takeovers_total: IntCounter,
    /// Committed transitions whose payout could not be emitted.
    pub emission_failures_total: IntCounter,
    /// Time spent inside the engine per deposit, in seconds.
    pub deposit_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("pegvault".into()), None)?;

        let deposit_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "deposit_latency_seconds",
                "Time spent processing one deposit in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0,
            ]),
        )?;
        registry.register(Box::new(deposit_latency_seconds.clone()))?;

        Ok(Self {
            deposits_accepted_total: counter(
                &registry,
                "deposits_accepted_total",
                "Total number of accepted deposits",
            )?,
            deposits_rejected_total: counter(
                &registry,
                "deposits_rejected_total",
                "Total number of rejected deposits",
            )?,
            mints_total: counter(&registry, "mints_total", "Stablecoin mints, including takeovers")?,
            redemptions_total: counter(
                &registry,
                "redemptions_total",
                "Collateral redemptions, including takeovers",
            )?,
            absorbs_total: counter(
                &registry,
                "absorbs_total",
                "Deposits absorbed without a payout",
            )?,
            takeovers_total: counter(&registry, "takeovers_total", "Vault takeovers")?,
            emission_failures_total: counter(
                &registry,
                "emission_failures_total",
                "Committed vault updates whose payout failed to emit",
            )?,
            deposit_latency_seconds,
            registry,
        })
    }

    /// Counts one engine result.
    pub fn observe(&self, result: &EngineResult) {
        if !result.accepted {
            self.deposits_rejected_total.inc();
            if result.category == Some(ErrorCategory::Emission) {
                self.emission_failures_total.inc();
            }
            return;
        }

        self.deposits_accepted_total.inc();
        let code = |c: AcceptCode| result.code == c.code();
        if code(AcceptCode::Minted) || code(AcceptCode::TakeoverMinted) {
            self.mints_total.inc();
        }
        if code(AcceptCode::Redeemed) || code(AcceptCode::TakeoverRedeemed) {
            self.redemptions_total.inc();
        }
        if code(AcceptCode::AbsorbedReserve) || code(AcceptCode::AbsorbedStablecoin) {
            self.absorbs_total.inc();
        }
        if code(AcceptCode::TakeoverMinted) || code(AcceptCode::TakeoverRedeemed) {
            self.takeovers_total.inc();
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
