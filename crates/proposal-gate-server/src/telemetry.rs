// crates/proposal-gate-server/src/telemetry.rs
// ============================================================================
// Module: Server Telemetry
// Description: Observability hooks for the proposal HTTP surface.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for request counters and
//! latency histograms. Deployments plug in Prometheus or OpenTelemetry by
//! implementing [`ServerMetrics`]; the default is [`NoopMetrics`].
//! Labels never carry tenant identifiers, tokens, or payload content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// 2xx response.
    Ok,
    /// 4xx response.
    ClientError,
    /// 5xx response.
    ServerError,
}

impl RequestOutcome {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            500 ..= 599 => Self::ServerError,
            400 ..= 499 => Self::ClientError,
            _ => Self::Ok,
        }
    }

    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ClientError => "client_error",
            Self::ServerError => "server_error",
        }
    }
}

/// Request metric event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetricEvent {
    /// HTTP method.
    pub method: String,
    /// Matched route template, or `unmatched`.
    pub route: String,
    /// Response status code.
    pub status: u16,
    /// Outcome classification.
    pub outcome: RequestOutcome,
    /// Normalized error kind label, when the response is an error.
    pub error_kind: Option<&'static str>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for HTTP requests and latencies.
pub trait ServerMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: &RequestMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: &RequestMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl ServerMetrics for NoopMetrics {
    fn record_request(&self, _event: &RequestMetricEvent) {}

    fn record_latency(&self, _event: &RequestMetricEvent, _latency: Duration) {}
}

/// Returns the upper bound of the latency bucket holding `latency`, or
/// `None` when it exceeds the largest bucket.
#[must_use]
pub fn latency_bucket(latency: Duration) -> Option<u64> {
    let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    LATENCY_BUCKETS_MS.iter().copied().find(|bound| millis <= *bound)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
