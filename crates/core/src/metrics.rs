//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Stage invocations (thumbnail, metadata, transcode)
//! - Rendition encode passes
//! - Dispatcher delivery and the status outbox

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Stages
// =============================================================================

/// Stage invocations by stage and result.
pub static STAGE_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediahub_stage_invocations_total", "Total stage invocations"),
        &["stage", "result"], // result: "success", "unsupported", "not_found", "failed"
    )
    .unwrap()
});

/// Wall time of one rendition pass.
pub static ENCODE_PASS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediahub_encode_pass_duration_seconds",
            "Duration of a single rendition encode pass",
        )
        .buckets(vec![
            1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["tier", "result"],
    )
    .unwrap()
});

/// Transcodes finished by outcome.
pub static TRANSCODES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediahub_transcodes_finished_total",
            "Transcode sequences that reached a terminal state",
        ),
        &["outcome"], // "ready", "failed"
    )
    .unwrap()
});

/// Transcodes currently holding an in-flight slot.
pub static TRANSCODES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediahub_transcodes_in_flight",
        "Number of transcodes currently running",
    )
    .unwrap()
});

// =============================================================================
// Dispatcher and status delivery
// =============================================================================

/// Dispatch attempts by stage and result.
pub static DISPATCH_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediahub_dispatch_attempts_total",
            "Stage dispatch attempts",
        ),
        &["stage", "result"], // "accepted", "retry", "rejected", "exhausted"
    )
    .unwrap()
});

/// Status updates that had to be retried.
pub static STATUS_UPDATE_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediahub_status_update_retries_total",
        "Status update deliveries that failed transiently and were retried",
    )
    .unwrap()
});

/// Status updates dropped after a permanent rejection.
pub static STATUS_UPDATES_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mediahub_status_updates_rejected_total",
        "Status updates permanently rejected by the registry",
    )
    .unwrap()
});

/// Status updates waiting in the outbox.
pub static STATUS_OUTBOX_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediahub_status_outbox_pending",
        "Status updates queued and not yet delivered",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Stages
        Box::new(STAGE_INVOCATIONS.clone()),
        Box::new(ENCODE_PASS_DURATION.clone()),
        Box::new(TRANSCODES_FINISHED.clone()),
        Box::new(TRANSCODES_IN_FLIGHT.clone()),
        // Delivery
        Box::new(DISPATCH_ATTEMPTS.clone()),
        Box::new(STATUS_UPDATE_RETRIES.clone()),
        Box::new(STATUS_UPDATES_REJECTED.clone()),
        Box::new(STATUS_OUTBOX_PENDING.clone()),
    ]
}
