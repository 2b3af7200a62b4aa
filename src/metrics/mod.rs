//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Swap lifecycle events and terminal outcomes
//! - Balance reservations and sweep activity
//! - Confirmation processing throughput and latency
//! - Authority validation outcomes

use crate::error::{RouterError, RouterResult};

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Swap metrics
    pub static ref SWAP_EVENTS: CounterVec = register_counter_vec!(
        "meridian_swap_events_total",
        "Total swap lifecycle events by type",
        &["event_type"]
    ).unwrap();

    pub static ref SWAPS_ACTIVE: GaugeVec = register_gauge_vec!(
        "meridian_swaps_active",
        "Swaps currently tracked by the coordinator",
        &[]
    ).unwrap();

    pub static ref SWAPS_COMPLETED: CounterVec = register_counter_vec!(
        "meridian_swaps_completed_total",
        "Total swaps that reached completion",
        &[]
    ).unwrap();

    pub static ref SWAPS_EXPIRED: CounterVec = register_counter_vec!(
        "meridian_swaps_expired_total",
        "Total swaps that passed their deadline",
        &[]
    ).unwrap();

    pub static ref SWAPS_ROLLED_BACK: CounterVec = register_counter_vec!(
        "meridian_swaps_rolled_back_total",
        "Total swaps fully rolled back",
        &[]
    ).unwrap();

    // Reservation metrics
    pub static ref RESERVATIONS_ACTIVE: GaugeVec = register_gauge_vec!(
        "meridian_reservations_active",
        "Balance reservations currently held",
        &[]
    ).unwrap();

    pub static ref RESERVATIONS_SWEPT: CounterVec = register_counter_vec!(
        "meridian_reservations_swept_total",
        "Total expired reservations released by the sweep",
        &[]
    ).unwrap();

    // Confirmation metrics
    pub static ref CONFIRMATIONS_CREATED: CounterVec = register_counter_vec!(
        "meridian_confirmations_created_total",
        "Total confirmation records created by status",
        &["status"]
    ).unwrap();

    pub static ref CONFIRMATION_TASKS_ENQUEUED: CounterVec = register_counter_vec!(
        "meridian_confirmation_tasks_enqueued_total",
        "Total confirmation tasks accepted into the queue",
        &[]
    ).unwrap();

    pub static ref CONFIRMATION_TASKS_FAILED: CounterVec = register_counter_vec!(
        "meridian_confirmation_tasks_failed_total",
        "Total confirmation tasks that exhausted their retries",
        &[]
    ).unwrap();

    pub static ref CONFIRMATION_TASK_LATENCY: HistogramVec = register_histogram_vec!(
        "meridian_confirmation_task_seconds",
        "Confirmation task processing latency",
        &[],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).unwrap();

    // Authority metrics
    pub static ref AUTHORITY_VALIDATIONS: CounterVec = register_counter_vec!(
        "meridian_authority_validations_total",
        "Total authority validations by outcome",
        &["outcome"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> RouterResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RouterError::Internal(format!("metrics listener bind failed: {e}")))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| RouterError::Internal(format!("metrics server failed: {e}")))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_swap_event(event_type: &str) {
    SWAP_EVENTS.with_label_values(&[event_type]).inc();
}

pub fn record_active_swaps(count: usize) {
    SWAPS_ACTIVE.with_label_values(&[]).set(count as f64);
}

pub fn record_swap_completed() {
    SWAPS_COMPLETED.with_label_values(&[]).inc();
}

pub fn record_swap_expired() {
    SWAPS_EXPIRED.with_label_values(&[]).inc();
}

pub fn record_swap_rolled_back() {
    SWAPS_ROLLED_BACK.with_label_values(&[]).inc();
}

pub fn record_active_reservations(count: usize) {
    RESERVATIONS_ACTIVE.with_label_values(&[]).set(count as f64);
}

pub fn record_reservations_swept(count: usize) {
    RESERVATIONS_SWEPT.with_label_values(&[]).inc_by(count as f64);
}

pub fn record_confirmation_created(status: &str) {
    CONFIRMATIONS_CREATED.with_label_values(&[status]).inc();
}

pub fn record_confirmation_task_enqueued() {
    CONFIRMATION_TASKS_ENQUEUED.with_label_values(&[]).inc();
}

pub fn record_confirmation_task_completed(latency_secs: f64) {
    CONFIRMATION_TASK_LATENCY
        .with_label_values(&[])
        .observe(latency_secs);
}

pub fn record_confirmation_task_failed() {
    CONFIRMATION_TASKS_FAILED.with_label_values(&[]).inc();
}

pub fn record_authority_validation(authorized: bool) {
    let outcome = if authorized { "authorized" } else { "denied" };
    AUTHORITY_VALIDATIONS.with_label_values(&[outcome]).inc();
}
