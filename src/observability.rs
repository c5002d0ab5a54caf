use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: status (`created` | `rejected`).
pub const RESERVATIONS_TOTAL: &str = "equiptrack_reservations_total";

/// Histogram: write operation latency in seconds, from lock request through
/// durable commit. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "equiptrack_operation_duration_seconds";

/// Histogram: time spent waiting for the snapshot gate or an item lock. Labels: op.
pub const LOCK_WAIT_SECONDS: &str = "equiptrack_lock_wait_seconds";

/// Counter: operations abandoned at their deadline. Labels: op.
pub const TIMEOUTS_TOTAL: &str = "equiptrack_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: equipment items currently registered.
pub const EQUIPMENT_ACTIVE: &str = "equiptrack_equipment_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "equiptrack_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "equiptrack_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
