use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "agentcal_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "agentcal_query_duration_seconds";

/// Counter: bookings admitted.
pub const BOOKINGS_ADMITTED_TOTAL: &str = "agentcal_bookings_admitted_total";

/// Counter: booking proposals turned away. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "agentcal_bookings_rejected_total";

/// Counter: notices that could not be delivered.
pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "agentcal_notifications_dropped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "agentcal_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "agentcal_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "agentcal_connections_rejected_total";

/// Gauge: live notification subscriptions across all connections.
pub const SUBSCRIPTIONS_ACTIVE: &str = "agentcal_subscriptions_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "agentcal_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "agentcal_wal_flush_batch_size";

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

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertAgent { .. } => "insert_agent",
        Command::UpdateAgent { .. } => "update_agent",
        Command::DeleteAgent { .. } => "delete_agent",
        Command::SelectAgents { .. } => "select_agents",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectWeeklyHours { .. } => "select_weekly_hours",
        Command::ReplaceWeeklyHours { .. } => "replace_weekly_hours",
        Command::ClearWeeklyHours { .. } => "clear_weekly_hours",
        Command::InsertBooking(_) => "insert_booking",
        Command::UpdateBookingStatus { .. } => "update_booking_status",
        Command::MarkBookingSeen { .. } => "mark_booking_seen",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectBookings { .. } => "select_bookings",
        Command::Listen { .. } => "listen",
        Command::Unlisten { .. } => "unlisten",
    }
}
