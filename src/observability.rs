use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "slotbook_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "slotbook_request_duration_seconds";

/// Counter: booking attempts. Labels: outcome (booked, rejected).
pub const BOOKINGS_TOTAL: &str = "slotbook_bookings_total";

/// Counter: appointment status changes. Labels: status.
pub const STATUS_CHANGES_TOTAL: &str = "slotbook_status_changes_total";

/// Histogram: slots returned per availability query.
pub const SLOTS_PER_QUERY: &str = "slotbook_slots_per_query";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotbook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotbook_wal_compactions_total";

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

/// Map a Request variant to a short label for metrics.
pub fn request_label(request: &Request) -> &'static str {
    match request {
        Request::RegisterProfessional { .. } => "register_professional",
        Request::ListProfessionals => "list_professionals",
        Request::GetWeeklySchedule { .. } => "get_weekly_schedule",
        Request::SetWeeklySchedule { .. } => "set_weekly_schedule",
        Request::GetAvailabilityOverride { .. } => "get_availability_override",
        Request::GetEffectiveAvailability { .. } => "get_effective_availability",
        Request::SetAvailabilityOverride { .. } => "set_availability_override",
        Request::IsDateAvailable { .. } => "is_date_available",
        Request::AvailableDates { .. } => "available_dates",
        Request::GenerateSlots { .. } => "generate_slots",
        Request::BookAppointment(_) => "book_appointment",
        Request::ConfirmAppointment { .. } => "confirm_appointment",
        Request::CompleteAppointment { .. } => "complete_appointment",
        Request::CancelAppointment { .. } => "cancel_appointment",
        Request::GetAppointment { .. } => "get_appointment",
        Request::ListAppointments { .. } => "list_appointments",
        Request::Watch { .. } => "watch",
    }
}
