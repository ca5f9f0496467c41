use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{AppointmentStatus, Minutes, TimeOfDay, UnavailableReason};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("professional not found: {0}")]
    ProfessionalNotFound(Ulid),
    #[error("appointment not found: {0}")]
    AppointmentNotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("invalid service duration: {0} minutes")]
    InvalidDuration(Minutes),
    #[error("slot {date} {time} unavailable: {}", reason_label(.reason))]
    SlotUnavailable {
        date: NaiveDate,
        time: TimeOfDay,
        /// `None` when the time is not a candidate start at all.
        reason: Option<UnavailableReason>,
    },
    #[error("schedule invariant violated: {0}")]
    ScheduleInvariantViolation(String),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

fn reason_label(reason: &Option<UnavailableReason>) -> &'static str {
    match reason {
        Some(UnavailableReason::Booked) => "booked",
        Some(UnavailableReason::Closed) => "closed",
        Some(UnavailableReason::Past) => "past",
        None => "not offered",
    }
}

impl EngineError {
    /// Stable machine-readable name, used on the wire and as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::ProfessionalNotFound(_) => "professional_not_found",
            EngineError::AppointmentNotFound(_) => "appointment_not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidDuration(_) => "invalid_duration",
            EngineError::SlotUnavailable { .. } => "slot_unavailable",
            EngineError::ScheduleInvariantViolation(_) => "schedule_invariant_violation",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}
