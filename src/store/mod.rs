//! Storage collaborators of the engine: the schedule store (per-professional
//! templates and overrides) and the appointment ledger.
//!
//! Both are async traits so the engine never depends on a storage technology.
//! [`InMemoryStore`] is the volatile implementation; [`DurableStore`] layers
//! the write-ahead log over it.

mod durable;
mod memory;

pub use durable::DurableStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Create a professional with the given template. Fails on a duplicate id.
    async fn register_professional(
        &self,
        id: Ulid,
        name: String,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError>;

    async fn list_professionals(&self) -> Vec<ProfessionalInfo>;

    async fn get_weekly_schedule(&self, professional_id: Ulid) -> Result<WeeklySchedule, EngineError>;

    /// Full replacement, never a merge.
    async fn set_weekly_schedule(
        &self,
        professional_id: Ulid,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError>;

    /// `Ok(None)` when the professional exists but never configured an override.
    async fn get_availability_override(
        &self,
        professional_id: Ulid,
    ) -> Result<Option<AvailabilityOverride>, EngineError>;

    /// Full replacement, never a merge.
    async fn set_availability_override(
        &self,
        professional_id: Ulid,
        availability: AvailabilityOverride,
    ) -> Result<(), EngineError>;
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Appointments for one professional and day ordered by start time,
    /// skipping any whose status is in `exclude`.
    async fn list_appointments(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
        exclude: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, EngineError>;

    async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError>;

    async fn append_appointment(&self, appointment: Appointment) -> Result<(), EngineError>;

    /// Overwrite the status and return the updated record. Transition rules
    /// are the caller's concern.
    async fn set_appointment_status(
        &self,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, EngineError>;
}
