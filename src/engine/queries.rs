use chrono::{Days, NaiveDate, NaiveDateTime};
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{effective_override, is_bookable};
use super::slots::generate_slots;
use super::{Engine, EngineError};

impl Engine {
    /// Whether `date` takes bookings at all for this professional.
    pub async fn is_date_available(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
    ) -> Result<bool, EngineError> {
        let availability = self.effective_availability(professional_id).await?;
        Ok(is_bookable(&availability, date))
    }

    /// Bookable dates in `[from, from + days)`.
    pub async fn available_dates(
        &self,
        professional_id: Ulid,
        from: NaiveDate,
        days: u32,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        if days > MAX_DATE_SCAN_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        let availability = self.effective_availability(professional_id).await?;
        Ok((0..days)
            .filter_map(|offset| from.checked_add_days(Days::new(offset.into())))
            .filter(|date| is_bookable(&availability, *date))
            .collect())
    }

    /// Candidate start times for a service of `duration` minutes on `date`,
    /// each tagged available or not. `now` decides which starts are past.
    ///
    /// Takes no lock: the result may be stale by the time a booking is
    /// attempted, which `book_appointment` re-checks.
    pub async fn generate_slots(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
        duration: Minutes,
        now: NaiveDateTime,
    ) -> Result<Vec<Slot>, EngineError> {
        if duration == 0 {
            return Err(EngineError::InvalidDuration(duration));
        }
        let schedule = self.schedules.get_weekly_schedule(professional_id).await?;
        let stored = self
            .schedules
            .get_availability_override(professional_id)
            .await?;
        let booked = self
            .ledger
            .list_appointments(professional_id, date, &[AppointmentStatus::Cancelled])
            .await?;
        let slots = generate_slots(&schedule, stored.as_ref(), date, duration, &booked, now)?;
        metrics::histogram!(observability::SLOTS_PER_QUERY).record(slots.len() as f64);
        Ok(slots)
    }

    /// The stored override, `None` if the professional never configured one.
    pub async fn availability_override(
        &self,
        professional_id: Ulid,
    ) -> Result<Option<AvailabilityOverride>, EngineError> {
        self.schedules.get_availability_override(professional_id).await
    }

    /// The override in force, derived from the weekly template when the
    /// professional never stored one.
    pub async fn effective_availability(
        &self,
        professional_id: Ulid,
    ) -> Result<AvailabilityOverride, EngineError> {
        let schedule = self.schedules.get_weekly_schedule(professional_id).await?;
        let stored = self
            .schedules
            .get_availability_override(professional_id)
            .await?;
        Ok(effective_override(&schedule, stored.as_ref()).into_owned())
    }

    pub async fn weekly_schedule(&self, professional_id: Ulid) -> Result<WeeklySchedule, EngineError> {
        self.schedules.get_weekly_schedule(professional_id).await
    }

    pub async fn list_professionals(&self) -> Vec<ProfessionalInfo> {
        self.schedules.list_professionals().await
    }

    /// Non-cancelled appointments for a day, in start order.
    pub async fn list_appointments(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, EngineError> {
        self.schedules.get_weekly_schedule(professional_id).await?;
        self.ledger
            .list_appointments(professional_id, date, &[AppointmentStatus::Cancelled])
            .await
    }

    pub async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.ledger.get_appointment(id).await
    }

    /// Every event committed for this professional from now on.
    pub fn subscribe(&self, professional_id: Ulid) -> broadcast::Receiver<Event> {
        self.notify.subscribe(professional_id)
    }
}
