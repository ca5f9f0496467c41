use chrono::NaiveDateTime;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::slots::generate_slots;
use super::validate::{total_duration, validate_override, validate_weekly_schedule};
use super::{Engine, EngineError};

impl Engine {
    /// Register a professional with the default weekly template.
    pub async fn register_professional(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("professional name too long"));
        }
        let schedule = WeeklySchedule::default();
        self.schedules
            .register_professional(id, name.clone(), schedule.clone())
            .await?;
        info!("registered professional {id}");
        self.notify
            .send(id, &Event::ProfessionalRegistered { id, name, schedule });
        Ok(())
    }

    /// Replace the weekly template.
    pub async fn set_weekly_schedule(
        &self,
        professional_id: Ulid,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        validate_weekly_schedule(&schedule)?;
        self.schedules
            .set_weekly_schedule(professional_id, schedule.clone())
            .await?;
        info!("weekly schedule replaced for {professional_id}");
        self.notify.send(
            professional_id,
            &Event::WeeklyScheduleSet {
                professional_id,
                schedule,
            },
        );
        Ok(())
    }

    /// Replace the availability override.
    pub async fn set_availability_override(
        &self,
        professional_id: Ulid,
        availability: AvailabilityOverride,
    ) -> Result<(), EngineError> {
        validate_override(&availability)?;
        self.schedules
            .set_availability_override(professional_id, availability.clone())
            .await?;
        info!(
            "availability override replaced for {professional_id}: {} closed dates, {} custom dates",
            availability.closed_dates.len(),
            availability.custom_slots.len()
        );
        self.notify.send(
            professional_id,
            &Event::AvailabilityOverrideSet {
                professional_id,
                availability,
            },
        );
        Ok(())
    }

    /// Book the requested start time if, at commit time, it is an available
    /// slot for the combined duration of the requested services.
    ///
    /// Slots are regenerated from the ledger inside the day's critical
    /// section, so two concurrent requests for overlapping times cannot both
    /// pass the check.
    pub async fn book_appointment(
        &self,
        request: BookingRequest,
        now: NaiveDateTime,
    ) -> Result<Appointment, EngineError> {
        let duration = total_duration(&request.services)?;
        let BookingRequest {
            professional_id,
            client_id,
            date,
            time,
            services,
        } = request;

        let lock = self.day_lock(professional_id, date);
        let _section = lock.lock().await;

        let schedule = self.schedules.get_weekly_schedule(professional_id).await?;
        let stored = self
            .schedules
            .get_availability_override(professional_id)
            .await?;
        let booked = self
            .ledger
            .list_appointments(professional_id, date, &[AppointmentStatus::Cancelled])
            .await?;
        if booked.len() >= MAX_APPOINTMENTS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many appointments in one day"));
        }

        let slots = generate_slots(&schedule, stored.as_ref(), date, duration, &booked, now)?;
        match slots.iter().find(|s| s.time == time) {
            Some(slot) if slot.available => {}
            found => {
                let reason = found.and_then(|s| s.reason);
                debug!("booking {professional_id} {date} {time} ({duration}m) rejected: {reason:?}");
                metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => "rejected")
                    .increment(1);
                return Err(EngineError::SlotUnavailable { date, time, reason });
            }
        }

        let appointment = Appointment {
            id: Ulid::new(),
            professional_id,
            client_id,
            date,
            start: time,
            duration_minutes: duration,
            services,
            status: AppointmentStatus::Scheduled,
            created_at: now,
        };
        self.ledger.append_appointment(appointment.clone()).await?;

        info!(
            "booked {} for {professional_id} on {date} at {time} ({duration}m)",
            appointment.id
        );
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => "booked").increment(1);
        self.notify.send(
            professional_id,
            &Event::AppointmentBooked {
                appointment: appointment.clone(),
            },
        );
        Ok(appointment)
    }

    pub async fn confirm_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, AppointmentStatus::Confirmed).await
    }

    pub async fn complete_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, AppointmentStatus::Completed).await
    }

    /// Retire an appointment from conflict checks. The record is kept.
    pub async fn cancel_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, AppointmentStatus::Cancelled).await
    }

    async fn transition(&self, id: Ulid, to: AppointmentStatus) -> Result<Appointment, EngineError> {
        let located = self.ledger.get_appointment(id).await?;
        let lock = self.day_lock(located.professional_id, located.date);
        let _section = lock.lock().await;

        // Re-read: the status may have moved while waiting for the section.
        let current = self.ledger.get_appointment(id).await?;
        if !current.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        let updated = self.ledger.set_appointment_status(id, to).await?;

        info!("appointment {id}: {} -> {to}", current.status);
        metrics::counter!(observability::STATUS_CHANGES_TOTAL, "status" => to.as_str()).increment(1);
        self.notify.send(
            updated.professional_id,
            &Event::AppointmentStatusChanged {
                id,
                professional_id: updated.professional_id,
                date: updated.date,
                status: to,
            },
        );
        Ok(updated)
    }
}
