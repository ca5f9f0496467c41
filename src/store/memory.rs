use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::*;
use crate::model::*;

use super::{Ledger, ScheduleStore};

#[derive(Debug, Clone)]
struct ProfessionalRecord {
    name: String,
    schedule: WeeklySchedule,
    availability: Option<AvailabilityOverride>,
}

type DayKey = (Ulid, NaiveDate);

/// Keyed maps holding schedules and the appointment ledger. All writes go
/// through [`InMemoryStore::apply_event`], so the same code path serves live
/// mutations and WAL replay.
pub struct InMemoryStore {
    professionals: DashMap<Ulid, ProfessionalRecord>,
    /// Per professional and day, sorted by start time.
    appointments: DashMap<DayKey, Vec<Appointment>>,
    /// Reverse lookup: appointment id → owning day.
    appointment_index: DashMap<Ulid, DayKey>,
    /// Makes validate-then-apply atomic for direct callers.
    commit_lock: Mutex<()>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            professionals: DashMap::new(),
            appointments: DashMap::new(),
            appointment_index: DashMap::new(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn has_professional(&self, id: &Ulid) -> bool {
        self.professionals.contains_key(id)
    }

    pub fn professional_count(&self) -> usize {
        self.professionals.len()
    }

    pub fn appointment_count(&self) -> usize {
        self.appointment_index.len()
    }

    fn require_professional(&self, id: &Ulid) -> Result<(), EngineError> {
        if self.professionals.contains_key(id) {
            Ok(())
        } else {
            Err(EngineError::ProfessionalNotFound(*id))
        }
    }

    /// Check that `event` can be applied to the current state.
    pub fn validate(&self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::ProfessionalRegistered { id, .. } => {
                if self.professionals.contains_key(id) {
                    return Err(EngineError::AlreadyExists(*id));
                }
                if self.professionals.len() >= MAX_PROFESSIONALS {
                    return Err(EngineError::LimitExceeded("too many professionals"));
                }
                Ok(())
            }
            Event::WeeklyScheduleSet { professional_id, .. }
            | Event::AvailabilityOverrideSet { professional_id, .. } => {
                self.require_professional(professional_id)
            }
            Event::AppointmentBooked { appointment } => {
                self.require_professional(&appointment.professional_id)?;
                if self.appointment_index.contains_key(&appointment.id) {
                    return Err(EngineError::AlreadyExists(appointment.id));
                }
                Ok(())
            }
            Event::AppointmentStatusChanged { id, .. } => {
                if self.appointment_index.contains_key(id) {
                    Ok(())
                } else {
                    Err(EngineError::AppointmentNotFound(*id))
                }
            }
        }
    }

    /// Apply a validated event. Events referring to unknown entities are ignored.
    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::ProfessionalRegistered { id, name, schedule } => {
                self.professionals.entry(*id).or_insert_with(|| ProfessionalRecord {
                    name: name.clone(),
                    schedule: schedule.clone(),
                    availability: None,
                });
            }
            Event::WeeklyScheduleSet {
                professional_id,
                schedule,
            } => {
                if let Some(mut record) = self.professionals.get_mut(professional_id) {
                    record.schedule = schedule.clone();
                }
            }
            Event::AvailabilityOverrideSet {
                professional_id,
                availability,
            } => {
                if let Some(mut record) = self.professionals.get_mut(professional_id) {
                    record.availability = Some(availability.clone());
                }
            }
            Event::AppointmentBooked { appointment } => {
                let key = (appointment.professional_id, appointment.date);
                let mut day = self.appointments.entry(key).or_default();
                let pos = day
                    .binary_search_by_key(&appointment.start, |a| a.start)
                    .unwrap_or_else(|e| e);
                day.insert(pos, appointment.clone());
                self.appointment_index.insert(appointment.id, key);
            }
            Event::AppointmentStatusChanged {
                id,
                professional_id,
                date,
                status,
            } => {
                if let Some(mut day) = self.appointments.get_mut(&(*professional_id, *date))
                    && let Some(appointment) = day.iter_mut().find(|a| a.id == *id)
                {
                    appointment.status = *status;
                }
            }
        }
    }

    /// The minimal event sequence that recreates the current state.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for entry in self.professionals.iter() {
            let record = entry.value();
            events.push(Event::ProfessionalRegistered {
                id: *entry.key(),
                name: record.name.clone(),
                schedule: record.schedule.clone(),
            });
            if let Some(availability) = &record.availability {
                events.push(Event::AvailabilityOverrideSet {
                    professional_id: *entry.key(),
                    availability: availability.clone(),
                });
            }
        }
        for day in self.appointments.iter() {
            for appointment in day.value() {
                events.push(Event::AppointmentBooked {
                    appointment: appointment.clone(),
                });
            }
        }
        events
    }

    pub(super) fn status_event(&self, id: Ulid, status: AppointmentStatus) -> Result<Event, EngineError> {
        let (professional_id, date) = self
            .appointment_index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::AppointmentNotFound(id))?;
        Ok(Event::AppointmentStatusChanged {
            id,
            professional_id,
            date,
            status,
        })
    }

    fn commit(&self, event: Event) -> Result<(), EngineError> {
        let _guard = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.validate(&event)?;
        self.apply_event(&event);
        Ok(())
    }

    // ── Reads shared with DurableStore ───────────────────────

    pub(super) fn weekly_schedule(&self, id: &Ulid) -> Result<WeeklySchedule, EngineError> {
        self.professionals
            .get(id)
            .map(|r| r.schedule.clone())
            .ok_or(EngineError::ProfessionalNotFound(*id))
    }

    pub(super) fn availability_override(
        &self,
        id: &Ulid,
    ) -> Result<Option<AvailabilityOverride>, EngineError> {
        self.professionals
            .get(id)
            .map(|r| r.availability.clone())
            .ok_or(EngineError::ProfessionalNotFound(*id))
    }

    pub(super) fn professionals(&self) -> Vec<ProfessionalInfo> {
        let mut list: Vec<ProfessionalInfo> = self
            .professionals
            .iter()
            .map(|e| ProfessionalInfo {
                id: *e.key(),
                name: e.value().name.clone(),
            })
            .collect();
        list.sort_by_key(|p| p.id);
        list
    }

    pub(super) fn day_appointments(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
        exclude: &[AppointmentStatus],
    ) -> Vec<Appointment> {
        self.appointments
            .get(&(professional_id, date))
            .map(|day| {
                day.iter()
                    .filter(|a| !exclude.contains(&a.status))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(super) fn appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let key = self
            .appointment_index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::AppointmentNotFound(id))?;
        self.appointments
            .get(&key)
            .and_then(|day| day.iter().find(|a| a.id == id).cloned())
            .ok_or(EngineError::AppointmentNotFound(id))
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn register_professional(
        &self,
        id: Ulid,
        name: String,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        self.commit(Event::ProfessionalRegistered { id, name, schedule })
    }

    async fn list_professionals(&self) -> Vec<ProfessionalInfo> {
        self.professionals()
    }

    async fn get_weekly_schedule(&self, professional_id: Ulid) -> Result<WeeklySchedule, EngineError> {
        self.weekly_schedule(&professional_id)
    }

    async fn set_weekly_schedule(
        &self,
        professional_id: Ulid,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        self.commit(Event::WeeklyScheduleSet {
            professional_id,
            schedule,
        })
    }

    async fn get_availability_override(
        &self,
        professional_id: Ulid,
    ) -> Result<Option<AvailabilityOverride>, EngineError> {
        self.availability_override(&professional_id)
    }

    async fn set_availability_override(
        &self,
        professional_id: Ulid,
        availability: AvailabilityOverride,
    ) -> Result<(), EngineError> {
        self.commit(Event::AvailabilityOverrideSet {
            professional_id,
            availability,
        })
    }
}

#[async_trait]
impl Ledger for InMemoryStore {
    async fn list_appointments(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
        exclude: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.day_appointments(professional_id, date, exclude))
    }

    async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.appointment(id)
    }

    async fn append_appointment(&self, appointment: Appointment) -> Result<(), EngineError> {
        self.commit(Event::AppointmentBooked { appointment })
    }

    async fn set_appointment_status(
        &self,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let event = self.status_event(id, status)?;
        self.commit(event)?;
        self.appointment(id)
    }
}
