use crate::limits::*;
use crate::model::*;

use super::EngineError;

fn violation(msg: String) -> EngineError {
    EngineError::ScheduleInvariantViolation(msg)
}

/// Every enabled day needs `start < end`, and its breaks must be non-empty
/// ranges inside that window. Disabled days are not checked.
pub(crate) fn validate_weekly_schedule(schedule: &WeeklySchedule) -> Result<(), EngineError> {
    for (weekday, day) in WEEKDAYS.iter().zip(schedule.days.iter()) {
        if !day.enabled {
            continue;
        }
        if day.start >= day.end {
            return Err(violation(format!(
                "{weekday}: start {} is not before end {}",
                day.start, day.end
            )));
        }
        if day.breaks.len() > MAX_BREAKS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many breaks in a day"));
        }
        let window = day.window().span();
        for b in &day.breaks {
            if !b.is_valid() {
                return Err(violation(format!(
                    "{weekday}: break {}-{} is empty or reversed",
                    b.start, b.end
                )));
            }
            if !window.contains_span(&b.span()) {
                return Err(violation(format!(
                    "{weekday}: break {}-{} outside working hours {}-{}",
                    b.start, b.end, day.start, day.end
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_override(availability: &AvailabilityOverride) -> Result<(), EngineError> {
    let interval = availability.slot_interval_minutes;
    if !(MIN_SLOT_INTERVAL_MINUTES..=MAX_SLOT_INTERVAL_MINUTES).contains(&interval) {
        return Err(violation(format!(
            "slot interval {interval} outside {MIN_SLOT_INTERVAL_MINUTES}..={MAX_SLOT_INTERVAL_MINUTES} minutes"
        )));
    }
    let window = availability.default_window;
    if !window.is_valid() {
        return Err(violation(format!(
            "default window start {} is not before end {}",
            window.start, window.end
        )));
    }
    if availability.closed_dates.len() > MAX_CLOSED_DATES {
        return Err(EngineError::LimitExceeded("too many closed dates"));
    }
    if availability.custom_slots.len() > MAX_CUSTOM_SLOT_DATES {
        return Err(EngineError::LimitExceeded("too many custom slot dates"));
    }
    for (date, times) in &availability.custom_slots {
        if times.len() > MAX_CUSTOM_SLOTS_PER_DATE {
            return Err(EngineError::LimitExceeded("too many custom slots for one date"));
        }
        if let Some(t) = times.iter().find(|t| **t == TimeOfDay::END_OF_DAY) {
            return Err(violation(format!("{date}: custom slot {t} starts at end of day")));
        }
    }
    Ok(())
}

/// Sum of service durations for a booking.
pub(crate) fn total_duration(services: &[Service]) -> Result<Minutes, EngineError> {
    if services.len() > MAX_SERVICES_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many services in one booking"));
    }
    let mut total: Minutes = 0;
    for service in services {
        if service.name.len() > MAX_SERVICE_NAME_LEN {
            return Err(EngineError::LimitExceeded("service name too long"));
        }
        total = total
            .checked_add(service.duration_minutes)
            .ok_or(EngineError::LimitExceeded("booking longer than a day"))?;
    }
    if total == 0 {
        return Err(EngineError::InvalidDuration(total));
    }
    if total > MAX_BOOKING_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("booking longer than a day"));
    }
    Ok(total)
}
