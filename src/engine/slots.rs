use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::model::*;

use super::availability::{effective_override, is_bookable, working_window};
use super::conflict::{first_conflict, is_future};
use super::EngineError;

// ── Slot generation ───────────────────────────────────────────────

/// Candidate start times for one day, ascending and deduplicated.
///
/// With a custom list, those times are used as given (only dropping any that
/// would run past midnight). Otherwise the window is walked in `interval`
/// steps and a start is offered only if the whole service ends by the
/// window's end.
pub fn candidate_times(
    window: TimeRange,
    custom: Option<&[TimeOfDay]>,
    interval: Minutes,
    duration: Minutes,
) -> Vec<TimeOfDay> {
    if let Some(custom) = custom {
        let mut times: Vec<TimeOfDay> = custom
            .iter()
            .copied()
            .filter(|t| t.checked_add(duration).is_some())
            .collect();
        times.sort();
        times.dedup();
        return times;
    }

    let step = interval.max(1);
    let mut times = Vec::new();
    let mut t = window.start;
    while let Some(end) = t.checked_add(duration)
        && end <= window.end
    {
        times.push(t);
        match t.checked_add(step) {
            Some(next) => t = next,
            None => break,
        }
    }
    times
}

/// Every candidate start for `date`, tagged with its availability.
///
/// `booked` is the day's ledger sorted by start; cancelled entries are
/// ignored. A date that is closed or not a working day yields an empty list.
/// Reasons are checked in order past, closed (break), booked.
pub fn generate_slots(
    schedule: &WeeklySchedule,
    stored: Option<&AvailabilityOverride>,
    date: NaiveDate,
    duration: Minutes,
    booked: &[Appointment],
    now: NaiveDateTime,
) -> Result<Vec<Slot>, EngineError> {
    if duration == 0 {
        return Err(EngineError::InvalidDuration(duration));
    }
    let availability = effective_override(schedule, stored);
    if !is_bookable(&availability, date) {
        return Ok(Vec::new());
    }

    let (window, breaks) = working_window(schedule, &availability, date.weekday());
    let custom = availability.custom_slots.get(&date).map(Vec::as_slice);
    let candidates = candidate_times(window, custom, availability.slot_interval_minutes, duration);

    let slots = candidates
        .into_iter()
        .map(|time| {
            let span = time.span(duration);
            if !is_future(date, time, now) {
                Slot::blocked(time, UnavailableReason::Past)
            } else if breaks.iter().any(|b| b.span().overlaps(&span)) {
                Slot::blocked(time, UnavailableReason::Closed)
            } else if first_conflict(booked, &span).is_some() {
                Slot::blocked(time, UnavailableReason::Booked)
            } else {
                Slot::open(time)
            }
        })
        .collect();
    Ok(slots)
}
