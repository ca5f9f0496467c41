use std::borrow::Cow;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::model::*;

// ── Day-level availability ────────────────────────────────────────

/// The override in force: the stored one, or the one implied by the template.
pub fn effective_override<'a>(
    schedule: &WeeklySchedule,
    stored: Option<&'a AvailabilityOverride>,
) -> Cow<'a, AvailabilityOverride> {
    match stored {
        Some(ov) => Cow::Borrowed(ov),
        None => Cow::Owned(AvailabilityOverride::derived_from(schedule)),
    }
}

/// Whether `date` takes bookings at all. A closed date is never bookable,
/// whatever custom slots exist for it.
pub fn is_bookable(availability: &AvailabilityOverride, date: NaiveDate) -> bool {
    if availability.is_closed(date) {
        return false;
    }
    availability.works_on(date.weekday())
}

/// Working window and breaks for a weekday.
///
/// An enabled template day supplies its own hours and breaks. A day the
/// override marks as working while the template has it disabled falls back
/// to the override's default window with no breaks.
pub fn working_window<'a>(
    schedule: &'a WeeklySchedule,
    availability: &AvailabilityOverride,
    weekday: Weekday,
) -> (TimeRange, &'a [TimeRange]) {
    let day = schedule.day(weekday);
    if day.enabled {
        (day.window(), &day.breaks)
    } else {
        (availability.default_window, &[])
    }
}
