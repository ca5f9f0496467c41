use chrono::NaiveDateTime;

use crate::model::*;

/// First active appointment whose interval intersects `span` (half-open, so
/// back-to-back intervals do not conflict). `booked` must be sorted by start.
pub fn first_conflict<'a>(booked: &'a [Appointment], span: &Span) -> Option<&'a Appointment> {
    // Everything at index >= right_bound starts at or after span.end.
    let right_bound = booked.partition_point(|a| a.start.minutes() < span.end);
    booked[..right_bound]
        .iter()
        .filter(|a| a.status.is_active())
        .find(|a| a.span().overlaps(span))
}

/// Whether `date` at `time` lies strictly after `now`.
pub fn is_future(date: chrono::NaiveDate, time: TimeOfDay, now: NaiveDateTime) -> bool {
    match date.cmp(&now.date()) {
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Equal => {
            let now_minute = TimeOfDay::from_naive_time(now.time());
            // Seconds are truncated, so the current minute already counts as past.
            time > now_minute
        }
    }
}
