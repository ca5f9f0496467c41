use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Whole minutes, the only duration type.
pub type Minutes = u32;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Default slot granularity when a professional never configured one.
pub const DEFAULT_SLOT_INTERVAL_MINUTES: Minutes = 30;

// ── Time of day ──────────────────────────────────────────────────

/// Wall-clock time with minute resolution, `00:00` through `24:00` inclusive.
/// `24:00` is only meaningful as the end of a working window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time of day {0:?} (expected HH:MM between 00:00 and 24:00)")]
pub struct ParseTimeError(pub String);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY as u16);

    pub fn from_minutes(minutes: Minutes) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(TimeOfDay(minutes as u16))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minutes(hour.checked_mul(60)?.checked_add(minute)?)
    }

    /// Truncates seconds: 10:00:59 becomes 10:00.
    pub fn from_naive_time(time: NaiveTime) -> Self {
        TimeOfDay((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn minutes(self) -> Minutes {
        self.0 as Minutes
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    pub fn checked_add(self, minutes: Minutes) -> Option<Self> {
        Self::from_minutes(self.minutes().checked_add(minutes)?)
    }

    /// Span starting here and lasting `duration` minutes. May run past 24:00.
    pub fn span(self, duration: Minutes) -> Span {
        Span::new(self.minutes(), self.minutes() + duration)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(err());
        }
        let hour: u32 = h.parse().map_err(|_| err())?;
        let minute: u32 = m.parse().map_err(|_| err())?;
        TimeOfDay::from_hm(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Half-open interval `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A `[start, end)` pair of wall-clock times, e.g. a lunch break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn span(&self) -> Span {
        Span::new(self.start.minutes(), self.end.minutes())
    }
}

// ── Schedules ────────────────────────────────────────────────────

pub fn weekday_index(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Working window for one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// Sub-intervals inside `[start, end)` with no bookings (lunch, admin time).
    #[serde(default)]
    pub breaks: Vec<TimeRange>,
}

impl DaySchedule {
    pub fn open(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self {
            enabled: true,
            start,
            end,
            breaks: Vec::new(),
        }
    }

    pub fn closed() -> Self {
        Self {
            enabled: false,
            ..Self::open(TimeOfDay(9 * 60), TimeOfDay(18 * 60))
        }
    }

    pub fn window(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Seven day templates, Monday first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub days: [DaySchedule; 7],
}

impl Default for WeeklySchedule {
    /// Monday to Friday 09:00–18:00, weekend off.
    fn default() -> Self {
        let weekday = DaySchedule::open(TimeOfDay(9 * 60), TimeOfDay(18 * 60));
        Self {
            days: [
                weekday.clone(),
                weekday.clone(),
                weekday.clone(),
                weekday.clone(),
                weekday,
                DaySchedule::closed(),
                DaySchedule::closed(),
            ],
        }
    }
}

impl WeeklySchedule {
    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        &self.days[weekday_index(weekday)]
    }

    pub fn day_mut(&mut self, weekday: Weekday) -> &mut DaySchedule {
        &mut self.days[weekday_index(weekday)]
    }
}

/// Per-professional exception layer over the weekly template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub slot_interval_minutes: Minutes,
    /// Which weekdays take bookings at all, Monday first.
    pub working_days: [bool; 7],
    /// Window used for a working day whose weekly template is disabled.
    pub default_window: TimeRange,
    #[serde(default)]
    pub closed_dates: BTreeSet<NaiveDate>,
    /// Explicit candidate start times replacing the generated grid for a date.
    #[serde(default)]
    pub custom_slots: BTreeMap<NaiveDate, Vec<TimeOfDay>>,
}

impl AvailabilityOverride {
    /// The override a professional implicitly has before configuring one:
    /// weekday flags copied from the template, Monday's hours as the fallback window.
    /// A disabled Monday is not validated, so a reversed window there falls back
    /// to the closed-day hours.
    pub fn derived_from(schedule: &WeeklySchedule) -> Self {
        let monday = schedule.day(Weekday::Mon).window();
        let default_window = if monday.is_valid() {
            monday
        } else {
            DaySchedule::closed().window()
        };
        let mut working_days = [false; 7];
        for (flag, day) in working_days.iter_mut().zip(schedule.days.iter()) {
            *flag = day.enabled;
        }
        Self {
            slot_interval_minutes: DEFAULT_SLOT_INTERVAL_MINUTES,
            working_days,
            default_window,
            closed_dates: BTreeSet::new(),
            custom_slots: BTreeMap::new(),
        }
    }

    pub fn works_on(&self, weekday: Weekday) -> bool {
        self.working_days[weekday_index(weekday)]
    }

    pub fn is_closed(&self, date: NaiveDate) -> bool {
        self.closed_dates.contains(&date)
    }
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Whether the appointment still occupies its time.
    pub fn is_active(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, Confirmed) | (Confirmed, Completed) | (Scheduled, Cancelled) | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub duration_minutes: Minutes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub professional_id: Ulid,
    pub client_id: Ulid,
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub duration_minutes: Minutes,
    pub services: Vec<Service>,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
}

impl Appointment {
    pub fn span(&self) -> Span {
        self.start.span(self.duration_minutes)
    }
}

/// Input to the booking writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub professional_id: Ulid,
    pub client_id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub services: Vec<Service>,
}

// ── Slots ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Booked,
    Closed,
    Past,
}

/// A candidate start time with its availability verdict. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub time: TimeOfDay,
    pub available: bool,
    pub reason: Option<UnavailableReason>,
}

impl Slot {
    pub fn open(time: TimeOfDay) -> Self {
        Self {
            time,
            available: true,
            reason: None,
        }
    }

    pub fn blocked(time: TimeOfDay, reason: UnavailableReason) -> Self {
        Self {
            time,
            available: false,
            reason: Some(reason),
        }
    }
}

// ── Durable record format ────────────────────────────────────────

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProfessionalRegistered {
        id: Ulid,
        name: String,
        schedule: WeeklySchedule,
    },
    WeeklyScheduleSet {
        professional_id: Ulid,
        schedule: WeeklySchedule,
    },
    AvailabilityOverrideSet {
        professional_id: Ulid,
        availability: AvailabilityOverride,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        id: Ulid,
        professional_id: Ulid,
        date: NaiveDate,
        status: AppointmentStatus,
    },
}

impl Event {
    pub fn professional_id(&self) -> Ulid {
        match self {
            Event::ProfessionalRegistered { id, .. } => *id,
            Event::WeeklyScheduleSet { professional_id, .. }
            | Event::AvailabilityOverrideSet { professional_id, .. }
            | Event::AppointmentStatusChanged { professional_id, .. } => *professional_id,
            Event::AppointmentBooked { appointment } => appointment.professional_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionalInfo {
    pub id: Ulid,
    pub name: String,
}
