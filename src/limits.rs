use crate::model::Minutes;

pub const MAX_PROFESSIONALS: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SERVICE_NAME_LEN: usize = 256;
pub const MAX_SERVICES_PER_BOOKING: usize = 16;
/// A booking must fit inside a single day.
pub const MAX_BOOKING_DURATION_MINUTES: Minutes = 24 * 60;
pub const MAX_APPOINTMENTS_PER_DAY: usize = 1_440;

pub const MIN_SLOT_INTERVAL_MINUTES: Minutes = 5;
pub const MAX_SLOT_INTERVAL_MINUTES: Minutes = 24 * 60;
pub const MAX_BREAKS_PER_DAY: usize = 16;
pub const MAX_CLOSED_DATES: usize = 3_660;
pub const MAX_CUSTOM_SLOT_DATES: usize = 3_660;
pub const MAX_CUSTOM_SLOTS_PER_DATE: usize = 288;

/// Widest range `available_dates` will scan.
pub const MAX_DATE_SCAN_DAYS: u32 = 366;

/// Longest accepted JSON request line on the wire.
pub const MAX_LINE_LEN: usize = 256 * 1024;
