mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;
mod validate;
#[cfg(test)]
mod tests;

pub use availability::{effective_override, is_bookable, working_window};
pub use conflict::{first_conflict, is_future};
pub use error::EngineError;
pub use slots::{candidate_times, generate_slots};

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::notify::NotifyHub;
use crate::store::{Ledger, ScheduleStore};

type DayLock = Arc<Mutex<()>>;

/// Availability resolution, slot generation and booking over injected
/// schedule and ledger stores.
///
/// Reads never lock. Every ledger write for a `(professional, date)` pair
/// runs inside that pair's critical section, and the booking check is
/// re-derived from the ledger inside the section before the append.
pub struct Engine {
    schedules: Arc<dyn ScheduleStore>,
    ledger: Arc<dyn Ledger>,
    pub notify: Arc<NotifyHub>,
    day_locks: DashMap<(Ulid, NaiveDate), DayLock>,
}

impl Engine {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        ledger: Arc<dyn Ledger>,
        notify: Arc<NotifyHub>,
    ) -> Self {
        Self {
            schedules,
            ledger,
            notify,
            day_locks: DashMap::new(),
        }
    }

    /// One store serving as both schedule store and ledger.
    pub fn with_store<S>(store: Arc<S>, notify: Arc<NotifyHub>) -> Self
    where
        S: ScheduleStore + Ledger + 'static,
    {
        Self::new(store.clone(), store, notify)
    }

    pub(super) fn day_lock(&self, professional_id: Ulid, date: NaiveDate) -> DayLock {
        self.day_locks
            .entry((professional_id, date))
            .or_default()
            .clone()
    }

    /// Drop idle critical sections for days before `today`. Returns how many
    /// were removed.
    pub fn prune_day_locks(&self, today: NaiveDate) -> usize {
        let before = self.day_locks.len();
        self.day_locks
            .retain(|(_, date), lock| *date >= today || Arc::strong_count(lock) > 1);
        before - self.day_locks.len()
    }

    pub fn day_lock_count(&self) -> usize {
        self.day_locks.len()
    }
}
