use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{InMemoryStore, Ledger, ScheduleStore};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while one fsync is running are
/// written together and made durable by a single `flush_sync`.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("wal flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(
                result
                    .as_ref()
                    .map(|_| ())
                    .map_err(|e| io::Error::new(e.kind(), e.to_string())),
            );
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-buffered bytes never leak
    // into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and(wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

/// In-memory state made durable by a write-ahead log. A mutation is applied
/// to memory only after its event is fsynced.
pub struct DurableStore {
    mem: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    path: PathBuf,
    /// Shared by in-flight mutations, exclusive while compaction snapshots
    /// state, so no logged-but-unapplied event is dropped from the new log.
    commit_gate: RwLock<()>,
    /// Per professional: validate, log and apply run as one step.
    write_locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl DurableStore {
    /// Replay the log at `path`, cut any torn tail, and start its writer
    /// task. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::recover(path)?;
        let mem = InMemoryStore::new();
        for event in &events {
            mem.apply_event(event);
        }
        tracing::info!(
            "replayed {} events from {}: {} professionals, {} appointments",
            events.len(),
            path.display(),
            mem.professional_count(),
            mem.appointment_count()
        );

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            mem,
            wal_tx,
            path: path.to_path_buf(),
            commit_gate: RwLock::new(()),
            write_locks: DashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Validate, log, then apply, serialized per professional.
    async fn persist(&self, event: &Event) -> Result<(), EngineError> {
        let professional_id = event.professional_id();
        let lock = self
            .write_locks
            .entry(professional_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _write = lock.lock().await;
            let _gate = self.commit_gate.read().await;
            self.commit(event).await
        };
        drop(lock);
        if !self.mem.has_professional(&professional_id) {
            self.write_locks
                .remove_if(&professional_id, |_, l| Arc::strong_count(l) == 1);
        }
        result
    }

    async fn commit(&self, event: &Event) -> Result<(), EngineError> {
        self.mem.validate(event)?;
        self.wal_append(event).await?;
        self.mem.apply_event(event);
        Ok(())
    }

    pub fn write_lock_count(&self) -> usize {
        self.write_locks.len()
    }

    /// Rewrite the log as the minimal event sequence for the current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let events = self.mem.snapshot();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ScheduleStore for DurableStore {
    async fn register_professional(
        &self,
        id: Ulid,
        name: String,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        self.persist(&Event::ProfessionalRegistered { id, name, schedule }).await
    }

    async fn list_professionals(&self) -> Vec<ProfessionalInfo> {
        self.mem.professionals()
    }

    async fn get_weekly_schedule(&self, professional_id: Ulid) -> Result<WeeklySchedule, EngineError> {
        self.mem.weekly_schedule(&professional_id)
    }

    async fn set_weekly_schedule(
        &self,
        professional_id: Ulid,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        self.persist(&Event::WeeklyScheduleSet {
            professional_id,
            schedule,
        })
        .await
    }

    async fn get_availability_override(
        &self,
        professional_id: Ulid,
    ) -> Result<Option<AvailabilityOverride>, EngineError> {
        self.mem.availability_override(&professional_id)
    }

    async fn set_availability_override(
        &self,
        professional_id: Ulid,
        availability: AvailabilityOverride,
    ) -> Result<(), EngineError> {
        self.persist(&Event::AvailabilityOverrideSet {
            professional_id,
            availability,
        })
        .await
    }
}

#[async_trait]
impl Ledger for DurableStore {
    async fn list_appointments(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
        exclude: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.mem.day_appointments(professional_id, date, exclude))
    }

    async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.mem.appointment(id)
    }

    async fn append_appointment(&self, appointment: Appointment) -> Result<(), EngineError> {
        self.persist(&Event::AppointmentBooked { appointment }).await
    }

    async fn set_appointment_status(
        &self,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let event = self.mem.status_event(id, status)?;
        self.persist(&event).await?;
        self.mem.appointment(id)
    }
}
