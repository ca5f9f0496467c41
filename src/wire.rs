//! Newline-delimited JSON protocol over TCP.
//!
//! Each request is one JSON object per line, tagged by `op`. Each reply is one
//! line tagged by `status`: `ok` with a `result`, or `error` with a `kind` and
//! `message`. After a `watch`, committed events for that professional are
//! pushed on the same connection as `event` lines, interleaved with replies.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    RegisterProfessional {
        #[serde(default)]
        id: Option<Ulid>,
        name: String,
    },
    ListProfessionals,
    GetWeeklySchedule {
        professional_id: Ulid,
    },
    SetWeeklySchedule {
        professional_id: Ulid,
        schedule: WeeklySchedule,
    },
    /// The stored override, `null` when never configured.
    GetAvailabilityOverride {
        professional_id: Ulid,
    },
    /// The override in force, derived from the weekly schedule if unset.
    GetEffectiveAvailability {
        professional_id: Ulid,
    },
    SetAvailabilityOverride {
        professional_id: Ulid,
        availability: AvailabilityOverride,
    },
    IsDateAvailable {
        professional_id: Ulid,
        date: NaiveDate,
    },
    AvailableDates {
        professional_id: Ulid,
        from: NaiveDate,
        days: u32,
    },
    GenerateSlots {
        professional_id: Ulid,
        date: NaiveDate,
        duration_minutes: Minutes,
    },
    BookAppointment(BookingRequest),
    ConfirmAppointment {
        id: Ulid,
    },
    CompleteAppointment {
        id: Ulid,
    },
    CancelAppointment {
        id: Ulid,
    },
    GetAppointment {
        id: Ulid,
    },
    ListAppointments {
        professional_id: Ulid,
        date: NaiveDate,
    },
    Watch {
        professional_id: Ulid,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { result: Value },
    Error { kind: String, message: String },
    Event { event: Event },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("bad request: {0}")]
    BadRequest(#[from] serde_json::Error),
    #[error("request line too long")]
    LineTooLong,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LinesCodecError> for WireError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => WireError::LineTooLong,
            LinesCodecError::Io(e) => WireError::Io(e),
        }
    }
}

impl WireError {
    pub fn kind(&self) -> &'static str {
        match self {
            WireError::Engine(e) => e.kind(),
            WireError::BadRequest(_) => "bad_request",
            WireError::LineTooLong => "line_too_long",
            WireError::Io(_) => "io",
        }
    }
}

impl From<WireError> for Response {
    fn from(e: WireError) -> Self {
        Response::Error {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

fn wall_clock() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Unknown professionals have no availability; reads answer with `empty`.
fn or_unavailable<T>(result: Result<T, EngineError>, empty: T) -> Result<T, EngineError> {
    match result {
        Err(EngineError::ProfessionalNotFound(_)) => Ok(empty),
        other => other,
    }
}

/// Run one request against the engine. `watch` is handled by the connection.
pub async fn execute(engine: &Engine, request: Request) -> Result<Value, WireError> {
    let value = match request {
        Request::RegisterProfessional { id, name } => {
            let id = id.unwrap_or_else(Ulid::new);
            engine.register_professional(id, name).await?;
            json!({ "id": id })
        }
        Request::ListProfessionals => serde_json::to_value(engine.list_professionals().await)?,
        Request::GetWeeklySchedule { professional_id } => {
            serde_json::to_value(engine.weekly_schedule(professional_id).await?)?
        }
        Request::SetWeeklySchedule {
            professional_id,
            schedule,
        } => {
            engine.set_weekly_schedule(professional_id, schedule).await?;
            Value::Null
        }
        Request::GetAvailabilityOverride { professional_id } => {
            serde_json::to_value(engine.availability_override(professional_id).await?)?
        }
        Request::GetEffectiveAvailability { professional_id } => {
            serde_json::to_value(engine.effective_availability(professional_id).await?)?
        }
        Request::SetAvailabilityOverride {
            professional_id,
            availability,
        } => {
            engine
                .set_availability_override(professional_id, availability)
                .await?;
            Value::Null
        }
        Request::IsDateAvailable {
            professional_id,
            date,
        } => {
            let available =
                or_unavailable(engine.is_date_available(professional_id, date).await, false)?;
            json!(available)
        }
        Request::AvailableDates {
            professional_id,
            from,
            days,
        } => {
            let dates = or_unavailable(
                engine.available_dates(professional_id, from, days).await,
                Vec::new(),
            )?;
            serde_json::to_value(dates)?
        }
        Request::GenerateSlots {
            professional_id,
            date,
            duration_minutes,
        } => {
            let slots = or_unavailable(
                engine
                    .generate_slots(professional_id, date, duration_minutes, wall_clock())
                    .await,
                Vec::new(),
            )?;
            serde_json::to_value(slots)?
        }
        Request::BookAppointment(booking) => {
            serde_json::to_value(engine.book_appointment(booking, wall_clock()).await?)?
        }
        Request::ConfirmAppointment { id } => {
            serde_json::to_value(engine.confirm_appointment(id).await?)?
        }
        Request::CompleteAppointment { id } => {
            serde_json::to_value(engine.complete_appointment(id).await?)?
        }
        Request::CancelAppointment { id } => {
            serde_json::to_value(engine.cancel_appointment(id).await?)?
        }
        Request::GetAppointment { id } => serde_json::to_value(engine.get_appointment(id).await?)?,
        Request::ListAppointments {
            professional_id,
            date,
        } => serde_json::to_value(engine.list_appointments(professional_id, date).await?)?,
        Request::Watch { professional_id } => {
            // Only validates the id; the subscription itself lives on the connection.
            engine.weekly_schedule(professional_id).await?;
            json!({ "watching": professional_id })
        }
    };
    Ok(value)
}

/// Forward one professional's broadcast into the connection's event queue
/// until either side goes away.
async fn forward_events(
    professional_id: Ulid,
    mut rx: broadcast::Receiver<Event>,
    tx: mpsc::Sender<Event>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("watcher of {professional_id} lagged, {n} events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Event forwarders for one connection, at most one per professional.
/// Dropping it aborts every forwarder.
#[derive(Default)]
struct Watchers {
    tasks: JoinSet<()>,
    watched: HashSet<Ulid>,
}

impl Watchers {
    /// Start forwarding `professional_id`'s events. A repeat watch is a no-op.
    fn watch(&mut self, engine: &Engine, professional_id: Ulid, events: &mpsc::Sender<Event>) {
        if !self.watched.insert(professional_id) {
            debug!("already watching {professional_id}");
            return;
        }
        let rx = engine.subscribe(professional_id);
        self.tasks
            .spawn(forward_events(professional_id, rx, events.clone()));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.watched.len()
    }
}

pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> Result<(), WireError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(EVENT_BUFFER);
    let mut watchers = Watchers::default();

    loop {
        let response = tokio::select! {
            line = framed.next() => {
                let line = match line {
                    None => return Ok(()),
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        framed.send(serde_json::to_string(&Response::from(WireError::LineTooLong))?).await?;
                        continue;
                    }
                    Some(Err(e)) => return Err(e.into()),
                };
                if line.trim().is_empty() {
                    continue;
                }
                handle_line(&engine, &line, &mut watchers, &event_tx).await
            }
            Some(event) = event_rx.recv() => Response::Event { event },
        };
        framed.send(serde_json::to_string(&response)?).await?;
    }
}

async fn handle_line(
    engine: &Arc<Engine>,
    line: &str,
    watchers: &mut Watchers,
    events: &mpsc::Sender<Event>,
) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("unparseable request: {e}");
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => "unknown", "status" => "error")
                .increment(1);
            return WireError::from(e).into();
        }
    };

    let label = observability::request_label(&request);
    let watch = match &request {
        Request::Watch { professional_id } => Some(*professional_id),
        _ => None,
    };
    let started = Instant::now();
    let result = execute(engine, request).await;
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => label)
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(result) => {
            if let Some(professional_id) = watch {
                watchers.watch(engine, professional_id, events);
            }
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => label, "status" => "ok")
                .increment(1);
            Response::Ok { result }
        }
        Err(e) => {
            debug!("{label} failed: {e}");
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => label, "status" => "error")
                .increment(1);
            e.into()
        }
    }
}
