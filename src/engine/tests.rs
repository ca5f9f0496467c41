use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, Weekday};

use super::*;
use crate::limits::*;
use crate::model::*;
use crate::store::{DurableStore, InMemoryStore};

fn t(s: &str) -> TimeOfDay {
    s.parse().unwrap()
}

/// 2030-06-03 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

fn saturday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 8).unwrap()
}

/// Well before every date used below.
fn early() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotbook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn memory_engine() -> Engine {
    Engine::with_store(Arc::new(InMemoryStore::new()), Arc::new(NotifyHub::new()))
}

async fn engine_with_professional() -> (Engine, Ulid) {
    let engine = memory_engine();
    let pid = Ulid::new();
    engine.register_professional(pid, "Ana".into()).await.unwrap();
    (engine, pid)
}

fn service(minutes: Minutes) -> Service {
    Service {
        name: format!("{minutes}m service"),
        duration_minutes: minutes,
    }
}

fn request(pid: Ulid, date: NaiveDate, time: &str, minutes: Minutes) -> BookingRequest {
    BookingRequest {
        professional_id: pid,
        client_id: Ulid::new(),
        date,
        time: t(time),
        services: vec![service(minutes)],
    }
}

fn available_times(slots: &[Slot]) -> Vec<String> {
    slots
        .iter()
        .filter(|s| s.available)
        .map(|s| s.time.to_string())
        .collect()
}

fn slot_at(slots: &[Slot], time: &str) -> Slot {
    *slots.iter().find(|s| s.time == t(time)).unwrap()
}

// ── Slot generation through the engine ───────────────────────────

#[tokio::test]
async fn monday_hour_long_service() {
    let (engine, pid) = engine_with_professional().await;
    let slots = engine.generate_slots(pid, monday(), 60, early()).await.unwrap();

    assert_eq!(slots.len(), 17);
    assert_eq!(slots.first().unwrap().time, t("09:00"));
    assert_eq!(slots.last().unwrap().time, t("17:00"));
    assert!(slots.iter().all(|s| s.available));
    assert!(!slots.iter().any(|s| s.time == t("17:30")));
}

#[tokio::test]
async fn existing_appointment_blocks_overlapping_starts() {
    let (engine, pid) = engine_with_professional().await;
    engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();

    let slots = engine.generate_slots(pid, monday(), 60, early()).await.unwrap();
    for blocked in ["09:30", "10:00", "10:30"] {
        let slot = slot_at(&slots, blocked);
        assert!(!slot.available, "{blocked} should be blocked");
        assert_eq!(slot.reason, Some(UnavailableReason::Booked));
    }
    assert!(slot_at(&slots, "09:00").available);
    assert!(slot_at(&slots, "11:00").available);
}

#[tokio::test]
async fn generation_is_idempotent() {
    let (engine, pid) = engine_with_professional().await;
    engine
        .book_appointment(request(pid, monday(), "13:00", 45), early())
        .await
        .unwrap();
    let first = engine.generate_slots(pid, monday(), 30, early()).await.unwrap();
    let second = engine.generate_slots(pid, monday(), 30, early()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn zero_duration_rejected_before_lookup() {
    let engine = memory_engine();
    let err = engine
        .generate_slots(Ulid::new(), monday(), 0, early())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidDuration(0)));
}

#[tokio::test]
async fn unknown_professional_not_found() {
    let engine = memory_engine();
    let pid = Ulid::new();
    assert!(matches!(
        engine.is_date_available(pid, monday()).await,
        Err(EngineError::ProfessionalNotFound(id)) if id == pid
    ));
    assert!(matches!(
        engine.generate_slots(pid, monday(), 30, early()).await,
        Err(EngineError::ProfessionalNotFound(_))
    ));
    assert!(matches!(
        engine.book_appointment(request(pid, monday(), "10:00", 30), early()).await,
        Err(EngineError::ProfessionalNotFound(_))
    ));
}

#[tokio::test]
async fn closed_date_beats_custom_slots() {
    let (engine, pid) = engine_with_professional().await;
    let mut availability = engine.effective_availability(pid).await.unwrap();
    availability.closed_dates.insert(monday());
    availability
        .custom_slots
        .insert(monday(), vec![t("10:00"), t("11:00")]);
    engine
        .set_availability_override(pid, availability)
        .await
        .unwrap();

    assert!(!engine.is_date_available(pid, monday()).await.unwrap());
    for minutes in [15, 30, 60, 240] {
        assert!(engine
            .generate_slots(pid, monday(), minutes, early())
            .await
            .unwrap()
            .is_empty());
    }
    let err = engine
        .book_appointment(request(pid, monday(), "10:00", 30), early())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { reason: None, .. }));
}

#[tokio::test]
async fn custom_slots_may_sit_outside_working_hours() {
    let (engine, pid) = engine_with_professional().await;
    let mut availability = engine.effective_availability(pid).await.unwrap();
    availability
        .custom_slots
        .insert(monday(), vec![t("19:00"), t("08:00")]);
    engine
        .set_availability_override(pid, availability)
        .await
        .unwrap();

    let slots = engine.generate_slots(pid, monday(), 30, early()).await.unwrap();
    assert_eq!(available_times(&slots), vec!["08:00", "19:00"]);

    let booked = engine
        .book_appointment(request(pid, monday(), "19:00", 30), early())
        .await
        .unwrap();
    assert_eq!(booked.start, t("19:00"));
}

#[tokio::test]
async fn slot_interval_from_override() {
    let (engine, pid) = engine_with_professional().await;
    let mut availability = engine.effective_availability(pid).await.unwrap();
    availability.slot_interval_minutes = 60;
    engine
        .set_availability_override(pid, availability)
        .await
        .unwrap();

    let slots = engine.generate_slots(pid, monday(), 60, early()).await.unwrap();
    assert_eq!(slots.len(), 9);
    assert!(slots.iter().all(|s| s.time.minute() == 0));
}

#[tokio::test]
async fn override_can_open_a_template_day_off() {
    let (engine, pid) = engine_with_professional().await;
    assert!(!engine.is_date_available(pid, saturday()).await.unwrap());

    let mut availability = engine.effective_availability(pid).await.unwrap();
    availability.working_days[weekday_index(Weekday::Sat)] = true;
    availability.default_window = TimeRange::new(t("10:00"), t("14:00"));
    engine
        .set_availability_override(pid, availability)
        .await
        .unwrap();

    assert!(engine.is_date_available(pid, saturday()).await.unwrap());
    let slots = engine.generate_slots(pid, saturday(), 60, early()).await.unwrap();
    assert_eq!(
        available_times(&slots),
        vec!["10:00", "10:30", "11:00", "11:30", "12:00", "12:30", "13:00"]
    );
}

#[tokio::test]
async fn stored_override_is_none_until_set() {
    let (engine, pid) = engine_with_professional().await;
    assert_eq!(engine.availability_override(pid).await.unwrap(), None);
    let derived = engine.effective_availability(pid).await.unwrap();
    assert_eq!(
        derived,
        AvailabilityOverride::derived_from(&WeeklySchedule::default())
    );

    engine
        .set_availability_override(pid, derived.clone())
        .await
        .unwrap();
    assert_eq!(engine.availability_override(pid).await.unwrap(), Some(derived));
}

#[tokio::test]
async fn effective_availability_storable_with_disabled_reversed_monday() {
    let (engine, pid) = engine_with_professional().await;
    let mut schedule = WeeklySchedule::default();
    *schedule.day_mut(Weekday::Mon) = DaySchedule {
        enabled: false,
        start: t("17:00"),
        end: t("08:00"),
        breaks: Vec::new(),
    };
    engine.set_weekly_schedule(pid, schedule).await.unwrap();

    let derived = engine.effective_availability(pid).await.unwrap();
    assert!(derived.default_window.is_valid());
    assert!(!derived.working_days[0]);
    engine.set_availability_override(pid, derived).await.unwrap();
}

#[tokio::test]
async fn today_past_starts_marked_past() {
    let (engine, pid) = engine_with_professional().await;
    let now = monday().and_hms_opt(12, 10, 0).unwrap();
    let slots = engine.generate_slots(pid, monday(), 30, now).await.unwrap();

    assert_eq!(slot_at(&slots, "12:00").reason, Some(UnavailableReason::Past));
    assert!(slot_at(&slots, "12:30").available);

    let err = engine
        .book_appointment(request(pid, monday(), "11:00", 30), now)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::SlotUnavailable {
            reason: Some(UnavailableReason::Past),
            ..
        }
    ));
}

#[tokio::test]
async fn breaks_block_slots_as_closed() {
    let (engine, pid) = engine_with_professional().await;
    let mut schedule = engine.weekly_schedule(pid).await.unwrap();
    schedule.day_mut(Weekday::Mon).breaks = vec![TimeRange::new(t("12:00"), t("13:00"))];
    engine.set_weekly_schedule(pid, schedule).await.unwrap();

    let slots = engine.generate_slots(pid, monday(), 60, early()).await.unwrap();
    for closed in ["11:30", "12:00", "12:30"] {
        assert_eq!(slot_at(&slots, closed).reason, Some(UnavailableReason::Closed));
    }
    assert!(slot_at(&slots, "11:00").available);
    assert!(slot_at(&slots, "13:00").available);

    let err = engine
        .book_appointment(request(pid, monday(), "12:00", 60), early())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::SlotUnavailable {
            reason: Some(UnavailableReason::Closed),
            ..
        }
    ));
}

// ── Booking ──────────────────────────────────────────────────────

#[tokio::test]
async fn booking_records_scheduled_appointment() {
    let (engine, pid) = engine_with_professional().await;
    let mut req = request(pid, monday(), "16:30", 30);
    req.services.push(service(45));
    let client = req.client_id;

    let appointment = engine.book_appointment(req, early()).await.unwrap();
    assert_eq!(appointment.professional_id, pid);
    assert_eq!(appointment.client_id, client);
    assert_eq!(appointment.duration_minutes, 75);
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.created_at, early());
    assert_eq!(appointment.services.len(), 2);

    assert_eq!(engine.get_appointment(appointment.id).await.unwrap(), appointment);
    assert_eq!(
        engine.list_appointments(pid, monday()).await.unwrap(),
        vec![appointment]
    );
}

#[tokio::test]
async fn time_not_offered_is_unavailable() {
    let (engine, pid) = engine_with_professional().await;
    // Off the 30-minute grid.
    let err = engine
        .book_appointment(request(pid, monday(), "10:15", 30), early())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { reason: None, .. }));

    // Would end after closing.
    let err = engine
        .book_appointment(request(pid, monday(), "17:30", 60), early())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { reason: None, .. }));

    // Template day off.
    let err = engine
        .book_appointment(request(pid, saturday(), "10:00", 30), early())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { reason: None, .. }));

    assert!(engine.list_appointments(pid, monday()).await.unwrap().is_empty());
}

#[tokio::test]
async fn booking_without_services_rejected() {
    let (engine, pid) = engine_with_professional().await;
    let mut req = request(pid, monday(), "10:00", 30);
    req.services.clear();
    assert!(matches!(
        engine.book_appointment(req, early()).await,
        Err(EngineError::InvalidDuration(0))
    ));
}

#[tokio::test]
async fn sequential_bookings_never_overlap() {
    let (engine, pid) = engine_with_professional().await;
    let attempts = [
        ("09:00", 90),
        ("09:30", 30),
        ("10:30", 60),
        ("11:00", 30),
        ("11:30", 120),
        ("12:00", 30),
        ("13:30", 30),
        ("17:00", 60),
    ];
    for (time, minutes) in attempts {
        let _ = engine
            .book_appointment(request(pid, monday(), time, minutes), early())
            .await;
    }

    let booked = engine.list_appointments(pid, monday()).await.unwrap();
    assert_eq!(booked.len(), 5);
    for (i, a) in booked.iter().enumerate() {
        for b in &booked[i + 1..] {
            assert!(!a.span().overlaps(&b.span()), "{a:?} overlaps {b:?}");
        }
    }
}

#[tokio::test]
async fn back_to_back_bookings_allowed() {
    let (engine, pid) = engine_with_professional().await;
    engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();
    engine
        .book_appointment(request(pid, monday(), "11:00", 60), early())
        .await
        .unwrap();
    engine
        .book_appointment(request(pid, monday(), "09:00", 60), early())
        .await
        .unwrap();
    assert_eq!(engine.list_appointments(pid, monday()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn concurrent_bookings_for_one_slot_admit_exactly_one() {
    let (engine, pid) = engine_with_professional().await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        // Alternate between two overlapping starts.
        let time = if i % 2 == 0 { "10:00" } else { "10:30" };
        handles.push(tokio::spawn(async move {
            engine
                .book_appointment(request(pid, monday(), time, 60), early())
                .await
        }));
    }

    let mut booked = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => booked += 1,
            Err(EngineError::SlotUnavailable { reason, .. }) => {
                assert_eq!(reason, Some(UnavailableReason::Booked));
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(engine.list_appointments(pid, monday()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_bookings_on_different_days_all_succeed() {
    let (engine, pid) = engine_with_professional().await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for offset in 0..5u64 {
        let engine = engine.clone();
        let date = monday() + chrono::Days::new(offset);
        handles.push(tokio::spawn(async move {
            engine
                .book_appointment(request(pid, date, "10:00", 60), early())
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn fine_grid_fills_a_whole_day() {
    let (engine, pid) = engine_with_professional().await;
    let mut availability = engine.effective_availability(pid).await.unwrap();
    availability.slot_interval_minutes = MIN_SLOT_INTERVAL_MINUTES;
    engine
        .set_availability_override(pid, availability)
        .await
        .unwrap();

    // 09:00-18:00 on a 5-minute grid holds 108 five-minute bookings.
    let slots = engine.generate_slots(pid, monday(), 5, early()).await.unwrap();
    assert_eq!(slots.len(), 108);
    for slot in &slots {
        engine
            .book_appointment(request(pid, monday(), &slot.time.to_string(), 5), early())
            .await
            .unwrap();
    }
    let slots = engine.generate_slots(pid, monday(), 5, early()).await.unwrap();
    assert!(available_times(&slots).is_empty());
}

// ── Status transitions ───────────────────────────────────────────

#[tokio::test]
async fn cancellation_frees_the_slot() {
    let (engine, pid) = engine_with_professional().await;
    let appointment = engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();

    let cancelled = engine.cancel_appointment(appointment.id).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    let slots = engine.generate_slots(pid, monday(), 60, early()).await.unwrap();
    assert!(slot_at(&slots, "10:00").available);
    assert!(engine.list_appointments(pid, monday()).await.unwrap().is_empty());

    // Retained for history.
    assert_eq!(
        engine.get_appointment(appointment.id).await.unwrap().status,
        AppointmentStatus::Cancelled
    );

    engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();
}

#[tokio::test]
async fn confirm_then_complete() {
    let (engine, pid) = engine_with_professional().await;
    let appointment = engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();

    let err = engine.complete_appointment(appointment.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: AppointmentStatus::Scheduled,
            to: AppointmentStatus::Completed
        }
    ));

    engine.confirm_appointment(appointment.id).await.unwrap();
    let done = engine.complete_appointment(appointment.id).await.unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);

    // Completed appointments keep occupying their time.
    let slots = engine.generate_slots(pid, monday(), 60, early()).await.unwrap();
    assert_eq!(slot_at(&slots, "10:00").reason, Some(UnavailableReason::Booked));

    assert!(matches!(
        engine.cancel_appointment(appointment.id).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn cancel_twice_rejected() {
    let (engine, pid) = engine_with_professional().await;
    let appointment = engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();
    engine.cancel_appointment(appointment.id).await.unwrap();
    assert!(matches!(
        engine.cancel_appointment(appointment.id).await,
        Err(EngineError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn unknown_appointment_not_found() {
    let engine = memory_engine();
    let id = Ulid::new();
    assert!(matches!(
        engine.confirm_appointment(id).await,
        Err(EngineError::AppointmentNotFound(found)) if found == id
    ));
}

// ── Schedule and override mutation ───────────────────────────────

#[tokio::test]
async fn duplicate_registration_rejected() {
    let (engine, pid) = engine_with_professional().await;
    assert!(matches!(
        engine.register_professional(pid, "Again".into()).await,
        Err(EngineError::AlreadyExists(_))
    ));
    assert_eq!(engine.list_professionals().await.len(), 1);
}

#[tokio::test]
async fn long_name_rejected() {
    let engine = memory_engine();
    let name = "x".repeat(MAX_NAME_LEN + 1);
    assert!(matches!(
        engine.register_professional(Ulid::new(), name).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn invalid_schedule_rejected_and_not_stored() {
    let (engine, pid) = engine_with_professional().await;
    let mut schedule = WeeklySchedule::default();
    schedule.day_mut(Weekday::Mon).end = t("09:00");
    assert!(matches!(
        engine.set_weekly_schedule(pid, schedule).await,
        Err(EngineError::ScheduleInvariantViolation(_))
    ));
    assert_eq!(
        engine.weekly_schedule(pid).await.unwrap(),
        WeeklySchedule::default()
    );
}

#[tokio::test]
async fn invalid_override_rejected() {
    let (engine, pid) = engine_with_professional().await;
    let mut availability = engine.effective_availability(pid).await.unwrap();
    availability.slot_interval_minutes = 0;
    assert!(matches!(
        engine.set_availability_override(pid, availability).await,
        Err(EngineError::ScheduleInvariantViolation(_))
    ));
    assert_eq!(engine.availability_override(pid).await.unwrap(), None);
}

#[tokio::test]
async fn schedule_replacement_is_not_a_merge() {
    let (engine, pid) = engine_with_professional().await;
    let mut schedule = WeeklySchedule::default();
    *schedule.day_mut(Weekday::Mon) = DaySchedule::open(t("14:00"), t("16:00"));
    engine.set_weekly_schedule(pid, schedule.clone()).await.unwrap();
    assert_eq!(engine.weekly_schedule(pid).await.unwrap(), schedule);

    let slots = engine.generate_slots(pid, monday(), 60, early()).await.unwrap();
    assert_eq!(available_times(&slots), vec!["14:00", "14:30", "15:00"]);
}

#[tokio::test]
async fn schedule_mutation_for_unknown_professional() {
    let engine = memory_engine();
    assert!(matches!(
        engine
            .set_weekly_schedule(Ulid::new(), WeeklySchedule::default())
            .await,
        Err(EngineError::ProfessionalNotFound(_))
    ));
}

// ── Date scan ────────────────────────────────────────────────────

#[tokio::test]
async fn available_dates_skip_days_off_and_closures() {
    let (engine, pid) = engine_with_professional().await;
    let dates = engine.available_dates(pid, monday(), 7).await.unwrap();
    assert_eq!(dates.len(), 5);
    assert_eq!(dates[0], monday());
    assert!(!dates.contains(&saturday()));

    let wednesday = NaiveDate::from_ymd_opt(2030, 6, 5).unwrap();
    let mut availability = engine.effective_availability(pid).await.unwrap();
    availability.closed_dates.insert(wednesday);
    engine
        .set_availability_override(pid, availability)
        .await
        .unwrap();

    let dates = engine.available_dates(pid, monday(), 7).await.unwrap();
    assert_eq!(dates.len(), 4);
    assert!(!dates.contains(&wednesday));

    assert!(engine.available_dates(pid, monday(), 0).await.unwrap().is_empty());
    assert!(matches!(
        engine
            .available_dates(pid, monday(), MAX_DATE_SCAN_DAYS + 1)
            .await,
        Err(EngineError::LimitExceeded(_))
    ));
}

// ── Notifications ────────────────────────────────────────────────

#[tokio::test]
async fn committed_changes_are_broadcast() {
    let (engine, pid) = engine_with_professional().await;
    let mut rx = engine.subscribe(pid);

    let appointment = engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();
    assert_eq!(
        rx.recv().await.unwrap(),
        Event::AppointmentBooked {
            appointment: appointment.clone()
        }
    );

    engine.cancel_appointment(appointment.id).await.unwrap();
    assert_eq!(
        rx.recv().await.unwrap(),
        Event::AppointmentStatusChanged {
            id: appointment.id,
            professional_id: pid,
            date: monday(),
            status: AppointmentStatus::Cancelled,
        }
    );

    // Rejected bookings publish nothing.
    let _ = engine
        .book_appointment(request(pid, monday(), "10:15", 60), early())
        .await;
    assert!(rx.try_recv().is_err());
}

// ── Durability ───────────────────────────────────────────────────

#[tokio::test]
async fn bookings_survive_restart() {
    let path = test_wal_path("restart.wal");
    let pid = Ulid::new();
    let kept;
    {
        let store = Arc::new(DurableStore::open(&path).unwrap());
        let engine = Engine::with_store(store, Arc::new(NotifyHub::new()));
        engine.register_professional(pid, "Ana".into()).await.unwrap();
        let mut availability = engine.effective_availability(pid).await.unwrap();
        availability.closed_dates.insert(saturday());
        engine
            .set_availability_override(pid, availability)
            .await
            .unwrap();
        kept = engine
            .book_appointment(request(pid, monday(), "10:00", 60), early())
            .await
            .unwrap();
        let dropped = engine
            .book_appointment(request(pid, monday(), "14:00", 30), early())
            .await
            .unwrap();
        engine.cancel_appointment(dropped.id).await.unwrap();
    }

    let store = Arc::new(DurableStore::open(&path).unwrap());
    let engine = Engine::with_store(store, Arc::new(NotifyHub::new()));
    assert_eq!(
        engine.list_appointments(pid, monday()).await.unwrap(),
        vec![kept]
    );
    assert!(engine
        .availability_override(pid)
        .await
        .unwrap()
        .unwrap()
        .is_closed(saturday()));

    let err = engine
        .book_appointment(request(pid, monday(), "10:30", 30), early())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::SlotUnavailable {
            reason: Some(UnavailableReason::Booked),
            ..
        }
    ));
    engine
        .book_appointment(request(pid, monday(), "14:00", 30), early())
        .await
        .unwrap();
}

#[tokio::test]
async fn durable_concurrent_bookings_admit_exactly_one() {
    let path = test_wal_path("durable_race.wal");
    let store = Arc::new(DurableStore::open(&path).unwrap());
    let engine = Arc::new(Engine::with_store(store, Arc::new(NotifyHub::new())));
    let pid = Ulid::new();
    engine.register_professional(pid, "Ana".into()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .book_appointment(request(pid, monday(), "15:00", 30), early())
                .await
        }));
    }
    let mut booked = 0;
    for h in handles {
        if h.await.unwrap().is_ok() {
            booked += 1;
        }
    }
    assert_eq!(booked, 1);

    // Only the winner reached the log.
    let events = crate::wal::Wal::replay(&path).unwrap();
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn past_day_locks_pruned() {
    let (engine, pid) = engine_with_professional().await;
    engine
        .book_appointment(request(pid, monday(), "10:00", 60), early())
        .await
        .unwrap();
    engine
        .book_appointment(request(pid, saturday(), "10:00", 60), early())
        .await
        .unwrap_err();
    assert_eq!(engine.day_lock_count(), 2);

    let friday = NaiveDate::from_ymd_opt(2030, 6, 7).unwrap();
    assert_eq!(engine.prune_day_locks(friday), 1);
    assert_eq!(engine.day_lock_count(), 1);
}
