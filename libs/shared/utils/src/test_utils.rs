use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use shared_models::{
    Clock, HistoryAction, HistoryEvent, HistoryRecorder, NotificationDispatcher,
    NotificationMessage, PatientDirectory, PractitionerDirectory,
};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid test time")
}

/// Deterministic UUID for readable fixtures (`test_id(1)`, `test_id(10)`, ...).
pub fn test_id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

// ==============================================================================
// DIRECTORIES
// ==============================================================================

#[derive(Default)]
pub struct InMemoryPractitionerDirectory {
    practitioners: DashMap<Uuid, bool>,
}

impl InMemoryPractitionerDirectory {
    pub fn with_active(ids: &[Uuid]) -> Self {
        let directory = Self::default();
        for id in ids {
            directory.add(*id, true);
        }
        directory
    }

    pub fn add(&self, practitioner_id: Uuid, active: bool) {
        self.practitioners.insert(practitioner_id, active);
    }

    pub fn set_active(&self, practitioner_id: Uuid, active: bool) {
        if let Some(mut entry) = self.practitioners.get_mut(&practitioner_id) {
            *entry = active;
        }
    }
}

#[async_trait]
impl PractitionerDirectory for InMemoryPractitionerDirectory {
    async fn exists(&self, practitioner_id: Uuid) -> Result<bool> {
        Ok(self.practitioners.contains_key(&practitioner_id))
    }

    async fn is_active(&self, practitioner_id: Uuid) -> Result<bool> {
        Ok(self
            .practitioners
            .get(&practitioner_id)
            .map(|active| *active)
            .unwrap_or(false))
    }
}

#[derive(Default)]
pub struct InMemoryPatientDirectory {
    patients: DashMap<Uuid, ()>,
}

impl InMemoryPatientDirectory {
    pub fn with_patients(ids: &[Uuid]) -> Self {
        let directory = Self::default();
        for id in ids {
            directory.add(*id);
        }
        directory
    }

    pub fn add(&self, patient_id: Uuid) {
        self.patients.insert(patient_id, ());
    }
}

#[async_trait]
impl PatientDirectory for InMemoryPatientDirectory {
    async fn exists(&self, patient_id: Uuid) -> Result<bool> {
        Ok(self.patients.contains_key(&patient_id))
    }
}

// ==============================================================================
// NOTIFICATIONS AND HISTORY
// ==============================================================================

/// Records every delivered message; can be switched to fail every send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, NotificationMessage)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Uuid, NotificationMessage)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, patient_id: Uuid) -> usize {
        self.sent()
            .iter()
            .filter(|(recipient, _)| *recipient == patient_id)
            .count()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn send(&self, patient_id: Uuid, message: NotificationMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("notification channel unavailable"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("notifier poisoned"))?
            .push((patient_id, message));
        Ok(())
    }
}

/// Records every event; can be told to reject one kind of action.
#[derive(Default)]
pub struct RecordingHistory {
    events: Mutex<Vec<HistoryEvent>>,
    failing_on: Mutex<Option<HistoryAction>>,
}

impl RecordingHistory {
    pub fn set_failing_on(&self, action: Option<HistoryAction>) {
        if let Ok(mut failing_on) = self.failing_on.lock() {
            *failing_on = action;
        }
    }

    pub fn events(&self) -> Vec<HistoryEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn actions_for(&self, appointment_id: Uuid) -> Vec<HistoryAction> {
        self.events()
            .into_iter()
            .filter(|event| event.appointment_id == appointment_id)
            .map(|event| event.action)
            .collect()
    }
}

#[async_trait]
impl HistoryRecorder for RecordingHistory {
    async fn record(&self, event: HistoryEvent) -> Result<()> {
        let failing_on = *self
            .failing_on
            .lock()
            .map_err(|_| anyhow!("history poisoned"))?;
        if failing_on == Some(event.action) {
            return Err(anyhow!("history store rejected {} event", event.action));
        }
        self.events
            .lock()
            .map_err(|_| anyhow!("history poisoned"))?
            .push(event);
        Ok(())
    }
}

// ==============================================================================
// CLOCK
// ==============================================================================

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            now: Mutex::new(date.and_time(time).and_utc()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, date: NaiveDate, time: NaiveTime) {
        if let Ok(mut now) = self.now.lock() {
            *now = date.and_time(time).and_utc();
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
