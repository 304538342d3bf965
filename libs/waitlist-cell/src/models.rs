use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use shared_models::{NotificationMessage, ProcedureType};
use shared_utils::TimeRange;

use crate::lifecycle;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

// ==============================================================================
// STATUS AND PREFERENCES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaitlistStatus {
    #[serde(rename = "AGUARDANDO")]
    Waiting,
    #[serde(rename = "NOTIFICADO")]
    Notified,
    #[serde(rename = "CONVERTIDO")]
    Converted,
    #[serde(rename = "CANCELADO")]
    Cancelled,
    #[serde(rename = "EXPIRADO")]
    Expired,
}

impl WaitlistStatus {
    pub const ALL: [WaitlistStatus; 5] = [
        WaitlistStatus::Waiting,
        WaitlistStatus::Notified,
        WaitlistStatus::Converted,
        WaitlistStatus::Cancelled,
        WaitlistStatus::Expired,
    ];
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitlistStatus::Waiting => write!(f, "AGUARDANDO"),
            WaitlistStatus::Notified => write!(f, "NOTIFICADO"),
            WaitlistStatus::Converted => write!(f, "CONVERTIDO"),
            WaitlistStatus::Cancelled => write!(f, "CANCELADO"),
            WaitlistStatus::Expired => write!(f, "EXPIRADO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodOfDay {
    #[serde(rename = "MANHA")]
    Morning,
    #[serde(rename = "TARDE")]
    Afternoon,
    #[serde(rename = "NOITE")]
    Evening,
}

impl PeriodOfDay {
    pub fn contains(&self, time: NaiveTime) -> bool {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        let six_am = NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN);
        let six_pm = NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN);
        match self {
            PeriodOfDay::Morning => time >= six_am && time < noon,
            PeriodOfDay::Afternoon => time >= noon && time < six_pm,
            PeriodOfDay::Evening => time >= six_pm,
        }
    }
}

// ==============================================================================
// SLOT OFFERS AND FILTERS
// ==============================================================================

/// A freed (or otherwise available) slot, used as the matching key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOffer {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    pub procedure_type: ProcedureType,
    pub window: Option<TimeRange>,
}

impl SlotOffer {
    pub fn new(practitioner_id: Uuid, date: NaiveDate, procedure_type: ProcedureType) -> Self {
        Self {
            practitioner_id,
            date,
            procedure_type,
            window: None,
        }
    }

    pub fn with_window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.window = Some(TimeRange::new(start, end));
        self
    }

    pub fn filter(&self) -> WaitlistFilter {
        WaitlistFilter {
            practitioner_id: Some(self.practitioner_id),
            date: Some(self.date),
            procedure_type: Some(self.procedure_type),
        }
    }

    pub fn to_message(&self, entry_id: Uuid) -> NotificationMessage {
        NotificationMessage::SlotAvailable {
            entry_id,
            practitioner_id: self.practitioner_id,
            date: self.date,
            start_time: self.window.map(|w| w.start),
            end_time: self.window.map(|w| w.end),
            procedure_type: self.procedure_type,
        }
    }
}

/// Scope of an active-entry query. `None` leaves that dimension unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitlistFilter {
    pub practitioner_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub procedure_type: Option<ProcedureType>,
}

impl WaitlistFilter {
    pub fn for_practitioner(practitioner_id: Uuid) -> Self {
        Self {
            practitioner_id: Some(practitioner_id),
            ..Self::default()
        }
    }

    pub fn admits(&self, entry: &WaitlistEntry) -> bool {
        let practitioner_ok = match self.practitioner_id {
            Some(wanted) => {
                entry.accepts_any_practitioner
                    || entry.practitioner_id.map_or(true, |own| own == wanted)
            }
            None => true,
        };
        let date_ok = match self.date {
            Some(day) => entry.preferred_date.map_or(true, |preferred| preferred == day),
            None => true,
        };
        let procedure_ok = self
            .procedure_type
            .map_or(true, |wanted| wanted == entry.procedure_type);

        practitioner_ok && date_ok && procedure_ok
    }
}

// ==============================================================================
// WAITLIST ENTRY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// `None` means any practitioner.
    pub practitioner_id: Option<Uuid>,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_start_time: Option<NaiveTime>,
    pub preferred_end_time: Option<NaiveTime>,
    pub preferred_period: Option<PeriodOfDay>,
    pub procedure_type: ProcedureType,
    pub priority: u8,
    pub accepts_any_time: bool,
    pub accepts_any_practitioner: bool,
    pub notes: Option<String>,
    pub status: WaitlistStatus,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub contact_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set once failed contact attempts reach the policy cap. Automatic
    /// promotion and retry sweeps skip exhausted entries.
    pub notifications_exhausted: bool,
    /// Offer whose delivery failed and is waiting for a retry.
    pub pending_offer: Option<SlotOffer>,
    pub appointment_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
}

impl WaitlistEntry {
    pub fn is_active(&self) -> bool {
        lifecycle::is_active(self.status)
    }

    pub fn preferred_window(&self) -> Option<TimeRange> {
        match (self.preferred_start_time, self.preferred_end_time) {
            (Some(start), Some(end)) => Some(TimeRange::new(start, end)),
            _ => None,
        }
    }

    /// Whether the entry's time preferences admit a slot. An unknown slot
    /// window is always admitted.
    pub fn accepts_window(&self, window: Option<TimeRange>) -> bool {
        let Some(slot) = window else {
            return true;
        };
        if self.accepts_any_time {
            return true;
        }
        if let Some(preferred) = self.preferred_window() {
            if !preferred.contains(&slot) {
                return false;
            }
        }
        if let Some(period) = self.preferred_period {
            if !period.contains(slot.start) {
                return false;
            }
        }
        true
    }

    pub fn is_compatible_with(&self, offer: &SlotOffer) -> bool {
        self.is_active() && offer.filter().admits(self) && self.accepts_window(offer.window)
    }
}

/// Canonical queue order: higher priority first, then first come first
/// served. The id breaks ties between entries created in the same instant.
pub fn queue_order(a: &WaitlistEntry, b: &WaitlistEntry) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

// ==============================================================================
// REQUESTS AND OUTCOMES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub patient_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_start_time: Option<NaiveTime>,
    pub preferred_end_time: Option<NaiveTime>,
    pub preferred_period: Option<PeriodOfDay>,
    pub procedure_type: ProcedureType,
    /// Defaults to the policy's mid-range priority.
    pub priority: Option<u8>,
    pub accepts_any_time: bool,
    pub accepts_any_practitioner: bool,
    pub notes: Option<String>,
}

impl EnqueueRequest {
    pub fn new(patient_id: Uuid, procedure_type: ProcedureType) -> Self {
        Self {
            patient_id,
            practitioner_id: None,
            preferred_date: None,
            preferred_start_time: None,
            preferred_end_time: None,
            preferred_period: None,
            procedure_type,
            priority: None,
            accepts_any_time: false,
            accepts_any_practitioner: false,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Notified {
        entry_id: Uuid,
    },
    DispatchFailed {
        entry_id: Uuid,
        attempts: u32,
        exhausted: bool,
    },
    /// The entry left the Waiting state while the dispatch was in flight.
    Superseded {
        entry_id: Uuid,
        status: WaitlistStatus,
    },
}

impl NotifyOutcome {
    pub fn entry_id(&self) -> Uuid {
        match self {
            NotifyOutcome::Notified { entry_id }
            | NotifyOutcome::DispatchFailed { entry_id, .. }
            | NotifyOutcome::Superseded { entry_id, .. } => *entry_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
    NoCandidate,
    /// The head of the queue was already notified and has not booked yet.
    HeadAwaitingResponse { entry_id: Uuid },
    Attempted(NotifyOutcome),
}

impl PromotionOutcome {
    pub fn notified_entry(&self) -> Option<Uuid> {
        match self {
            PromotionOutcome::Attempted(NotifyOutcome::Notified { entry_id }) => Some(*entry_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired: Vec<Uuid>,
    pub retried: Vec<NotifyOutcome>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.retried.is_empty()
    }
}
