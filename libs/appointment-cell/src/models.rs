// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::{AppointmentStatus, ErrorKind, ProcedureType};
use shared_utils::TimeRange;
use waitlist_cell::{SlotOffer, WaitlistError};

use crate::services::lifecycle::AppointmentLifecycleService;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub procedure_type: ProcedureType,
    pub notes: Option<String>,
    /// Monetary value in cents.
    pub value_cents: Option<i64>,
    /// Present only while the status is Cancelled.
    pub cancellation: Option<CancellationInfo>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    /// Soft-delete marker. Inactive appointments never take part in conflict
    /// or availability computations.
    pub active: bool,
}

impl Appointment {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn duration_minutes(&self) -> i64 {
        self.time_range().duration_minutes()
    }

    /// Whether the appointment still blocks its interval on both schedules.
    pub fn occupies_slot(&self) -> bool {
        self.active && AppointmentLifecycleService::occupies_slot(self.status)
    }

    /// The slot this appointment frees when it is cancelled, used to search
    /// the waitlist.
    pub fn slot_offer(&self) -> SlotOffer {
        SlotOffer::new(self.practitioner_id, self.date, self.procedure_type)
            .with_window(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationInfo {
    pub reason: Option<String>,
    pub cancelled_by: Uuid,
    pub cancelled_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub procedure_type: ProcedureType,
    pub notes: Option<String>,
    pub value_cents: Option<i64>,
}

impl CreateAppointmentRequest {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Partial update. `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub practitioner_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub procedure_type: Option<ProcedureType>,
    pub notes: Option<String>,
    pub value_cents: Option<i64>,
}

impl UpdateAppointmentRequest {
    pub fn reschedule(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date: Some(date),
            start_time: Some(start_time),
            end_time: Some(end_time),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub target: AppointmentStatus,
    /// Recorded on cancellation; ignored otherwise.
    pub reason: Option<String>,
}

impl StatusChangeRequest {
    pub fn to(target: AppointmentStatus) -> Self {
        Self {
            target,
            reason: None,
        }
    }
}

/// Which schedule a conflicting appointment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictScope {
    Practitioner,
    Patient,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("End time {end} must be after start time {start}")]
    InvalidTimeRange { start: NaiveTime, end: NaiveTime },

    #[error("Duration of {minutes} minutes is outside the allowed {min}-{max} minutes")]
    DurationOutOfBounds { minutes: i64, min: i64, max: i64 },

    #[error("Appointment date {date} is in the past (today is {today})")]
    DateInPast { date: NaiveDate, today: NaiveDate },

    #[error("Slot {requested} is outside business hours {business_hours}")]
    OutsideBusinessHours {
        requested: TimeRange,
        business_hours: TimeRange,
    },

    #[error("Practitioner {practitioner_id} already has {capacity} appointments on {date}")]
    DailyCapacityExceeded {
        practitioner_id: Uuid,
        date: NaiveDate,
        capacity: usize,
    },

    #[error("Practitioner is already booked by appointment {appointment_id} at {range}")]
    PractitionerConflict { appointment_id: Uuid, range: TimeRange },

    #[error("Patient is already booked by appointment {appointment_id} at {range}")]
    PatientConflict { appointment_id: Uuid, range: TimeRange },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment cannot be modified in status {0}")]
    NotEditable(AppointmentStatus),

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Practitioner not found: {0}")]
    PractitionerNotFound(Uuid),

    #[error("Practitioner is inactive: {0}")]
    PractitionerInactive(Uuid),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Waitlist error: {0}")]
    Waitlist(#[from] WaitlistError),

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl AppointmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppointmentError::InvalidTimeRange { .. }
            | AppointmentError::DurationOutOfBounds { .. }
            | AppointmentError::DateInPast { .. } => ErrorKind::Validation,
            AppointmentError::OutsideBusinessHours { .. }
            | AppointmentError::DailyCapacityExceeded { .. }
            | AppointmentError::PractitionerConflict { .. }
            | AppointmentError::PatientConflict { .. }
            | AppointmentError::InvalidTransition { .. }
            | AppointmentError::NotEditable(_) => ErrorKind::RuleViolation,
            AppointmentError::NotFound(_)
            | AppointmentError::PractitionerNotFound(_)
            | AppointmentError::PractitionerInactive(_)
            | AppointmentError::PatientNotFound(_) => ErrorKind::NotFound,
            AppointmentError::Waitlist(inner) => inner.kind(),
            AppointmentError::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }

    /// The appointment a conflict error points at, with the schedule it
    /// was found in.
    pub fn conflicting_appointment(&self) -> Option<(ConflictScope, Uuid)> {
        match self {
            AppointmentError::PractitionerConflict { appointment_id, .. } => {
                Some((ConflictScope::Practitioner, *appointment_id))
            }
            AppointmentError::PatientConflict { appointment_id, .. } => {
                Some((ConflictScope::Patient, *appointment_id))
            }
            _ => None,
        }
    }
}
