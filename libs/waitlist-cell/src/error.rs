use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_models::ErrorKind;

use crate::models::WaitlistStatus;

#[derive(Error, Debug)]
pub enum WaitlistError {
    #[error("Priority {0} is outside the allowed range 1..=10")]
    PriorityOutOfRange(u8),

    #[error("Invalid preferred time window: {0}")]
    InvalidPreferredWindow(String),

    #[error("Preferred date {date} is in the past (today is {today})")]
    PreferredDateInPast { date: NaiveDate, today: NaiveDate },

    #[error("Waitlist entry {entry_id} belongs to patient {owner}, not {patient_id}")]
    PatientMismatch {
        entry_id: Uuid,
        owner: Uuid,
        patient_id: Uuid,
    },

    #[error("Patient {patient_id} already waits for practitioner {practitioner_id:?}")]
    DuplicateActiveEntry {
        patient_id: Uuid,
        practitioner_id: Option<Uuid>,
    },

    #[error("Invalid waitlist transition from {from} to {to}")]
    InvalidTransition {
        from: WaitlistStatus,
        to: WaitlistStatus,
    },

    #[error("Waitlist entry {entry_id} is no longer active ({status})")]
    EntryNotActive {
        entry_id: Uuid,
        status: WaitlistStatus,
    },

    #[error("Waitlist entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Practitioner not found: {0}")]
    PractitionerNotFound(Uuid),

    #[error("Practitioner is inactive: {0}")]
    PractitionerInactive(Uuid),

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl WaitlistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WaitlistError::PriorityOutOfRange(_)
            | WaitlistError::InvalidPreferredWindow(_)
            | WaitlistError::PreferredDateInPast { .. }
            | WaitlistError::PatientMismatch { .. } => ErrorKind::Validation,
            WaitlistError::DuplicateActiveEntry { .. }
            | WaitlistError::InvalidTransition { .. }
            | WaitlistError::EntryNotActive { .. } => ErrorKind::RuleViolation,
            WaitlistError::EntryNotFound(_)
            | WaitlistError::PatientNotFound(_)
            | WaitlistError::PractitionerNotFound(_)
            | WaitlistError::PractitionerInactive(_) => ErrorKind::NotFound,
            WaitlistError::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }
}
