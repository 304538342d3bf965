// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::AppointmentStatus;

use crate::models::AppointmentError;

/// The appointment state machine: an explicit transition table plus the
/// editability rules derived from it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(
        &self,
        current_status: AppointmentStatus,
    ) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    /// Date, time and procedure may only change before the visit starts.
    pub fn is_editable(&self, status: AppointmentStatus) -> bool {
        matches!(status, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn is_cancellable(&self, status: AppointmentStatus) -> bool {
        !self.is_terminal(status)
    }

    pub fn is_terminal(&self, status: AppointmentStatus) -> bool {
        self.get_valid_transitions(status).is_empty()
    }

    /// Cancelled and no-show appointments free their interval.
    pub fn occupies_slot(status: AppointmentStatus) -> bool {
        !matches!(status, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    /// Whether moving into `status` frees the slot for the waitlist.
    pub fn releases_slot(&self, from: AppointmentStatus, to: AppointmentStatus) -> bool {
        Self::occupies_slot(from) && !Self::occupies_slot(to)
    }
}
