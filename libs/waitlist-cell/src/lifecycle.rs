use crate::error::WaitlistError;
use crate::models::WaitlistStatus;

/// Entries in these states are matched, counted in queue position and
/// checked for duplicates.
pub fn is_active(status: WaitlistStatus) -> bool {
    matches!(status, WaitlistStatus::Waiting | WaitlistStatus::Notified)
}

pub fn allowed_transitions(from: WaitlistStatus) -> &'static [WaitlistStatus] {
    match from {
        WaitlistStatus::Waiting => &[
            WaitlistStatus::Notified,
            WaitlistStatus::Converted,
            WaitlistStatus::Cancelled,
            WaitlistStatus::Expired,
        ],
        WaitlistStatus::Notified => &[
            WaitlistStatus::Converted,
            WaitlistStatus::Cancelled,
            WaitlistStatus::Expired,
        ],
        WaitlistStatus::Converted | WaitlistStatus::Cancelled | WaitlistStatus::Expired => &[],
    }
}

pub fn validate_transition(from: WaitlistStatus, to: WaitlistStatus) -> Result<(), WaitlistError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(WaitlistError::InvalidTransition { from, to })
    }
}
