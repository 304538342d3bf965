use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::scheduling::AppointmentStatus;

/// Actor recorded for changes made by automatic sweeps.
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Rescheduled,
    StatusChanged,
    ReminderSent,
    Deactivated,
    WaitlistConverted,
    WaitlistPromoted,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::Created => write!(f, "created"),
            HistoryAction::Updated => write!(f, "updated"),
            HistoryAction::Rescheduled => write!(f, "rescheduled"),
            HistoryAction::StatusChanged => write!(f, "status_changed"),
            HistoryAction::ReminderSent => write!(f, "reminder_sent"),
            HistoryAction::Deactivated => write!(f, "deactivated"),
            HistoryAction::WaitlistConverted => write!(f, "waitlist_converted"),
            HistoryAction::WaitlistPromoted => write!(f, "waitlist_promoted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub appointment_id: Uuid,
    pub action: HistoryAction,
    pub previous_status: Option<AppointmentStatus>,
    pub new_status: Option<AppointmentStatus>,
    pub actor: Uuid,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only sink for appointment history. Never read back by the engines.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record(&self, event: HistoryEvent) -> Result<()>;
}
