use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduling::ProcedureType;

/// Structured notification payload. Rendering and channel selection belong to
/// the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationMessage {
    /// A slot compatible with a waitlist entry has been freed.
    SlotAvailable {
        entry_id: Uuid,
        practitioner_id: Uuid,
        date: NaiveDate,
        start_time: Option<NaiveTime>,
        end_time: Option<NaiveTime>,
        procedure_type: ProcedureType,
    },
}

/// Channel-agnostic delivery. A returned error is counted as a failed contact
/// attempt by the caller; implementations must tolerate re-delivery for the
/// same entry.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, patient_id: Uuid, message: NotificationMessage) -> Result<()>;
}
