use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use shared_models::{AppointmentStatus, Clock, HistoryAction, HistoryEvent, HistoryRecorder};

use crate::models::{Appointment, AppointmentError};

/// Stamps history events with the engine clock, mirrors them to the log and
/// hands them to the recorder.
pub struct HistoryEmitter {
    recorder: Arc<dyn HistoryRecorder>,
    clock: Arc<dyn Clock>,
}

impl HistoryEmitter {
    pub fn new(recorder: Arc<dyn HistoryRecorder>, clock: Arc<dyn Clock>) -> Self {
        Self { recorder, clock }
    }

    pub async fn emit(
        &self,
        appointment_id: Uuid,
        action: HistoryAction,
        previous_status: Option<AppointmentStatus>,
        new_status: Option<AppointmentStatus>,
        actor: Uuid,
        description: impl Into<String>,
    ) -> Result<(), AppointmentError> {
        let event = HistoryEvent {
            appointment_id,
            action,
            previous_status,
            new_status,
            actor,
            description: description.into(),
            recorded_at: self.clock.now(),
        };

        info!(
            appointment_id = %event.appointment_id,
            action = %event.action,
            actor = %event.actor,
            "{}",
            event.description
        );

        self.recorder.record(event).await?;
        Ok(())
    }

    pub async fn status_changed(
        &self,
        appointment: &Appointment,
        previous: AppointmentStatus,
        actor: Uuid,
    ) -> Result<(), AppointmentError> {
        self.emit(
            appointment.id,
            HistoryAction::StatusChanged,
            Some(previous),
            Some(appointment.status),
            actor,
            format!("Status changed from {} to {}", previous, appointment.status),
        )
        .await
    }
}
