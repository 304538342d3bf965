// libs/appointment-cell/src/services/scheduling.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::{ConfigError, SchedulingPolicy};
use shared_models::{
    AppointmentStatus, Clock, ErrorKind, HistoryAction, HistoryRecorder, PatientDirectory,
    PractitionerDirectory,
};
use shared_utils::{KeyedLocks, TimeRange};
use waitlist_cell::{PromotionOutcome, SlotOffer, WaitlistEngine};

use crate::models::{
    Appointment, AppointmentError, CancellationInfo, CreateAppointmentRequest,
    StatusChangeRequest, UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::history::HistoryEmitter;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::store::AppointmentStore;

/// Lock keys. A practitioner's day and a patient's day are the contended
/// schedules; the appointment key serializes changes to one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ScheduleKey {
    Appointment(Uuid),
    Practitioner(Uuid, NaiveDate),
    Patient(Uuid, NaiveDate),
}

/// Validates bookings, keeps practitioner and patient schedules free of
/// overlaps and drives appointments through their lifecycle. Every write to
/// appointment state goes through here.
pub struct SchedulingEngine {
    appointments: Arc<dyn AppointmentStore>,
    waitlist: Arc<WaitlistEngine>,
    practitioners: Arc<dyn PractitionerDirectory>,
    patients: Arc<dyn PatientDirectory>,
    clock: Arc<dyn Clock>,
    conflicts: ConflictDetectionService,
    lifecycle: AppointmentLifecycleService,
    history: HistoryEmitter,
    locks: KeyedLocks<ScheduleKey>,
}

impl SchedulingEngine {
    pub fn new(
        policy: SchedulingPolicy,
        appointments: Arc<dyn AppointmentStore>,
        waitlist: Arc<WaitlistEngine>,
        practitioners: Arc<dyn PractitionerDirectory>,
        patients: Arc<dyn PatientDirectory>,
        history: Arc<dyn HistoryRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;

        Ok(Self {
            conflicts: ConflictDetectionService::new(Arc::clone(&appointments), policy),
            lifecycle: AppointmentLifecycleService::new(),
            history: HistoryEmitter::new(history, Arc::clone(&clock)),
            locks: KeyedLocks::new(),
            appointments,
            waitlist,
            practitioners,
            patients,
            clock,
        })
    }

    pub fn waitlist(&self) -> &Arc<WaitlistEngine> {
        &self.waitlist
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    /// Books a new appointment in Scheduled state. If the booking satisfies
    /// one of the patient's active waitlist entries, that entry is converted
    /// together with the creation.
    #[instrument(
        skip(self, request),
        fields(practitioner_id = %request.practitioner_id, date = %request.date)
    )]
    pub async fn create(
        &self,
        request: CreateAppointmentRequest,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.book(request, None, actor)
            .await
            .inspect_err(|e| warn!("Booking rejected ({}): {}", e.kind(), e))
    }

    /// Books an appointment for a waitlist entry. The appointment and the
    /// entry's conversion both happen or neither does.
    #[instrument(
        skip(self, request),
        fields(practitioner_id = %request.practitioner_id, date = %request.date)
    )]
    pub async fn create_from_waitlist(
        &self,
        entry_id: Uuid,
        request: CreateAppointmentRequest,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.book(request, Some(entry_id), actor)
            .await
            .inspect_err(|e| warn!("Waitlist booking for entry {} rejected: {}", entry_id, e))
    }

    async fn book(
        &self,
        request: CreateAppointmentRequest,
        waitlist_entry: Option<Uuid>,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let range = request.time_range();
        self.conflicts
            .validate_timing(request.date, range, Some(self.clock.today()))?;
        self.ensure_practitioner_active(request.practitioner_id).await?;
        self.ensure_patient_exists(request.patient_id).await?;
        if let Some(entry_id) = waitlist_entry {
            self.waitlist
                .ensure_convertible(entry_id, request.patient_id)
                .await?;
        }

        let _guards = self
            .locks
            .lock_all([
                ScheduleKey::Practitioner(request.practitioner_id, request.date),
                ScheduleKey::Patient(request.patient_id, request.date),
            ])
            .await;

        self.conflicts
            .check_schedule(
                request.practitioner_id,
                request.patient_id,
                request.date,
                range,
                None,
            )
            .await?;

        let candidate = match waitlist_entry {
            Some(entry_id) => Some(entry_id),
            None => {
                let offer = SlotOffer::new(
                    request.practitioner_id,
                    request.date,
                    request.procedure_type,
                );
                self.waitlist
                    .find_patient_match(request.patient_id, &offer)
                    .await?
                    .map(|entry| entry.id)
            }
        };

        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            practitioner_id: request.practitioner_id,
            patient_id: request.patient_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            status: AppointmentStatus::Scheduled,
            procedure_type: request.procedure_type,
            notes: request.notes,
            value_cents: request.value_cents,
            cancellation: None,
            confirmed_at: None,
            started_at: None,
            completed_at: None,
            reminder_sent: false,
            reminder_sent_at: None,
            created_at: now,
            created_by: actor,
            updated_at: now,
            updated_by: actor,
            active: true,
        };
        self.appointments.save(&appointment).await?;

        let converted = match candidate {
            Some(entry_id) => match self.waitlist.convert(entry_id, appointment.id, actor).await {
                Ok(_) => Some(entry_id),
                // A direct booking does not depend on the entry; only the
                // explicit waitlist booking and infrastructure failures abort.
                Err(err)
                    if waitlist_entry.is_none() && err.kind() != ErrorKind::Infrastructure =>
                {
                    debug!("Waitlist entry {} not converted: {}", entry_id, err);
                    None
                }
                Err(err) => {
                    self.roll_back_booking(appointment.id, None, actor).await;
                    return Err(err.into());
                }
            },
            None => None,
        };

        if let Err(err) = self.record_creation(&appointment, converted, actor).await {
            self.roll_back_booking(appointment.id, converted, actor).await;
            return Err(err);
        }

        info!(
            "Appointment {} booked with practitioner {} on {} at {}",
            appointment.id,
            appointment.practitioner_id,
            appointment.date,
            appointment.time_range()
        );
        Ok(appointment)
    }

    async fn record_creation(
        &self,
        appointment: &Appointment,
        converted: Option<Uuid>,
        actor: Uuid,
    ) -> Result<(), AppointmentError> {
        self.history
            .emit(
                appointment.id,
                HistoryAction::Created,
                None,
                Some(appointment.status),
                actor,
                format!(
                    "Appointment booked for {} {}",
                    appointment.date,
                    appointment.time_range()
                ),
            )
            .await?;
        if let Some(entry_id) = converted {
            self.history
                .emit(
                    appointment.id,
                    HistoryAction::WaitlistConverted,
                    None,
                    None,
                    actor,
                    format!("Waitlist entry {} converted", entry_id),
                )
                .await?;
        }
        Ok(())
    }

    /// Undoes a booking whose paired writes did not all succeed. Failures
    /// here are logged; the caller returns the error that caused the undo.
    async fn roll_back_booking(&self, appointment_id: Uuid, converted: Option<Uuid>, actor: Uuid) {
        if let Some(entry_id) = converted {
            if let Err(err) = self
                .waitlist
                .revert_conversion(entry_id, appointment_id, actor)
                .await
            {
                error!(
                    "Waitlist entry {} still points at aborted appointment {}: {}",
                    entry_id, appointment_id, err
                );
            }
        }
        if let Err(err) = self.appointments.discard(appointment_id).await {
            error!("Failed to discard aborted appointment {}: {}", appointment_id, err);
        }
    }

    // ==========================================================================
    // EDITING
    // ==========================================================================

    /// Applies a partial update. Capacity and overlap checks only run when
    /// the practitioner, date or times change; the appointment never
    /// conflicts with itself.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.apply_update(appointment_id, request, actor)
            .await
            .inspect_err(|e| warn!("Update of appointment {} rejected: {}", appointment_id, e))
    }

    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.update(
            appointment_id,
            UpdateAppointmentRequest::reschedule(date, start_time, end_time),
            actor,
        )
        .await
    }

    async fn apply_update(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let _record_guard = self
            .locks
            .lock(ScheduleKey::Appointment(appointment_id))
            .await;
        let current = self.load(appointment_id).await?;
        if !self.lifecycle.is_editable(current.status) {
            return Err(AppointmentError::NotEditable(current.status));
        }

        let practitioner_id = request.practitioner_id.unwrap_or(current.practitioner_id);
        let date = request.date.unwrap_or(current.date);
        let range = TimeRange::new(
            request.start_time.unwrap_or(current.start_time),
            request.end_time.unwrap_or(current.end_time),
        );

        let practitioner_changed = practitioner_id != current.practitioner_id;
        let time_changed = date != current.date || range != current.time_range();
        let schedule_changed = practitioner_changed || time_changed;

        let today = time_changed.then(|| self.clock.today());
        self.conflicts.validate_timing(date, range, today)?;
        if practitioner_changed {
            self.ensure_practitioner_active(practitioner_id).await?;
        }

        let _day_guards = if schedule_changed {
            let guards = self
                .locks
                .lock_all([
                    ScheduleKey::Practitioner(practitioner_id, date),
                    ScheduleKey::Patient(current.patient_id, date),
                ])
                .await;
            self.conflicts
                .check_schedule(
                    practitioner_id,
                    current.patient_id,
                    date,
                    range,
                    Some(appointment_id),
                )
                .await?;
            guards
        } else {
            Vec::new()
        };

        let mut updated = current.clone();
        updated.practitioner_id = practitioner_id;
        updated.date = date;
        updated.start_time = range.start;
        updated.end_time = range.end;
        if let Some(procedure_type) = request.procedure_type {
            updated.procedure_type = procedure_type;
        }
        if request.notes.is_some() {
            updated.notes = request.notes;
        }
        if request.value_cents.is_some() {
            updated.value_cents = request.value_cents;
        }
        self.touch(&mut updated, actor);
        self.appointments.save(&updated).await?;

        let (action, description) = if schedule_changed {
            (
                HistoryAction::Rescheduled,
                format!(
                    "Moved from {} {} to {} {}",
                    current.date,
                    current.time_range(),
                    updated.date,
                    updated.time_range()
                ),
            )
        } else {
            (HistoryAction::Updated, "Appointment details updated".to_string())
        };
        self.history
            .emit(updated.id, action, None, None, actor, description)
            .await?;

        info!("Appointment {} updated ({})", updated.id, action);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let _guard = self
            .locks
            .lock(ScheduleKey::Appointment(appointment_id))
            .await;
        let mut appointment = self.load(appointment_id).await?;
        if !self.lifecycle.is_editable(appointment.status) {
            return Err(AppointmentError::NotEditable(appointment.status));
        }

        appointment.reminder_sent = true;
        appointment.reminder_sent_at = Some(self.clock.now());
        self.touch(&mut appointment, actor);
        self.appointments.save(&appointment).await?;

        self.history
            .emit(
                appointment.id,
                HistoryAction::ReminderSent,
                None,
                None,
                actor,
                "Reminder sent",
            )
            .await?;
        Ok(appointment)
    }

    // ==========================================================================
    // STATUS CHANGES
    // ==========================================================================

    /// Moves the appointment along the transition table. Cancellation and
    /// no-show then promote the head of the waitlist for the freed slot;
    /// a promotion failure is returned after the status change was saved.
    #[instrument(skip(self, request), fields(target = %request.target))]
    pub async fn change_status(
        &self,
        appointment_id: Uuid,
        request: StatusChangeRequest,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let (appointment, previous, recorded) = {
            let _guard = self
                .locks
                .lock(ScheduleKey::Appointment(appointment_id))
                .await;
            let mut appointment = self.load(appointment_id).await?;
            let previous = appointment.status;
            self.lifecycle
                .validate_status_transition(previous, request.target)?;

            let now = self.clock.now();
            match request.target {
                AppointmentStatus::Confirmed => appointment.confirmed_at = Some(now),
                AppointmentStatus::InProgress => appointment.started_at = Some(now),
                AppointmentStatus::Completed => appointment.completed_at = Some(now),
                AppointmentStatus::Cancelled => {
                    appointment.cancellation = Some(CancellationInfo {
                        reason: request.reason,
                        cancelled_by: actor,
                        cancelled_at: now,
                    })
                }
                AppointmentStatus::Scheduled | AppointmentStatus::NoShow => {}
            }
            appointment.status = request.target;
            self.touch(&mut appointment, actor);
            self.appointments.save(&appointment).await?;
            info!(
                "Appointment {} moved {} -> {}",
                appointment.id, previous, appointment.status
            );

            let recorded = self
                .history
                .status_changed(&appointment, previous, actor)
                .await;
            (appointment, previous, recorded)
        };

        // The status change is committed; the freed slot is offered even if
        // the history write failed.
        if self.lifecycle.releases_slot(previous, appointment.status) {
            self.promote_freed_slot(&appointment, actor)
                .await
                .inspect_err(|_| log_unrecorded(&recorded))?;
        }
        recorded?;
        Ok(appointment)
    }

    pub async fn confirm(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.change_status(
            appointment_id,
            StatusChangeRequest::to(AppointmentStatus::Confirmed),
            actor,
        )
        .await
    }

    pub async fn start(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.change_status(
            appointment_id,
            StatusChangeRequest::to(AppointmentStatus::InProgress),
            actor,
        )
        .await
    }

    pub async fn complete(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.change_status(
            appointment_id,
            StatusChangeRequest::to(AppointmentStatus::Completed),
            actor,
        )
        .await
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let request = StatusChangeRequest {
            target: AppointmentStatus::Cancelled,
            reason,
        };
        self.change_status(appointment_id, request, actor).await
    }

    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.change_status(
            appointment_id,
            StatusChangeRequest::to(AppointmentStatus::NoShow),
            actor,
        )
        .await
    }

    /// Soft delete. An appointment that was still pending frees its slot to
    /// the waitlist as a cancellation would.
    #[instrument(skip(self))]
    pub async fn deactivate(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<(), AppointmentError> {
        let (appointment, recorded) = {
            let _guard = self
                .locks
                .lock(ScheduleKey::Appointment(appointment_id))
                .await;
            let appointment = self.load(appointment_id).await?;

            self.appointments
                .soft_deactivate(appointment_id, actor, self.clock.now())
                .await?;
            info!("Appointment {} deactivated", appointment_id);

            let recorded = self
                .history
                .emit(
                    appointment_id,
                    HistoryAction::Deactivated,
                    Some(appointment.status),
                    None,
                    actor,
                    "Appointment deactivated",
                )
                .await;
            (appointment, recorded)
        };

        if self.lifecycle.is_cancellable(appointment.status) {
            self.promote_freed_slot(&appointment, actor)
                .await
                .inspect_err(|_| log_unrecorded(&recorded))?;
        }
        recorded
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.load(appointment_id).await
    }

    pub async fn check_availability(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<bool, AppointmentError> {
        self.conflicts
            .check_availability(practitioner_id, date, start, end)
            .await
    }

    pub async fn free_slots(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> Result<Vec<TimeRange>, AppointmentError> {
        if duration_minutes <= 0 {
            let policy = self.conflicts.policy();
            return Err(AppointmentError::DurationOutOfBounds {
                minutes: duration_minutes,
                min: policy.min_duration_minutes,
                max: policy.max_duration_minutes,
            });
        }
        self.conflicts
            .free_slots(practitioner_id, date, duration_minutes)
            .await
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn promote_freed_slot(
        &self,
        appointment: &Appointment,
        actor: Uuid,
    ) -> Result<PromotionOutcome, AppointmentError> {
        let outcome = self
            .waitlist
            .promote(&appointment.slot_offer(), actor)
            .await?;

        if let Some(entry_id) = outcome.notified_entry() {
            self.history
                .emit(
                    appointment.id,
                    HistoryAction::WaitlistPromoted,
                    None,
                    None,
                    actor,
                    format!("Waitlist entry {} notified of the freed slot", entry_id),
                )
                .await?;
        }
        debug!("Promotion for appointment {}: {:?}", appointment.id, outcome);
        Ok(outcome)
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .find_active_by_id(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    async fn ensure_practitioner_active(
        &self,
        practitioner_id: Uuid,
    ) -> Result<(), AppointmentError> {
        if !self.practitioners.exists(practitioner_id).await? {
            return Err(AppointmentError::PractitionerNotFound(practitioner_id));
        }
        if !self.practitioners.is_active(practitioner_id).await? {
            return Err(AppointmentError::PractitionerInactive(practitioner_id));
        }
        Ok(())
    }

    async fn ensure_patient_exists(&self, patient_id: Uuid) -> Result<(), AppointmentError> {
        if !self.patients.exists(patient_id).await? {
            return Err(AppointmentError::PatientNotFound(patient_id));
        }
        Ok(())
    }

    fn touch(&self, appointment: &mut Appointment, actor: Uuid) {
        appointment.updated_at = self.clock.now();
        appointment.updated_by = actor;
    }
}

/// A history failure that is about to be superseded by a later error.
fn log_unrecorded(recorded: &Result<(), AppointmentError>) {
    if let Err(err) = recorded {
        error!("History event lost after committed change: {}", err);
    }
}
