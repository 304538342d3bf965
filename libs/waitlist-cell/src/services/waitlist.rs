use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::{ConfigError, SchedulingPolicy};
use shared_models::{
    Clock, NotificationDispatcher, PatientDirectory, PractitionerDirectory, SYSTEM_ACTOR,
};
use shared_utils::KeyedLocks;

use crate::error::WaitlistError;
use crate::lifecycle;
use crate::models::{
    queue_order, EnqueueRequest, NotifyOutcome, PromotionOutcome, SlotOffer, WaitlistEntry,
    WaitlistFilter, WaitlistStatus, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::store::WaitlistStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum WaitlistLockKey {
    Patient(Uuid),
    Entry(Uuid),
}

/// Priority waitlist: ordering, slot matching, notification and the
/// entry lifecycle.
pub struct WaitlistEngine {
    policy: SchedulingPolicy,
    store: Arc<dyn WaitlistStore>,
    practitioners: Arc<dyn PractitionerDirectory>,
    patients: Arc<dyn PatientDirectory>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<WaitlistLockKey>,
}

impl WaitlistEngine {
    pub fn new(
        policy: SchedulingPolicy,
        store: Arc<dyn WaitlistStore>,
        practitioners: Arc<dyn PractitionerDirectory>,
        patients: Arc<dyn PatientDirectory>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            store,
            practitioners,
            patients,
            notifier,
            clock,
            locks: KeyedLocks::new(),
        })
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    // ==========================================================================
    // QUEUE MANAGEMENT
    // ==========================================================================

    #[instrument(skip(self, request), fields(patient_id = %request.patient_id))]
    pub async fn enqueue(
        &self,
        request: EnqueueRequest,
        actor: Uuid,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let priority = request
            .priority
            .unwrap_or(self.policy.default_waitlist_priority);
        validate_priority(priority)?;

        match (request.preferred_start_time, request.preferred_end_time) {
            (Some(start), Some(end)) if start >= end => {
                warn!("Rejected waitlist window {} - {}", start, end);
                return Err(WaitlistError::InvalidPreferredWindow(format!(
                    "start {} must be before end {}",
                    start.format("%H:%M"),
                    end.format("%H:%M")
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(WaitlistError::InvalidPreferredWindow(
                    "both start and end must be given".to_string(),
                ));
            }
            _ => {}
        }

        let today = self.clock.today();
        if let Some(date) = request.preferred_date {
            if date < today {
                return Err(WaitlistError::PreferredDateInPast { date, today });
            }
        }

        if !self.patients.exists(request.patient_id).await? {
            return Err(WaitlistError::PatientNotFound(request.patient_id));
        }
        if let Some(practitioner_id) = request.practitioner_id {
            self.ensure_practitioner_active(practitioner_id).await?;
        }

        let _guard = self
            .locks
            .lock(WaitlistLockKey::Patient(request.patient_id))
            .await;

        if self
            .store
            .exists_active_duplicate(request.patient_id, request.practitioner_id)
            .await?
        {
            warn!(
                "Patient {} already waiting for practitioner {:?}",
                request.patient_id, request.practitioner_id
            );
            return Err(WaitlistError::DuplicateActiveEntry {
                patient_id: request.patient_id,
                practitioner_id: request.practitioner_id,
            });
        }

        let now = self.clock.now();
        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            practitioner_id: request.practitioner_id,
            preferred_date: request.preferred_date,
            preferred_start_time: request.preferred_start_time,
            preferred_end_time: request.preferred_end_time,
            preferred_period: request.preferred_period,
            procedure_type: request.procedure_type,
            priority,
            accepts_any_time: request.accepts_any_time,
            accepts_any_practitioner: request.accepts_any_practitioner,
            notes: request.notes,
            status: WaitlistStatus::Waiting,
            notified: false,
            notified_at: None,
            contact_attempts: 0,
            last_attempt_at: None,
            notifications_exhausted: false,
            pending_offer: None,
            appointment_id: None,
            converted_at: None,
            closed_at: None,
            created_at: now,
            created_by: actor,
            updated_at: now,
            updated_by: actor,
        };
        self.store.save(&entry).await?;

        info!(
            "Waitlist entry {} created for patient {} (priority {})",
            entry.id, entry.patient_id, entry.priority
        );
        Ok(entry)
    }

    pub async fn get(&self, entry_id: Uuid) -> Result<WaitlistEntry, WaitlistError> {
        self.load(entry_id).await
    }

    #[instrument(skip(self))]
    pub async fn update_priority(
        &self,
        entry_id: Uuid,
        priority: u8,
        actor: Uuid,
    ) -> Result<WaitlistEntry, WaitlistError> {
        validate_priority(priority)?;

        let _guard = self.locks.lock(WaitlistLockKey::Entry(entry_id)).await;
        let mut entry = self.load(entry_id).await?;
        if !entry.is_active() {
            return Err(WaitlistError::EntryNotActive {
                entry_id,
                status: entry.status,
            });
        }

        let previous = entry.priority;
        entry.priority = priority;
        self.touch(&mut entry, actor);
        self.store.save(&entry).await?;

        info!("Waitlist entry {} priority {} -> {}", entry_id, previous, priority);
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        entry_id: Uuid,
        actor: Uuid,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let _guard = self.locks.lock(WaitlistLockKey::Entry(entry_id)).await;
        let mut entry = self.load(entry_id).await?;
        lifecycle::validate_transition(entry.status, WaitlistStatus::Cancelled)?;

        entry.status = WaitlistStatus::Cancelled;
        entry.closed_at = Some(self.clock.now());
        self.touch(&mut entry, actor);
        self.store.save(&entry).await?;

        info!("Waitlist entry {} cancelled", entry_id);
        Ok(entry)
    }

    /// 1-based rank among active entries in the entry's own scope: its
    /// practitioner's queue, or the global queue when it takes any
    /// practitioner. Inactive entries rank 0.
    pub async fn position(&self, entry_id: Uuid) -> Result<usize, WaitlistError> {
        let entry = self.load(entry_id).await?;
        if !entry.is_active() {
            return Ok(0);
        }

        let filter = match entry.practitioner_id {
            Some(practitioner_id) if !entry.accepts_any_practitioner => {
                WaitlistFilter::for_practitioner(practitioner_id)
            }
            _ => WaitlistFilter::default(),
        };
        let queue = self.store.find_active_ordered(&filter).await?;

        Ok(queue
            .iter()
            .position(|e| e.id == entry_id)
            .map(|index| index + 1)
            .unwrap_or(0))
    }

    // ==========================================================================
    // MATCHING AND PROMOTION
    // ==========================================================================

    /// Active entries that would take the offered slot, in queue order.
    pub async fn find_compatible(
        &self,
        offer: &SlotOffer,
    ) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let mut compatible: Vec<WaitlistEntry> = self
            .store
            .find_active_ordered(&offer.filter())
            .await?
            .into_iter()
            .filter(|entry| entry.accepts_window(offer.window))
            .collect();
        compatible.sort_by(queue_order);

        debug!(
            "{} compatible waitlist entries for practitioner {} on {}",
            compatible.len(),
            offer.practitioner_id,
            offer.date
        );
        Ok(compatible)
    }

    /// Notifies at most one entry: the head of the compatible queue. A head
    /// that was already notified holds the slot until it books or leaves.
    #[instrument(
        skip(self, offer),
        fields(practitioner_id = %offer.practitioner_id, date = %offer.date)
    )]
    pub async fn promote(
        &self,
        offer: &SlotOffer,
        actor: Uuid,
    ) -> Result<PromotionOutcome, WaitlistError> {
        let head = self
            .find_compatible(offer)
            .await?
            .into_iter()
            .find(|entry| !entry.notifications_exhausted);

        let Some(head) = head else {
            debug!("No waitlist candidate for freed slot");
            return Ok(PromotionOutcome::NoCandidate);
        };

        if head.status == WaitlistStatus::Notified {
            info!("Waitlist head {} is still awaiting response", head.id);
            return Ok(PromotionOutcome::HeadAwaitingResponse { entry_id: head.id });
        }

        let outcome = self.notify(head.id, offer, actor).await?;
        Ok(PromotionOutcome::Attempted(outcome))
    }

    /// Dispatches the offer to the entry's patient. The entry lock is not
    /// held while the dispatcher runs; the entry is re-read afterwards and
    /// the outcome only applies if it is still Waiting.
    #[instrument(skip(self, offer))]
    pub async fn notify(
        &self,
        entry_id: Uuid,
        offer: &SlotOffer,
        actor: Uuid,
    ) -> Result<NotifyOutcome, WaitlistError> {
        let patient_id = {
            let _guard = self.locks.lock(WaitlistLockKey::Entry(entry_id)).await;
            let entry = self.load(entry_id).await?;
            lifecycle::validate_transition(entry.status, WaitlistStatus::Notified)?;
            entry.patient_id
        };

        let dispatch = self
            .notifier
            .send(patient_id, offer.to_message(entry_id))
            .await;

        let _guard = self.locks.lock(WaitlistLockKey::Entry(entry_id)).await;
        let mut entry = self.load(entry_id).await?;
        if entry.status != WaitlistStatus::Waiting {
            debug!("Entry {} moved to {} during dispatch", entry_id, entry.status);
            return Ok(NotifyOutcome::Superseded {
                entry_id,
                status: entry.status,
            });
        }

        let now = self.clock.now();
        let outcome = match dispatch {
            Ok(()) => {
                entry.status = WaitlistStatus::Notified;
                entry.notified = true;
                entry.notified_at = Some(now);
                entry.pending_offer = None;
                info!("Waitlist entry {} notified of slot on {}", entry_id, offer.date);
                NotifyOutcome::Notified { entry_id }
            }
            Err(err) => {
                entry.contact_attempts += 1;
                entry.last_attempt_at = Some(now);
                entry.notifications_exhausted =
                    entry.contact_attempts >= self.policy.max_contact_attempts;
                entry.pending_offer = Some(offer.clone());
                warn!(
                    "Notification for waitlist entry {} failed (attempt {}/{}): {}",
                    entry_id, entry.contact_attempts, self.policy.max_contact_attempts, err
                );
                NotifyOutcome::DispatchFailed {
                    entry_id,
                    attempts: entry.contact_attempts,
                    exhausted: entry.notifications_exhausted,
                }
            }
        };

        self.touch(&mut entry, actor);
        self.store.save(&entry).await?;
        Ok(outcome)
    }

    // ==========================================================================
    // CONVERSION
    // ==========================================================================

    /// Checks that the entry can still be converted for this patient.
    pub async fn ensure_convertible(
        &self,
        entry_id: Uuid,
        patient_id: Uuid,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let entry = self.load(entry_id).await?;
        if !entry.is_active() {
            return Err(WaitlistError::EntryNotActive {
                entry_id,
                status: entry.status,
            });
        }
        if entry.patient_id != patient_id {
            return Err(WaitlistError::PatientMismatch {
                entry_id,
                owner: entry.patient_id,
                patient_id,
            });
        }
        Ok(entry)
    }

    /// The patient's first active entry that a booking for `offer` satisfies.
    /// Time preferences are not consulted; the patient picked the time.
    pub async fn find_patient_match(
        &self,
        patient_id: Uuid,
        offer: &SlotOffer,
    ) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let matched = self
            .store
            .find_active_ordered(&offer.filter())
            .await?
            .into_iter()
            .find(|entry| entry.patient_id == patient_id);
        Ok(matched)
    }

    #[instrument(skip(self))]
    pub async fn convert(
        &self,
        entry_id: Uuid,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let _guard = self.locks.lock(WaitlistLockKey::Entry(entry_id)).await;
        let mut entry = self.load(entry_id).await?;
        lifecycle::validate_transition(entry.status, WaitlistStatus::Converted)?;

        entry.status = WaitlistStatus::Converted;
        entry.appointment_id = Some(appointment_id);
        entry.converted_at = Some(self.clock.now());
        entry.pending_offer = None;
        self.touch(&mut entry, actor);
        self.store.save(&entry).await?;

        info!("Waitlist entry {} converted to appointment {}", entry_id, appointment_id);
        Ok(entry)
    }

    /// Reopens an entry whose conversion belonged to a booking that was
    /// rolled back. An entry linked to another appointment is left alone.
    #[instrument(skip(self))]
    pub async fn revert_conversion(
        &self,
        entry_id: Uuid,
        appointment_id: Uuid,
        actor: Uuid,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let _guard = self.locks.lock(WaitlistLockKey::Entry(entry_id)).await;
        let mut entry = self.load(entry_id).await?;
        if entry.status != WaitlistStatus::Converted || entry.appointment_id != Some(appointment_id)
        {
            return Err(WaitlistError::EntryNotActive {
                entry_id,
                status: entry.status,
            });
        }

        // Only a notified entry carries the flag, so it tells the two
        // convertible states apart.
        entry.status = if entry.notified {
            WaitlistStatus::Notified
        } else {
            WaitlistStatus::Waiting
        };
        entry.appointment_id = None;
        entry.converted_at = None;
        self.touch(&mut entry, actor);
        self.store.save(&entry).await?;

        warn!(
            "Waitlist entry {} reopened as {} after appointment {} was rolled back",
            entry_id, entry.status, appointment_id
        );
        Ok(entry)
    }

    // ==========================================================================
    // SWEEPS
    // ==========================================================================

    /// Expires active entries whose preferred date is before `today`.
    /// Returns the ids expired by this call only.
    #[instrument(skip(self))]
    pub async fn expire_overdue(&self, today: NaiveDate) -> Result<Vec<Uuid>, WaitlistError> {
        let overdue: Vec<Uuid> = self
            .store
            .find_active_ordered(&WaitlistFilter::default())
            .await?
            .into_iter()
            .filter(|entry| entry.preferred_date.is_some_and(|date| date < today))
            .map(|entry| entry.id)
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for entry_id in overdue {
            let _guard = self.locks.lock(WaitlistLockKey::Entry(entry_id)).await;
            let mut entry = self.load(entry_id).await?;
            let still_overdue = entry.preferred_date.is_some_and(|date| date < today);
            if !entry.is_active() || !still_overdue {
                continue;
            }

            entry.status = WaitlistStatus::Expired;
            entry.closed_at = Some(self.clock.now());
            self.touch(&mut entry, SYSTEM_ACTOR);
            self.store.save(&entry).await?;
            expired.push(entry_id);
        }

        if !expired.is_empty() {
            info!("Expired {} overdue waitlist entries", expired.len());
        }
        Ok(expired)
    }

    /// Re-dispatches stored offers whose delivery failed, skipping exhausted
    /// entries.
    #[instrument(skip(self))]
    pub async fn retry_pending_notifications(&self) -> Result<Vec<NotifyOutcome>, WaitlistError> {
        let pending: Vec<(Uuid, SlotOffer)> = self
            .store
            .find_active_ordered(&WaitlistFilter::default())
            .await?
            .into_iter()
            .filter(|entry| {
                entry.status == WaitlistStatus::Waiting && !entry.notifications_exhausted
            })
            .filter_map(|entry| entry.pending_offer.map(|offer| (entry.id, offer)))
            .collect();

        let mut outcomes = Vec::with_capacity(pending.len());
        for (entry_id, offer) in pending {
            match self.notify(entry_id, &offer, SYSTEM_ACTOR).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(WaitlistError::InvalidTransition { from, .. }) => {
                    debug!("Skipping retry for entry {} in {}", entry_id, from);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcomes)
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn load(&self, entry_id: Uuid) -> Result<WaitlistEntry, WaitlistError> {
        self.store
            .find_by_id(entry_id)
            .await?
            .ok_or(WaitlistError::EntryNotFound(entry_id))
    }

    async fn ensure_practitioner_active(&self, practitioner_id: Uuid) -> Result<(), WaitlistError> {
        if !self.practitioners.exists(practitioner_id).await? {
            return Err(WaitlistError::PractitionerNotFound(practitioner_id));
        }
        if !self.practitioners.is_active(practitioner_id).await? {
            return Err(WaitlistError::PractitionerInactive(practitioner_id));
        }
        Ok(())
    }

    fn touch(&self, entry: &mut WaitlistEntry, actor: Uuid) {
        entry.updated_at = self.clock.now();
        entry.updated_by = actor;
    }
}

fn validate_priority(priority: u8) -> Result<(), WaitlistError> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        warn!("Rejected waitlist priority {}", priority);
        Err(WaitlistError::PriorityOutOfRange(priority))
    }
}
