use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::SchedulingPolicy;
use shared_utils::{free_gaps, TimeRange};

use crate::models::AppointmentError;
use crate::store::AppointmentStore;

/// Policy checks and conflict queries against the practitioner's and the
/// patient's day schedules. Callers serialize the check-then-write sequence.
pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
    policy: SchedulingPolicy,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>, policy: SchedulingPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub fn business_hours(&self) -> TimeRange {
        TimeRange::new(self.policy.business_open, self.policy.business_close)
    }

    /// Interval, duration, date and business-hours rules, in that order.
    /// `today` is `None` when the past-date rule does not apply.
    pub fn validate_timing(
        &self,
        date: NaiveDate,
        range: TimeRange,
        today: Option<NaiveDate>,
    ) -> Result<(), AppointmentError> {
        if range.is_empty() {
            return Err(AppointmentError::InvalidTimeRange {
                start: range.start,
                end: range.end,
            });
        }

        let minutes = range.duration_minutes();
        if minutes < self.policy.min_duration_minutes
            || minutes > self.policy.max_duration_minutes
        {
            return Err(AppointmentError::DurationOutOfBounds {
                minutes,
                min: self.policy.min_duration_minutes,
                max: self.policy.max_duration_minutes,
            });
        }

        if let Some(today) = today {
            if date < today {
                return Err(AppointmentError::DateInPast { date, today });
            }
        }

        let business_hours = self.business_hours();
        if !business_hours.contains(&range) {
            return Err(AppointmentError::OutsideBusinessHours {
                requested: range,
                business_hours,
            });
        }

        Ok(())
    }

    /// Daily capacity, then practitioner overlap, then patient overlap.
    /// `exclude_id` is the appointment being moved, if any.
    pub async fn check_schedule(
        &self,
        practitioner_id: Uuid,
        patient_id: Uuid,
        date: NaiveDate,
        range: TimeRange,
        exclude_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let booked = self
            .store
            .count_active_for_practitioner_on_date(practitioner_id, date, exclude_id)
            .await?;
        if booked >= self.policy.daily_capacity {
            warn!(
                "Practitioner {} is at capacity ({}) on {}",
                practitioner_id, self.policy.daily_capacity, date
            );
            return Err(AppointmentError::DailyCapacityExceeded {
                practitioner_id,
                date,
                capacity: self.policy.daily_capacity,
            });
        }

        let clashes = self
            .store
            .find_overlapping(practitioner_id, date, range.start, range.end, exclude_id)
            .await?;
        if let Some(existing) = clashes.first() {
            warn!(
                "Conflict detected for practitioner {} - {} overlaps appointment {}",
                practitioner_id, range, existing.id
            );
            return Err(AppointmentError::PractitionerConflict {
                appointment_id: existing.id,
                range: existing.time_range(),
            });
        }

        let clashes = self
            .store
            .find_overlapping_for_patient(patient_id, date, range.start, range.end, exclude_id)
            .await?;
        if let Some(existing) = clashes.first() {
            warn!(
                "Conflict detected for patient {} - {} overlaps appointment {}",
                patient_id, range, existing.id
            );
            return Err(AppointmentError::PatientConflict {
                appointment_id: existing.id,
                range: existing.time_range(),
            });
        }

        Ok(())
    }

    pub async fn check_availability(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<bool, AppointmentError> {
        let clashes = self
            .store
            .find_overlapping(practitioner_id, date, start, end, None)
            .await?;
        debug!(
            "Availability check for practitioner {} on {}: {} clashes",
            practitioner_id,
            date,
            clashes.len()
        );
        Ok(clashes.is_empty())
    }

    /// Every gap of at least `duration_minutes` between business open and
    /// close, sorted by start.
    pub async fn free_slots(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> Result<Vec<TimeRange>, AppointmentError> {
        let busy: Vec<TimeRange> = self
            .store
            .find_active_for_practitioner_on_date(practitioner_id, date)
            .await?
            .iter()
            .map(|a| a.time_range())
            .collect();

        Ok(free_gaps(self.business_hours(), &busy, duration_minutes))
    }
}
