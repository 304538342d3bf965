use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use shared_utils::overlaps;

use crate::models::Appointment;

/// Persistence boundary for appointments. In every query "active" means the
/// record is not soft-deleted and its status still occupies the slot
/// (not Cancelled or NoShow).
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Non-deleted appointment by id, whatever its status.
    async fn find_active_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>>;

    async fn find_overlapping(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>>;

    async fn find_overlapping_for_patient(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>>;

    async fn count_active_for_practitioner_on_date(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        exclude_id: Option<Uuid>,
    ) -> Result<usize>;

    /// Sorted by start time.
    async fn find_active_for_practitioner_on_date(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>>;

    /// Inserts or replaces the appointment with the same id.
    async fn save(&self, appointment: &Appointment) -> Result<()>;

    async fn soft_deactivate(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Removes a just-created appointment whose paired write failed.
    async fn discard(&self, appointment_id: Uuid) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: DashMap<Uuid, Appointment>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, including soft-deleted ones.
    pub fn all(&self) -> Vec<Appointment> {
        self.appointments.iter().map(|a| a.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    fn occupying<F>(&self, predicate: F) -> Vec<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        let mut found: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|a| a.occupies_slot() && predicate(a.value()))
            .map(|a| a.value().clone())
            .collect();
        found.sort_by_key(|a| (a.start_time, a.id));
        found
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_active_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        Ok(self
            .appointments
            .get(&appointment_id)
            .filter(|a| a.active)
            .map(|a| a.value().clone()))
    }

    async fn find_overlapping(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>> {
        Ok(self.occupying(|a| {
            a.practitioner_id == practitioner_id
                && a.date == date
                && Some(a.id) != exclude_id
                && overlaps(a.start_time, a.end_time, start, end)
        }))
    }

    async fn find_overlapping_for_patient(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>> {
        Ok(self.occupying(|a| {
            a.patient_id == patient_id
                && a.date == date
                && Some(a.id) != exclude_id
                && overlaps(a.start_time, a.end_time, start, end)
        }))
    }

    async fn count_active_for_practitioner_on_date(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        exclude_id: Option<Uuid>,
    ) -> Result<usize> {
        Ok(self
            .occupying(|a| {
                a.practitioner_id == practitioner_id && a.date == date && Some(a.id) != exclude_id
            })
            .len())
    }

    async fn find_active_for_practitioner_on_date(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        Ok(self.occupying(|a| a.practitioner_id == practitioner_id && a.date == date))
    }

    async fn save(&self, appointment: &Appointment) -> Result<()> {
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn soft_deactivate(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut appointment = self
            .appointments
            .get_mut(&appointment_id)
            .ok_or_else(|| anyhow!("appointment {} does not exist", appointment_id))?;
        appointment.active = false;
        appointment.updated_at = at;
        appointment.updated_by = actor;
        Ok(())
    }

    async fn discard(&self, appointment_id: Uuid) -> Result<()> {
        self.appointments.remove(&appointment_id);
        Ok(())
    }
}
