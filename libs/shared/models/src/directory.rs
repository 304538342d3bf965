use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Read-only view of the practitioner registry. Profile CRUD lives elsewhere.
#[async_trait]
pub trait PractitionerDirectory: Send + Sync {
    async fn exists(&self, practitioner_id: Uuid) -> Result<bool>;

    async fn is_active(&self, practitioner_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn exists(&self, patient_id: Uuid) -> Result<bool>;
}
