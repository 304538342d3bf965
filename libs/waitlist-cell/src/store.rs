use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{queue_order, WaitlistEntry, WaitlistFilter};

#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Active entries admitted by `filter`, in queue order.
    async fn find_active_ordered(&self, filter: &WaitlistFilter) -> Result<Vec<WaitlistEntry>>;

    async fn find_by_id(&self, entry_id: Uuid) -> Result<Option<WaitlistEntry>>;

    /// Inserts or replaces the entry with the same id.
    async fn save(&self, entry: &WaitlistEntry) -> Result<()>;

    /// Whether the patient already holds an active entry with exactly this
    /// practitioner scope (`None` is the global scope).
    async fn exists_active_duplicate(
        &self,
        patient_id: Uuid,
        practitioner_id: Option<Uuid>,
    ) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemoryWaitlistStore {
    entries: DashMap<Uuid, WaitlistEntry>,
}

impl InMemoryWaitlistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl WaitlistStore for InMemoryWaitlistStore {
    async fn find_active_ordered(&self, filter: &WaitlistFilter) -> Result<Vec<WaitlistEntry>> {
        let mut found: Vec<WaitlistEntry> = self
            .entries
            .iter()
            .filter(|e| e.is_active() && filter.admits(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(queue_order);
        Ok(found)
    }

    async fn find_by_id(&self, entry_id: Uuid) -> Result<Option<WaitlistEntry>> {
        Ok(self.entries.get(&entry_id).map(|e| e.value().clone()))
    }

    async fn save(&self, entry: &WaitlistEntry) -> Result<()> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn exists_active_duplicate(
        &self,
        patient_id: Uuid,
        practitioner_id: Option<Uuid>,
    ) -> Result<bool> {
        Ok(self.entries.iter().any(|e| {
            e.patient_id == patient_id && e.practitioner_id == practitioner_id && e.is_active()
        }))
    }
}
