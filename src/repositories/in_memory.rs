use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ReplenishmentStore;
use crate::errors::ServiceError;
use crate::models::{ConsumptionStats, SystemDraft, VarianceEvent, VarianceKey, WorkingCopy};

/// Process-local store. Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    stats: Arc<DashMap<(Uuid, Uuid), ConsumptionStats>>,
    variance_events: Arc<DashMap<VarianceKey, VarianceEvent>>,
    variance_keys: Arc<DashMap<Uuid, VarianceKey>>,
    drafts: Arc<DashMap<Uuid, SystemDraft>>,
    working_copies: Arc<DashMap<Uuid, WorkingCopy>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variance_event_count(&self) -> usize {
        self.variance_events.len()
    }
}

#[async_trait]
impl ReplenishmentStore for InMemoryStore {
    async fn find_stats(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ConsumptionStats>, ServiceError> {
        Ok(self
            .stats
            .get(&(customer_id, product_id))
            .map(|entry| entry.value().clone()))
    }

    async fn save_stats(&self, stats: &ConsumptionStats) -> Result<(), ServiceError> {
        self.stats
            .insert((stats.customer_id, stats.product_id), stats.clone());
        Ok(())
    }

    async fn list_stats(&self, customer_id: Uuid) -> Result<Vec<ConsumptionStats>, ServiceError> {
        let mut stats: Vec<ConsumptionStats> = self
            .stats
            .iter()
            .filter(|entry| entry.key().0 == customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        stats.sort_by_key(|s| s.product_id);
        Ok(stats)
    }

    async fn insert_variance_event_if_absent(
        &self,
        event: VarianceEvent,
    ) -> Result<(VarianceEvent, bool), ServiceError> {
        // The entry guard holds the shard lock, so check and insert are one step.
        match self.variance_events.entry(event.key()) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                self.variance_keys.insert(event.id, event.key());
                slot.insert(event.clone());
                Ok((event, true))
            }
        }
    }

    async fn find_variance_event(&self, id: Uuid) -> Result<Option<VarianceEvent>, ServiceError> {
        let Some(key) = self.variance_keys.get(&id).map(|k| *k.value()) else {
            return Ok(None);
        };
        Ok(self
            .variance_events
            .get(&key)
            .map(|entry| entry.value().clone()))
    }

    async fn update_variance_event(&self, event: &VarianceEvent) -> Result<(), ServiceError> {
        match self.variance_events.get_mut(&event.key()) {
            Some(mut stored) if stored.id == event.id => {
                *stored = event.clone();
                Ok(())
            }
            _ => Err(ServiceError::NotFound(format!(
                "variance event {} not found",
                event.id
            ))),
        }
    }

    async fn list_variance_events(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<VarianceEvent>, ServiceError> {
        let mut events: Vec<VarianceEvent> = self
            .variance_events
            .iter()
            .filter(|entry| entry.value().customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn replace_draft(&self, draft: &SystemDraft) -> Result<(), ServiceError> {
        self.drafts.insert(draft.customer_id, draft.clone());
        Ok(())
    }

    async fn find_draft(&self, customer_id: Uuid) -> Result<Option<SystemDraft>, ServiceError> {
        Ok(self
            .drafts
            .get(&customer_id)
            .map(|entry| entry.value().clone()))
    }

    async fn save_working_copy(&self, copy: &WorkingCopy) -> Result<(), ServiceError> {
        self.working_copies.insert(copy.customer_id, copy.clone());
        Ok(())
    }

    async fn find_working_copy(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<WorkingCopy>, ServiceError> {
        Ok(self
            .working_copies
            .get(&customer_id)
            .map(|entry| entry.value().clone()))
    }

    async fn invalidate_working_copy(
        &self,
        customer_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .working_copies
            .get_mut(&customer_id)
            .map(|mut copy| copy.invalidate(at))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        TriggerType, VarianceDirection, VarianceSeverity, VarianceStatus, VarianceTrigger,
    };

    fn variance(customer_id: Uuid, product_id: Uuid, ref_id: Uuid) -> VarianceEvent {
        VarianceEvent {
            id: Uuid::new_v4(),
            customer_id,
            product_id,
            detected_at: Utc::now(),
            trigger: VarianceTrigger {
                trigger_type: TriggerType::StockDeclSpike,
                ref_id,
            },
            change_ratio: 2.6,
            direction: VarianceDirection::Increase,
            severity: VarianceSeverity::Major,
            status: VarianceStatus::NeedsReason,
            reason_code: None,
            reason_note: None,
            customer_action_at: None,
        }
    }

    #[tokio::test]
    async fn concurrent_inserts_of_same_key_create_one_record() {
        let store = InMemoryStore::new();
        let (customer, product, decl) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .insert_variance_event_if_absent(variance(customer, product, decl))
                    .await
                    .unwrap()
            }));
        }

        let mut created = 0;
        let mut ids = Vec::new();
        for task in tasks {
            let (event, was_created) = task.await.unwrap();
            if was_created {
                created += 1;
            }
            ids.push(event.id);
        }

        assert_eq!(created, 1);
        assert_eq!(store.variance_event_count(), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn invalidating_missing_or_deleted_copy_is_a_no_op() {
        let store = InMemoryStore::new();
        let customer = Uuid::new_v4();
        let now = Utc::now();
        assert!(!store.invalidate_working_copy(customer, now).await.unwrap());

        store
            .save_working_copy(&WorkingCopy::active(customer, serde_json::json!({}), now))
            .await
            .unwrap();
        assert!(store.invalidate_working_copy(customer, now).await.unwrap());
        assert!(!store.invalidate_working_copy(customer, now).await.unwrap());
    }
}
