use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    ConsumptionStats, Customer, Product, SystemDraft, VarianceEvent, WorkingCopy,
};

pub mod in_memory;
pub mod reference;
pub mod sea_orm_store;

pub use in_memory::InMemoryStore;
pub use reference::InMemoryReferenceData;
pub use sea_orm_store::SeaOrmStore;

/// Persistence for everything the engine owns.
///
/// Implementations must make `insert_variance_event_if_absent` a single
/// atomic operation against the shared store.
#[async_trait]
pub trait ReplenishmentStore: Send + Sync {
    async fn find_stats(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ConsumptionStats>, ServiceError>;

    async fn save_stats(&self, stats: &ConsumptionStats) -> Result<(), ServiceError>;

    /// All stats of a customer ordered by product id.
    async fn list_stats(&self, customer_id: Uuid) -> Result<Vec<ConsumptionStats>, ServiceError>;

    /// Returns the stored record and whether this call created it.
    async fn insert_variance_event_if_absent(
        &self,
        event: VarianceEvent,
    ) -> Result<(VarianceEvent, bool), ServiceError>;

    async fn find_variance_event(&self, id: Uuid) -> Result<Option<VarianceEvent>, ServiceError>;

    async fn update_variance_event(&self, event: &VarianceEvent) -> Result<(), ServiceError>;

    /// Variance events of a customer ordered by detection time.
    async fn list_variance_events(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<VarianceEvent>, ServiceError>;

    async fn replace_draft(&self, draft: &SystemDraft) -> Result<(), ServiceError>;

    async fn find_draft(&self, customer_id: Uuid) -> Result<Option<SystemDraft>, ServiceError>;

    async fn save_working_copy(&self, copy: &WorkingCopy) -> Result<(), ServiceError>;

    async fn find_working_copy(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<WorkingCopy>, ServiceError>;

    /// Marks an active working copy `deleted_by_delivery`. Returns whether a
    /// copy changed state.
    async fn invalidate_working_copy(
        &self,
        customer_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;
}

/// Read-only catalog and customer lookups owned by the surrounding
/// application.
#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn customer(&self, customer_id: Uuid) -> Result<Option<Customer>, ServiceError>;

    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, ServiceError>;
}
