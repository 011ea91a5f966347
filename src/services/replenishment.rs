//! Replenishment pipeline.
//!
//! Sequences the engine, the variance tracker and the draft generator for
//! each inbound event:
//! delivery accepted -> stats updated -> draft recomputed -> working copy invalidated.

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventHandler, EventSender};
use crate::models::{
    ConsumptionStats, Delivery, SpikeEvent, StockDeclaration, SystemDraft,
    TRIGGER_DELIVERY_ACCEPTED, TRIGGER_STOCK_DECLARED,
};
use crate::repositories::{ReferenceData, ReplenishmentStore};
use crate::services::clock::Clock;
use crate::services::consumption::ConsumptionEngine;
use crate::services::draft::DraftGenerator;
use crate::services::variance::VarianceTracker;

pub struct ReplenishmentService {
    store: Arc<dyn ReplenishmentStore>,
    clock: Arc<dyn Clock>,
    consumption: ConsumptionEngine,
    variance: VarianceTracker,
    drafts: DraftGenerator,
    event_sender: Option<EventSender>,
}

impl ReplenishmentService {
    pub fn new(
        store: Arc<dyn ReplenishmentStore>,
        reference: Arc<dyn ReferenceData>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            consumption: ConsumptionEngine::new(store.clone(), config.clone()),
            variance: VarianceTracker::new(store.clone(), clock.clone()),
            drafts: DraftGenerator::new(store.clone(), reference, clock.clone(), config),
            store,
            clock,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn store(&self) -> &Arc<dyn ReplenishmentStore> {
        &self.store
    }

    pub fn variance(&self) -> &VarianceTracker {
        &self.variance
    }

    fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.publish(event);
        }
    }

    /// Applies an accepted delivery, recomputes the draft and then retires
    /// the customer's working copy.
    #[instrument(skip(self, delivery), fields(customer_id = %customer_id, delivery_id = %delivery.id))]
    pub async fn apply_delivery_accepted(
        &self,
        customer_id: Uuid,
        delivery: &Delivery,
    ) -> Result<Vec<ConsumptionStats>, ServiceError> {
        let accepted_at = delivery.accepted_at().ok_or_else(|| {
            ServiceError::InvalidStatus(format!(
                "delivery {} is {}, only accepted deliveries update consumption",
                delivery.id,
                delivery.acceptance.as_str()
            ))
        })?;
        ensure_same_customer(customer_id, delivery.customer_id, "delivery", delivery.id)?;

        let stats = self
            .consumption
            .apply_delivery_accepted(customer_id, delivery, accepted_at)
            .await?;
        let product_ids = delivery.product_ids();
        self.publish(Event::StatsUpdated {
            customer_id,
            product_ids: product_ids.clone(),
            trigger: TRIGGER_DELIVERY_ACCEPTED.to_string(),
        });

        self.recompute_draft(customer_id, &product_ids, TRIGGER_DELIVERY_ACCEPTED)
            .await?;

        let at = self.clock.now();
        if self.store.invalidate_working_copy(customer_id, at).await? {
            counter!("replenish.working_copies.invalidated", 1);
            info!("Working copy invalidated by accepted delivery");
            self.publish(Event::WorkingCopyInvalidated { customer_id, at });
        }

        Ok(stats)
    }

    /// Applies a stock declaration, records a variance event per spike and
    /// recomputes the draft.
    #[instrument(skip(self, declaration), fields(customer_id = %customer_id, stock_decl_id = %declaration.id))]
    pub async fn apply_stock_declaration(
        &self,
        customer_id: Uuid,
        declaration: &StockDeclaration,
    ) -> Result<(Vec<ConsumptionStats>, Vec<SpikeEvent>), ServiceError> {
        ensure_same_customer(
            customer_id,
            declaration.customer_id,
            "stock declaration",
            declaration.id,
        )?;

        let (stats, spikes) = self
            .consumption
            .apply_stock_declaration(customer_id, declaration)
            .await?;
        let product_ids = declaration.product_ids();
        self.publish(Event::StatsUpdated {
            customer_id,
            product_ids: product_ids.clone(),
            trigger: TRIGGER_STOCK_DECLARED.to_string(),
        });

        for spike in &spikes {
            self.publish(Event::SpikeDetected {
                customer_id,
                product_id: spike.product_id,
                stock_decl_id: spike.stock_decl_id,
                ratio: spike.ratio,
            });
            let (variance_event, created) = self.variance.record_spike(spike).await?;
            self.publish(Event::VarianceEventRecorded {
                variance_event_id: variance_event.id,
                customer_id,
                product_id: variance_event.product_id,
                created,
            });
        }

        self.recompute_draft(customer_id, &product_ids, TRIGGER_STOCK_DECLARED)
            .await?;
        Ok((stats, spikes))
    }

    pub async fn recompute_draft(
        &self,
        customer_id: Uuid,
        changed_product_ids: &[Uuid],
        trigger: &str,
    ) -> Result<SystemDraft, ServiceError> {
        let draft = self
            .drafts
            .recompute_draft(customer_id, changed_product_ids, trigger)
            .await?;
        self.publish(Event::DraftRecomputed {
            customer_id,
            generated_from: draft.generated_from.clone(),
            item_count: draft.items.len(),
            updated_at: draft.updated_at,
        });
        Ok(draft)
    }

    /// Runs one inbound event through the pipeline. Outbound events are
    /// ignored.
    pub async fn apply(&self, event: Event) -> Result<(), ServiceError> {
        match event {
            Event::DeliveryAccepted {
                customer_id,
                delivery,
            } => self
                .apply_delivery_accepted(customer_id, &delivery)
                .await
                .map(|_| ()),
            Event::StockDeclared {
                customer_id,
                declaration,
            } => self
                .apply_stock_declaration(customer_id, &declaration)
                .await
                .map(|_| ()),
            Event::DraftRecomputeRequested {
                customer_id,
                changed_product_ids,
                trigger,
            } => self
                .recompute_draft(customer_id, &changed_product_ids, &trigger)
                .await
                .map(|_| ()),
            other => {
                debug!(event = other.name(), "Ignoring outbound event");
                Ok(())
            }
        }
    }
}

fn ensure_same_customer(
    customer_id: Uuid,
    owner_id: Uuid,
    kind: &str,
    id: Uuid,
) -> Result<(), ServiceError> {
    if customer_id == owner_id {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "{} {} belongs to customer {}, not {}",
            kind, id, owner_id, customer_id
        )))
    }
}

#[async_trait]
impl EventHandler for ReplenishmentService {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        self.apply(event).await.map_err(|e| e.to_string())
    }
}
