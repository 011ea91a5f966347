//! Consumption statistics engine.
//!
//! Turns accepted deliveries and stock declarations into per customer x
//! product consumption rates and flags declarations that show depletion well
//! above the established rate.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::models::{
    ConsumptionStats, DeclarationItem, DeclarationRef, Delivery, DeliveryItem, DeliveryRef,
    Spike, SpikeEvent, StockDeclaration,
};
use crate::repositories::ReplenishmentStore;
use crate::schedule::elapsed_days;

/// Depletion implied by a declaration relative to the last delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Never negative; a declared increase counts as zero consumption.
    pub consumed: f64,
    pub window_days: i64,
    pub daily: f64,
}

pub fn observe_consumption(
    last_delivery: &DeliveryRef,
    declared_qty: f64,
    declared_at: DateTime<Utc>,
) -> Observation {
    let window_days = elapsed_days(last_delivery.at, declared_at);
    let consumed = (last_delivery.qty - declared_qty).max(0.0);
    Observation {
        consumed,
        window_days,
        daily: consumed / window_days as f64,
    }
}

/// Folds one accepted delivery line into the stats of its product.
pub fn apply_delivery_item(
    existing: Option<ConsumptionStats>,
    customer_id: Uuid,
    delivery_id: Uuid,
    item: &DeliveryItem,
    accepted_at: DateTime<Utc>,
) -> ConsumptionStats {
    let delivered = DeliveryRef {
        delivery_id,
        qty: item.qty,
        at: accepted_at,
    };

    let Some(mut stats) = existing else {
        let mut stats = ConsumptionStats::new(customer_id, item.product_id, accepted_at);
        stats.base.last_delivery = Some(delivered);
        return stats;
    };

    // Already folded in; a retried event must not measure a delivery against itself.
    if stats
        .base
        .last_delivery
        .as_ref()
        .is_some_and(|last| last.delivery_id == delivery_id)
    {
        return stats;
    }

    // The previous delivery is assumed fully consumed by the time this one lands.
    if let Some(prior) = stats.base.last_delivery.take() {
        let elapsed = elapsed_days(prior.at, accepted_at);
        stats.base.daily_avg = prior.qty / elapsed as f64;
        stats.base.prev_delivery = Some(prior);
    }
    stats.base.last_delivery = Some(delivered);
    stats.spike = None;
    stats.updated_at = accepted_at;
    stats
}

/// Folds one declaration line into the stats of its product, returning the
/// spike it raised, if any.
pub fn apply_declaration_item(
    existing: Option<ConsumptionStats>,
    customer_id: Uuid,
    stock_decl_id: Uuid,
    item: &DeclarationItem,
    declared_at: DateTime<Utc>,
    config: &EngineConfig,
) -> (ConsumptionStats, Option<SpikeEvent>) {
    let declared = DeclarationRef {
        stock_decl_id,
        qty: item.qty,
        at: declared_at,
    };

    let Some(mut stats) = existing else {
        let mut stats = ConsumptionStats::new(customer_id, item.product_id, declared_at);
        stats.stock.last_decl = Some(declared);
        return (stats, None);
    };

    stats.stock.last_decl = Some(declared);
    stats.updated_at = declared_at;

    let base_avg = stats.base.daily_avg;
    let Some(last_delivery) = stats.base.last_delivery.as_ref() else {
        return (stats, None);
    };
    if base_avg <= 0.0 {
        return (stats, None);
    }

    let observation = observe_consumption(last_delivery, item.qty, declared_at);
    let ratio = observation.daily / base_avg.max(config.epsilon);
    if ratio < config.spike_ratio_threshold {
        // Below threshold leaves any earlier spike in place.
        return (stats, None);
    }

    stats.spike = Some(Spike {
        active: true,
        daily_avg: observation.daily,
        ratio,
        consumed: observation.consumed,
        window_days: observation.window_days,
        detected_at: declared_at,
        source_stock_decl_id: stock_decl_id,
    });
    let spike = SpikeEvent {
        customer_id,
        product_id: item.product_id,
        stock_decl_id,
        ratio,
        observed_daily: observation.daily,
        base_avg,
    };
    (stats, Some(spike))
}

/// Applies inbound events to the stats store. Each product line is a
/// read-transform-write under a lock keyed by `(customer, product)`.
pub struct ConsumptionEngine {
    store: Arc<dyn ReplenishmentStore>,
    config: EngineConfig,
    locks: DashMap<(Uuid, Uuid), Arc<Mutex<()>>>,
}

impl ConsumptionEngine {
    pub fn new(store: Arc<dyn ReplenishmentStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, customer_id: Uuid, product_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry((customer_id, product_id))
            .or_default()
            .clone()
    }

    /// Updates stats for every line of an accepted delivery. The delivery is
    /// validated as a whole before anything is written.
    #[instrument(skip(self, delivery), fields(customer_id = %customer_id, delivery_id = %delivery.id))]
    pub async fn apply_delivery_accepted(
        &self,
        customer_id: Uuid,
        delivery: &Delivery,
        accepted_at: DateTime<Utc>,
    ) -> Result<Vec<ConsumptionStats>, ServiceError> {
        delivery.validate()?;

        let mut updated = Vec::with_capacity(delivery.items.len());
        for item in &delivery.items {
            let lock = self.lock_for(customer_id, item.product_id);
            let _guard = lock.lock().await;

            let existing = self.store.find_stats(customer_id, item.product_id).await?;
            let stats = apply_delivery_item(existing, customer_id, delivery.id, item, accepted_at);
            self.store.save_stats(&stats).await?;

            debug!(
                product_id = %item.product_id,
                daily_avg = stats.base.daily_avg,
                "Applied delivery line"
            );
            updated.push(stats);
        }

        counter!("replenish.stats.updated", updated.len() as u64);
        info!(products = updated.len(), "Consumption stats updated from delivery");
        Ok(updated)
    }

    /// Updates stats for every line of a declaration and returns the spikes
    /// it raised.
    #[instrument(skip(self, declaration), fields(customer_id = %customer_id, stock_decl_id = %declaration.id))]
    pub async fn apply_stock_declaration(
        &self,
        customer_id: Uuid,
        declaration: &StockDeclaration,
    ) -> Result<(Vec<ConsumptionStats>, Vec<SpikeEvent>), ServiceError> {
        declaration.validate()?;

        let mut updated = Vec::with_capacity(declaration.items.len());
        let mut spikes = Vec::new();
        for item in &declaration.items {
            let lock = self.lock_for(customer_id, item.product_id);
            let _guard = lock.lock().await;

            let existing = self.store.find_stats(customer_id, item.product_id).await?;
            let (stats, spike) = apply_declaration_item(
                existing,
                customer_id,
                declaration.id,
                item,
                declaration.declared_at,
                &self.config,
            );
            self.store.save_stats(&stats).await?;

            if let Some(spike) = spike {
                info!(
                    product_id = %spike.product_id,
                    ratio = spike.ratio,
                    observed_daily = spike.observed_daily,
                    base_avg = spike.base_avg,
                    "Consumption spike detected"
                );
                spikes.push(spike);
            }
            updated.push(stats);
        }

        counter!("replenish.stats.updated", updated.len() as u64);
        if !spikes.is_empty() {
            counter!("replenish.spikes.detected", spikes.len() as u64);
        }
        Ok((updated, spikes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AcceptanceState, DeliveryItem};
    use crate::repositories::InMemoryStore;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap() + Duration::days(n)
    }

    fn accepted(customer_id: Uuid, items: Vec<DeliveryItem>, at: DateTime<Utc>) -> Delivery {
        let mut delivery = Delivery::new(customer_id, items, at);
        delivery.acceptance = AcceptanceState::Accepted { at };
        delivery
    }

    fn engine() -> (ConsumptionEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (
            ConsumptionEngine::new(store.clone(), EngineConfig::default()),
            store,
        )
    }

    #[tokio::test]
    async fn second_delivery_sets_daily_average() {
        let (engine, store) = engine();
        let (customer, product) = (Uuid::new_v4(), Uuid::new_v4());

        let first = accepted(customer, vec![DeliveryItem::new(product, 60.0)], day(0));
        let stats = engine
            .apply_delivery_accepted(customer, &first, day(0))
            .await
            .unwrap();
        assert_eq!(stats[0].base.daily_avg, 0.0);
        assert!(stats[0].base.prev_delivery.is_none());

        let second = accepted(customer, vec![DeliveryItem::new(product, 45.0)], day(3));
        engine
            .apply_delivery_accepted(customer, &second, day(3))
            .await
            .unwrap();

        let stats = store.find_stats(customer, product).await.unwrap().unwrap();
        assert_eq!(stats.base.daily_avg, 20.0);
        assert_eq!(stats.base.prev_delivery.unwrap().delivery_id, first.id);
        assert_eq!(stats.base.last_delivery.unwrap().qty, 45.0);
    }

    #[tokio::test]
    async fn declaration_far_above_baseline_raises_spike() {
        let (engine, store) = engine();
        let (customer, product) = (Uuid::new_v4(), Uuid::new_v4());

        let mut stats = ConsumptionStats::new(customer, product, day(0));
        stats.base.daily_avg = 5.0;
        stats.base.last_delivery = Some(DeliveryRef {
            delivery_id: Uuid::new_v4(),
            qty: 100.0,
            at: day(0),
        });
        store.save_stats(&stats).await.unwrap();

        let declaration =
            StockDeclaration::new(customer, vec![DeclarationItem::new(product, 10.0)], day(5));
        let (updated, spikes) = engine
            .apply_stock_declaration(customer, &declaration)
            .await
            .unwrap();

        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].observed_daily, 18.0);
        assert!((spikes[0].ratio - 3.6).abs() < 1e-9);
        assert_eq!(spikes[0].base_avg, 5.0);

        let spike = updated[0].spike.as_ref().unwrap();
        assert!(spike.active);
        assert_eq!(spike.consumed, 90.0);
        assert_eq!(spike.window_days, 5);
        assert_eq!(spike.source_stock_decl_id, declaration.id);
    }

    #[tokio::test]
    async fn first_declaration_creates_stats_without_spike_logic() {
        let (engine, _store) = engine();
        let (customer, product) = (Uuid::new_v4(), Uuid::new_v4());

        let declaration =
            StockDeclaration::new(customer, vec![DeclarationItem::new(product, 0.0)], day(1));
        let (updated, spikes) = engine
            .apply_stock_declaration(customer, &declaration)
            .await
            .unwrap();

        assert!(spikes.is_empty());
        assert_eq!(updated[0].base.daily_avg, 0.0);
        assert!(updated[0].base.last_delivery.is_none());
        assert_eq!(updated[0].stock.last_decl.as_ref().unwrap().qty, 0.0);
    }

    #[test]
    fn quiet_declaration_keeps_existing_spike() {
        let (customer, product) = (Uuid::new_v4(), Uuid::new_v4());
        let config = EngineConfig::default();

        let mut stats = ConsumptionStats::new(customer, product, day(0));
        stats.base.daily_avg = 5.0;
        stats.base.last_delivery = Some(DeliveryRef {
            delivery_id: Uuid::new_v4(),
            qty: 100.0,
            at: day(0),
        });

        let (stats, spike) = apply_declaration_item(
            Some(stats),
            customer,
            Uuid::new_v4(),
            &DeclarationItem::new(product, 10.0),
            day(5),
            &config,
        );
        assert!(spike.is_some());
        let spike_before = stats.spike.clone();

        let (stats, spike) = apply_declaration_item(
            Some(stats),
            customer,
            Uuid::new_v4(),
            &DeclarationItem::new(product, 95.0),
            day(6),
            &config,
        );
        assert!(spike.is_none());
        assert_eq!(stats.spike, spike_before);
        assert_eq!(stats.stock.last_decl.unwrap().qty, 95.0);
    }

    #[test]
    fn new_delivery_clears_spike() {
        let (customer, product) = (Uuid::new_v4(), Uuid::new_v4());
        let mut stats = ConsumptionStats::new(customer, product, day(0));
        stats.base.last_delivery = Some(DeliveryRef {
            delivery_id: Uuid::new_v4(),
            qty: 30.0,
            at: day(0),
        });
        stats.spike = Some(Spike {
            active: true,
            daily_avg: 12.0,
            ratio: 4.0,
            consumed: 24.0,
            window_days: 2,
            detected_at: day(2),
            source_stock_decl_id: Uuid::new_v4(),
        });

        let stats = apply_delivery_item(
            Some(stats),
            customer,
            Uuid::new_v4(),
            &DeliveryItem::new(product, 30.0),
            day(4),
        );
        assert!(stats.spike.is_none());
        assert_eq!(stats.base.daily_avg, 7.5);
    }

    #[test]
    fn same_delivery_applied_twice_changes_nothing() {
        let (customer, product) = (Uuid::new_v4(), Uuid::new_v4());
        let delivery_id = Uuid::new_v4();
        let mut stats = ConsumptionStats::new(customer, product, day(0));
        stats.base.daily_avg = 20.0;
        stats.base.prev_delivery = Some(DeliveryRef {
            delivery_id: Uuid::new_v4(),
            qty: 60.0,
            at: day(0),
        });
        stats.base.last_delivery = Some(DeliveryRef {
            delivery_id,
            qty: 30.0,
            at: day(3),
        });
        stats.spike = Some(Spike {
            active: true,
            daily_avg: 9.0,
            ratio: 4.5,
            consumed: 27.0,
            window_days: 3,
            detected_at: day(6),
            source_stock_decl_id: Uuid::new_v4(),
        });

        let replayed = apply_delivery_item(
            Some(stats.clone()),
            customer,
            delivery_id,
            &DeliveryItem::new(product, 30.0),
            day(3),
        );
        assert_eq!(replayed, stats);
    }

    #[tokio::test]
    async fn retried_multi_item_delivery_keeps_rates() {
        let (engine, store) = engine();
        let customer = Uuid::new_v4();
        let (milk, eggs) = (Uuid::new_v4(), Uuid::new_v4());

        let first = accepted(
            customer,
            vec![DeliveryItem::new(milk, 60.0), DeliveryItem::new(eggs, 30.0)],
            day(0),
        );
        engine
            .apply_delivery_accepted(customer, &first, day(0))
            .await
            .unwrap();
        let second = accepted(
            customer,
            vec![DeliveryItem::new(milk, 40.0), DeliveryItem::new(eggs, 12.0)],
            day(3),
        );
        engine
            .apply_delivery_accepted(customer, &second, day(3))
            .await
            .unwrap();
        let before = store.list_stats(customer).await.unwrap();

        engine
            .apply_delivery_accepted(customer, &second, day(3))
            .await
            .unwrap();

        let after = store.list_stats(customer).await.unwrap();
        assert_eq!(after, before);
        let milk_stats = store.find_stats(customer, milk).await.unwrap().unwrap();
        assert_eq!(milk_stats.base.daily_avg, 20.0);
        assert_eq!(milk_stats.base.prev_delivery.unwrap().delivery_id, first.id);
    }

    #[test]
    fn declared_increase_counts_as_zero_consumption() {
        let last = DeliveryRef {
            delivery_id: Uuid::new_v4(),
            qty: 20.0,
            at: day(0),
        };
        let observation = observe_consumption(&last, 35.0, day(2));
        assert_eq!(observation.consumed, 0.0);
        assert_eq!(observation.daily, 0.0);
        assert_eq!(observation.window_days, 2);
    }

    #[tokio::test]
    async fn malformed_delivery_is_rejected_before_any_write() {
        let (engine, store) = engine();
        let (customer, product) = (Uuid::new_v4(), Uuid::new_v4());

        let delivery = accepted(
            customer,
            vec![
                DeliveryItem::new(product, 10.0),
                DeliveryItem::new(Uuid::new_v4(), 0.0),
            ],
            day(0),
        );
        let result = engine
            .apply_delivery_accepted(customer, &delivery, day(0))
            .await;

        assert_matches!(result, Err(ServiceError::ValidationError(_)));
        assert!(store.find_stats(customer, product).await.unwrap().is_none());
    }
}
