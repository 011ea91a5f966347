//! Draft generator.
//!
//! Rebuilds a customer's replenishment draft from the current consumption
//! stats. Every recompute produces a complete new item list which replaces
//! the stored draft in one write.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::models::{AvgType, ConsumptionStats, DraftItem, Product, RoutePlan, SystemDraft};
use crate::repositories::{ReferenceData, ReplenishmentStore};
use crate::schedule;
use crate::services::clock::Clock;

/// Consumption rate a draft item is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AvgSource {
    Base(f64),
    Spike(f64),
}

impl AvgSource {
    /// A spike drives the forecast for `spike_recency_days` after detection,
    /// then the baseline takes over again.
    pub fn resolve(stats: &ConsumptionStats, now: DateTime<Utc>, config: &EngineConfig) -> Self {
        let window = Duration::days(config.spike_recency_days);
        match stats.active_spike() {
            Some(spike) if now - spike.detected_at <= window => AvgSource::Spike(spike.daily_avg),
            _ => AvgSource::Base(stats.base.daily_avg),
        }
    }

    pub fn daily_avg(&self) -> f64 {
        match *self {
            AvgSource::Base(avg) | AvgSource::Spike(avg) => avg,
        }
    }

    pub fn avg_type(&self) -> AvgType {
        match self {
            AvgSource::Base(_) => AvgType::Base,
            AvgSource::Spike(_) => AvgType::Spike,
        }
    }
}

/// Builds the unranked draft line for one product.
pub fn build_item(
    stats: &ConsumptionStats,
    product: Option<&Product>,
    next_route_days: i64,
    now: DateTime<Utc>,
    config: &EngineConfig,
    changed: bool,
) -> DraftItem {
    let source = AvgSource::resolve(stats, now, config);
    let avg = source.daily_avg();
    let measurable = avg > config.epsilon;
    let (effective_stock, stock_source) = stats.effective_stock();

    let days_to_zero = if measurable {
        effective_stock / avg
    } else {
        config.no_consumption_days
    };
    let risk_score = next_route_days as f64 - days_to_zero;
    // Halves round to even: 2.5 -> 2, 3.5 -> 4.
    let suggested_qty = if measurable {
        (avg * next_route_days as f64).round_ties_even() as i64
    } else {
        0
    };

    let shelf_life_days = product.and_then(|p| p.shelf_life_days);
    // Days of supply in the suggestion against how long the product keeps.
    let skt_risk = match shelf_life_days {
        Some(days) if suggested_qty > 0 => suggested_qty as f64 / avg > f64::from(days),
        _ => false,
    };

    DraftItem {
        product_id: stats.product_id,
        product_name: product.map(|p| p.name.clone()),
        priority_rank: 0,
        avg_type: source.avg_type(),
        avg_effective: avg,
        base_daily_avg: stats.base.daily_avg,
        effective_stock,
        stock_source,
        days_to_zero,
        estimated_finish_at: schedule::add_days(now, days_to_zero),
        risk_score,
        suggested_qty,
        skt_risk,
        shelf_life_days,
        changed,
    }
}

/// Orders items by ascending `(risk_score, estimated_finish_at, product_id)`
/// and assigns ranks from 1. Items without measurable consumption form a
/// last tier of their own.
pub fn rank_items(items: &mut [DraftItem], epsilon: f64) {
    items.sort_by(|a, b| {
        let unbounded = |item: &DraftItem| item.avg_effective <= epsilon;
        unbounded(a)
            .cmp(&unbounded(b))
            .then_with(|| a.risk_score.partial_cmp(&b.risk_score).unwrap_or(Ordering::Equal))
            .then_with(|| a.estimated_finish_at.cmp(&b.estimated_finish_at))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    for (index, item) in items.iter_mut().enumerate() {
        item.priority_rank = index as u32 + 1;
    }
}

pub struct DraftGenerator {
    store: Arc<dyn ReplenishmentStore>,
    reference: Arc<dyn ReferenceData>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl DraftGenerator {
    pub fn new(
        store: Arc<dyn ReplenishmentStore>,
        reference: Arc<dyn ReferenceData>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            reference,
            clock,
            config,
        }
    }

    async fn route_for(&self, customer_id: Uuid) -> Result<RoutePlan, ServiceError> {
        match self.reference.customer(customer_id).await? {
            Some(customer) => Ok(customer.route),
            None => {
                warn!(customer_id = %customer_id, "Unknown customer, using default lookahead");
                Ok(RoutePlan::default())
            }
        }
    }

    // Catalog trouble only costs the shelf-life flag and the display name.
    async fn product_for(&self, product_id: Uuid) -> Option<Product> {
        match self.reference.product(product_id).await {
            Ok(product) => product,
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Product lookup failed");
                None
            }
        }
    }

    /// Recomputes and stores the customer's draft.
    #[instrument(skip(self, changed_product_ids), fields(customer_id = %customer_id, trigger = %trigger))]
    pub async fn recompute_draft(
        &self,
        customer_id: Uuid,
        changed_product_ids: &[Uuid],
        trigger: &str,
    ) -> Result<SystemDraft, ServiceError> {
        let now = self.clock.now();
        let next_route_days = self
            .route_for(customer_id)
            .await?
            .lookahead_days(now.date_naive());
        let changed: HashSet<Uuid> = changed_product_ids.iter().copied().collect();

        let stats = self.store.list_stats(customer_id).await?;
        let products = join_all(stats.iter().map(|s| self.product_for(s.product_id))).await;
        let mut items: Vec<DraftItem> = stats
            .iter()
            .zip(products.iter())
            .map(|(record, product)| {
                build_item(
                    record,
                    product.as_ref(),
                    next_route_days,
                    now,
                    &self.config,
                    changed.contains(&record.product_id),
                )
            })
            .collect();
        rank_items(&mut items, self.config.epsilon);

        let draft = SystemDraft {
            customer_id,
            generated_from: trigger.to_string(),
            next_route_days,
            items,
            updated_at: now,
        };
        self.store.replace_draft(&draft).await?;

        counter!("replenish.drafts.recomputed", 1);
        histogram!("replenish.draft.items", draft.items.len() as f64);
        info!(
            items = draft.items.len(),
            next_route_days,
            "Draft recomputed"
        );
        Ok(draft)
    }
}
