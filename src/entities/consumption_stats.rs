use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{self, BaseStats, DeclarationRef, DeliveryRef, Spike, StockStats};

/// One row per customer x product. Nested domain records are flattened into
/// nullable column groups; a group is present only when all of its columns are.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "consumption_stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: Uuid,
    pub daily_avg: f64,
    pub last_delivery_id: Option<Uuid>,
    pub last_delivery_qty: Option<f64>,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub prev_delivery_id: Option<Uuid>,
    pub prev_delivery_qty: Option<f64>,
    pub prev_delivery_at: Option<DateTime<Utc>>,
    pub last_decl_id: Option<Uuid>,
    pub last_decl_qty: Option<f64>,
    pub last_decl_at: Option<DateTime<Utc>>,
    pub spike_active: Option<bool>,
    pub spike_daily_avg: Option<f64>,
    pub spike_ratio: Option<f64>,
    pub spike_consumed: Option<f64>,
    pub spike_window_days: Option<i64>,
    pub spike_detected_at: Option<DateTime<Utc>>,
    pub spike_source_decl_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn delivery_ref(
    id: Option<Uuid>,
    qty: Option<f64>,
    at: Option<DateTime<Utc>>,
) -> Option<DeliveryRef> {
    Some(DeliveryRef {
        delivery_id: id?,
        qty: qty?,
        at: at?,
    })
}

impl From<Model> for models::ConsumptionStats {
    fn from(model: Model) -> Self {
        let last_decl = match (model.last_decl_id, model.last_decl_qty, model.last_decl_at) {
            (Some(stock_decl_id), Some(qty), Some(at)) => Some(DeclarationRef {
                stock_decl_id,
                qty,
                at,
            }),
            _ => None,
        };

        let spike = match (
            model.spike_active,
            model.spike_daily_avg,
            model.spike_ratio,
            model.spike_consumed,
            model.spike_window_days,
            model.spike_detected_at,
            model.spike_source_decl_id,
        ) {
            (
                Some(active),
                Some(daily_avg),
                Some(ratio),
                Some(consumed),
                Some(window_days),
                Some(detected_at),
                Some(source_stock_decl_id),
            ) => Some(Spike {
                active,
                daily_avg,
                ratio,
                consumed,
                window_days: window_days.max(1),
                detected_at,
                source_stock_decl_id,
            }),
            _ => None,
        };

        Self {
            customer_id: model.customer_id,
            product_id: model.product_id,
            base: BaseStats {
                daily_avg: model.daily_avg.max(0.0),
                last_delivery: delivery_ref(
                    model.last_delivery_id,
                    model.last_delivery_qty,
                    model.last_delivery_at,
                ),
                prev_delivery: delivery_ref(
                    model.prev_delivery_id,
                    model.prev_delivery_qty,
                    model.prev_delivery_at,
                ),
            },
            stock: StockStats { last_decl },
            spike,
            updated_at: model.updated_at,
        }
    }
}

impl From<&models::ConsumptionStats> for ActiveModel {
    fn from(stats: &models::ConsumptionStats) -> Self {
        let last = stats.base.last_delivery.as_ref();
        let prev = stats.base.prev_delivery.as_ref();
        let decl = stats.stock.last_decl.as_ref();
        let spike = stats.spike.as_ref();

        Self {
            customer_id: Set(stats.customer_id),
            product_id: Set(stats.product_id),
            daily_avg: Set(stats.base.daily_avg),
            last_delivery_id: Set(last.map(|d| d.delivery_id)),
            last_delivery_qty: Set(last.map(|d| d.qty)),
            last_delivery_at: Set(last.map(|d| d.at)),
            prev_delivery_id: Set(prev.map(|d| d.delivery_id)),
            prev_delivery_qty: Set(prev.map(|d| d.qty)),
            prev_delivery_at: Set(prev.map(|d| d.at)),
            last_decl_id: Set(decl.map(|d| d.stock_decl_id)),
            last_decl_qty: Set(decl.map(|d| d.qty)),
            last_decl_at: Set(decl.map(|d| d.at)),
            spike_active: Set(spike.map(|s| s.active)),
            spike_daily_avg: Set(spike.map(|s| s.daily_avg)),
            spike_ratio: Set(spike.map(|s| s.ratio)),
            spike_consumed: Set(spike.map(|s| s.consumed)),
            spike_window_days: Set(spike.map(|s| s.window_days)),
            spike_detected_at: Set(spike.map(|s| s.detected_at)),
            spike_source_decl_id: Set(spike.map(|s| s.source_stock_decl_id)),
            updated_at: Set(stats.updated_at),
        }
    }
}
