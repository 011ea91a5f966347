use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Snapshot of one accepted delivery line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRef {
    pub delivery_id: Uuid,
    pub qty: f64,
    pub at: DateTime<Utc>,
}

/// Snapshot of one stock declaration line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeclarationRef {
    pub stock_decl_id: Uuid,
    pub qty: f64,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseStats {
    pub daily_avg: f64,
    pub last_delivery: Option<DeliveryRef>,
    /// Previous `last_delivery`, audit only.
    pub prev_delivery: Option<DeliveryRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StockStats {
    pub last_decl: Option<DeclarationRef>,
}

/// Short-term consumption observed from a stock declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    pub active: bool,
    pub daily_avg: f64,
    pub ratio: f64,
    pub consumed: f64,
    /// Always >= 1.
    pub window_days: i64,
    pub detected_at: DateTime<Utc>,
    pub source_stock_decl_id: Uuid,
}

/// Rolling consumption statistics for one customer x product pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionStats {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub base: BaseStats,
    pub stock: StockStats,
    pub spike: Option<Spike>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockSource {
    Declared,
    Delivered,
    Empty,
}

impl ConsumptionStats {
    pub fn new(customer_id: Uuid, product_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            product_id,
            base: BaseStats::default(),
            stock: StockStats::default(),
            spike: None,
            updated_at: at,
        }
    }

    /// Latest declared quantity, else latest delivered quantity, else zero.
    pub fn effective_stock(&self) -> (f64, StockSource) {
        if let Some(decl) = &self.stock.last_decl {
            return (decl.qty, StockSource::Declared);
        }
        if let Some(delivery) = &self.base.last_delivery {
            return (delivery.qty, StockSource::Delivered);
        }
        (0.0, StockSource::Empty)
    }

    pub fn active_spike(&self) -> Option<&Spike> {
        self.spike.as_ref().filter(|spike| spike.active)
    }
}

/// Emitted by the consumption engine when a declaration crosses the spike
/// threshold. Consumed by the variance tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub stock_decl_id: Uuid,
    pub ratio: f64,
    pub observed_daily: f64,
    pub base_avg: f64,
}
