use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::consumption_stats::StockSource;

pub const TRIGGER_DELIVERY_ACCEPTED: &str = "delivery_accepted";
pub const TRIGGER_STOCK_DECLARED: &str = "stock_declared";
pub const TRIGGER_MANUAL: &str = "manual";

/// Which consumption rate a draft item was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AvgType {
    Base,
    Spike,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub priority_rank: u32,
    pub avg_type: AvgType,
    pub avg_effective: f64,
    pub base_daily_avg: f64,
    pub effective_stock: f64,
    pub stock_source: StockSource,
    pub days_to_zero: f64,
    pub estimated_finish_at: DateTime<Utc>,
    pub risk_score: f64,
    pub suggested_qty: i64,
    pub skt_risk: bool,
    pub shelf_life_days: Option<u32>,
    /// Product was touched by the event that triggered this recompute.
    pub changed: bool,
}

/// Replenishment proposal for one customer. Replaced wholesale on every
/// recompute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemDraft {
    pub customer_id: Uuid,
    pub generated_from: String,
    pub next_route_days: i64,
    pub items: Vec<DraftItem>,
    pub updated_at: DateTime<Utc>,
}

impl SystemDraft {
    pub fn item(&self, product_id: Uuid) -> Option<&DraftItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
