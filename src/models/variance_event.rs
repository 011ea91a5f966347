use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerType {
    StockDeclSpike,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VarianceDirection {
    Increase,
    Decrease,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VarianceSeverity {
    Minor,
    Major,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VarianceStatus {
    NeedsReason,
    Explained,
    Dismissed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarianceTrigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub ref_id: Uuid,
}

/// Uniqueness key: at most one variance event per trigger and product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarianceKey {
    pub trigger_type: TriggerType,
    pub ref_id: Uuid,
    pub product_id: Uuid,
}

/// Anomaly record queued for human disposition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarianceEvent {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub trigger: VarianceTrigger,
    pub change_ratio: f64,
    pub direction: VarianceDirection,
    pub severity: VarianceSeverity,
    pub status: VarianceStatus,
    pub reason_code: Option<String>,
    pub reason_note: Option<String>,
    pub customer_action_at: Option<DateTime<Utc>>,
}

impl VarianceEvent {
    pub fn key(&self) -> VarianceKey {
        VarianceKey {
            trigger_type: self.trigger.trigger_type,
            ref_id: self.trigger.ref_id,
            product_id: self.product_id,
        }
    }

    pub fn needs_reason(&self) -> bool {
        self.status == VarianceStatus::NeedsReason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn enums_round_trip_through_strings() {
        assert_eq!(TriggerType::StockDeclSpike.to_string(), "stock_decl_spike");
        assert_eq!(VarianceStatus::NeedsReason.as_ref(), "needs_reason");
        assert_eq!(
            VarianceSeverity::from_str("major").unwrap(),
            VarianceSeverity::Major
        );
    }
}
