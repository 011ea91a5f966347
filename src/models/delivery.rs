use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub product_id: Uuid,
    pub qty: f64,
}

impl DeliveryItem {
    pub fn new(product_id: Uuid, qty: f64) -> Self {
        Self { product_id, qty }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AcceptanceState {
    Pending,
    Accepted {
        at: DateTime<Utc>,
    },
    Rejected {
        at: DateTime<Utc>,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl AcceptanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_delivery_items"))]
pub struct Delivery {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "delivery must contain at least one item"))]
    pub items: Vec<DeliveryItem>,
    pub delivered_at: DateTime<Utc>,
    #[serde(default = "pending")]
    pub acceptance: AcceptanceState,
}

fn pending() -> AcceptanceState {
    AcceptanceState::Pending
}

impl Delivery {
    pub fn new(customer_id: Uuid, items: Vec<DeliveryItem>, delivered_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            items,
            delivered_at,
            acceptance: AcceptanceState::Pending,
        }
    }

    /// Pending -> Accepted. Any other starting state is rejected.
    pub fn accept(&mut self, at: DateTime<Utc>) -> Result<(), ServiceError> {
        match self.acceptance {
            AcceptanceState::Pending => {
                self.acceptance = AcceptanceState::Accepted { at };
                Ok(())
            }
            ref other => Err(ServiceError::InvalidStatus(format!(
                "delivery {} is {} and cannot be accepted",
                self.id,
                other.as_str()
            ))),
        }
    }

    /// Pending -> Rejected. Rejection is terminal.
    pub fn reject(&mut self, at: DateTime<Utc>, reason: Option<String>) -> Result<(), ServiceError> {
        match self.acceptance {
            AcceptanceState::Pending => {
                self.acceptance = AcceptanceState::Rejected { at, reason };
                Ok(())
            }
            ref other => Err(ServiceError::InvalidStatus(format!(
                "delivery {} is {} and cannot be rejected",
                self.id,
                other.as_str()
            ))),
        }
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        match self.acceptance {
            AcceptanceState::Accepted { at } => Some(at),
            _ => None,
        }
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|item| item.product_id).collect()
    }
}

fn validate_delivery_items(delivery: &Delivery) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(delivery.items.len());
    for item in &delivery.items {
        if !item.qty.is_finite() || item.qty <= 0.0 {
            let mut err = ValidationError::new("delivered_quantity");
            err.message = Some(
                format!(
                    "delivered quantity for product {} must be positive",
                    item.product_id
                )
                .into(),
            );
            return Err(err);
        }
        if !seen.insert(item.product_id) {
            let mut err = ValidationError::new("duplicate_product");
            err.message = Some(
                format!("product {} appears more than once", item.product_id).into(),
            );
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn delivery(items: Vec<DeliveryItem>) -> Delivery {
        Delivery::new(
            Uuid::new_v4(),
            items,
            Utc.with_ymd_and_hms(2024, 5, 6, 7, 0, 0).unwrap(),
        )
    }

    #[test]
    fn empty_items_fail_validation() {
        assert!(delivery(vec![]).validate().is_err());
    }

    #[test]
    fn non_positive_quantity_fails_validation() {
        let p = Uuid::new_v4();
        assert!(delivery(vec![DeliveryItem::new(p, 0.0)]).validate().is_err());
        assert!(delivery(vec![DeliveryItem::new(p, -3.0)]).validate().is_err());
        assert!(delivery(vec![DeliveryItem::new(p, f64::NAN)]).validate().is_err());
        assert!(delivery(vec![DeliveryItem::new(p, 4.0)]).validate().is_ok());
    }

    #[test]
    fn duplicate_product_fails_validation() {
        let p = Uuid::new_v4();
        let d = delivery(vec![DeliveryItem::new(p, 1.0), DeliveryItem::new(p, 2.0)]);
        assert!(d.validate().is_err());
    }

    #[test]
    fn only_pending_deliveries_transition() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let mut d = delivery(vec![DeliveryItem::new(Uuid::new_v4(), 5.0)]);
        assert!(d.accepted_at().is_none());

        d.accept(at).unwrap();
        assert_eq!(d.accepted_at(), Some(at));
        assert_matches!(d.accept(at), Err(ServiceError::InvalidStatus(_)));
        assert_matches!(d.reject(at, None), Err(ServiceError::InvalidStatus(_)));

        let mut rejected = delivery(vec![DeliveryItem::new(Uuid::new_v4(), 5.0)]);
        rejected.reject(at, Some("damaged".into())).unwrap();
        assert_eq!(rejected.acceptance.as_str(), "rejected");
        assert_matches!(rejected.accept(at), Err(ServiceError::InvalidStatus(_)));
    }

    #[test]
    fn acceptance_state_serializes_with_tag() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let json = serde_json::to_value(AcceptanceState::Accepted { at }).unwrap();
        assert_eq!(json["state"], "accepted");
    }
}
