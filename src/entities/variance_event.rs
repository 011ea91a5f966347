use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{self, VarianceTrigger};

/// `(trigger_type, trigger_ref_id, product_id)` carries a unique index, see
/// `db::create_schema`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "variance_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub trigger_type: String,
    pub trigger_ref_id: Uuid,
    pub change_ratio: f64,
    pub direction: String,
    pub severity: String,
    pub status: String,
    pub reason_code: Option<String>,
    pub reason_note: Option<String>,
    pub customer_action_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub const UNIQUE_TRIGGER_INDEX: &str = "ux_variance_events_trigger_product";

fn parse<T: FromStr>(column: &str, value: &str) -> Result<T, ServiceError> {
    value.parse::<T>().map_err(|_| {
        ServiceError::SerializationError(format!(
            "unexpected {} value '{}' in variance_events",
            column, value
        ))
    })
}

impl TryFrom<Model> for models::VarianceEvent {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            customer_id: model.customer_id,
            product_id: model.product_id,
            detected_at: model.detected_at,
            trigger: VarianceTrigger {
                trigger_type: parse("trigger_type", &model.trigger_type)?,
                ref_id: model.trigger_ref_id,
            },
            change_ratio: model.change_ratio,
            direction: parse("direction", &model.direction)?,
            severity: parse("severity", &model.severity)?,
            status: parse("status", &model.status)?,
            reason_code: model.reason_code,
            reason_note: model.reason_note,
            customer_action_at: model.customer_action_at,
        })
    }
}

impl From<&models::VarianceEvent> for ActiveModel {
    fn from(event: &models::VarianceEvent) -> Self {
        Self {
            id: Set(event.id),
            customer_id: Set(event.customer_id),
            product_id: Set(event.product_id),
            detected_at: Set(event.detected_at),
            trigger_type: Set(event.trigger.trigger_type.to_string()),
            trigger_ref_id: Set(event.trigger.ref_id),
            change_ratio: Set(event.change_ratio),
            direction: Set(event.direction.to_string()),
            severity: Set(event.severity.to_string()),
            status: Set(event.status.to_string()),
            reason_code: Set(event.reason_code.clone()),
            reason_note: Set(event.reason_note.clone()),
            customer_action_at: Set(event.customer_action_at),
        }
    }
}
