use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{self, DraftItem};

/// Latest draft per customer. Items are stored as one JSON document so a
/// replacement is a single-row write.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_drafts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: Uuid,
    pub generated_from: String,
    pub next_route_days: i64,
    pub items: Json,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for models::SystemDraft {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let items: Vec<DraftItem> = serde_json::from_value(model.items)?;
        Ok(Self {
            customer_id: model.customer_id,
            generated_from: model.generated_from,
            next_route_days: model.next_route_days,
            items,
            updated_at: model.updated_at,
        })
    }
}

impl TryFrom<&models::SystemDraft> for ActiveModel {
    type Error = ServiceError;

    fn try_from(draft: &models::SystemDraft) -> Result<Self, Self::Error> {
        Ok(Self {
            customer_id: Set(draft.customer_id),
            generated_from: Set(draft.generated_from.clone()),
            next_route_days: Set(draft.next_route_days),
            items: Set(serde_json::to_value(&draft.items)?),
            updated_at: Set(draft.updated_at),
        })
    }
}
