use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{self, WorkingCopyStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "working_copies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: Uuid,
    pub status: String,
    pub payload: Json,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for models::WorkingCopy {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = model.status.parse::<WorkingCopyStatus>().map_err(|_| {
            ServiceError::SerializationError(format!(
                "unexpected working copy status '{}'",
                model.status
            ))
        })?;
        Ok(Self {
            customer_id: model.customer_id,
            status,
            payload: model.payload,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        })
    }
}

impl From<&models::WorkingCopy> for ActiveModel {
    fn from(copy: &models::WorkingCopy) -> Self {
        Self {
            customer_id: Set(copy.customer_id),
            status: Set(copy.status.to_string()),
            payload: Set(copy.payload.clone()),
            updated_at: Set(copy.updated_at),
            deleted_at: Set(copy.deleted_at),
        }
    }
}
