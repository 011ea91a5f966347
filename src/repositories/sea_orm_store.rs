use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::ReplenishmentStore;
use crate::entities::{consumption_stats, system_draft, variance_event, working_copy};
use crate::errors::ServiceError;
use crate::models::{ConsumptionStats, SystemDraft, VarianceEvent, WorkingCopy, WorkingCopyStatus};

/// Relational store over SeaORM. Expects `db::create_schema` to have run.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

#[async_trait]
impl ReplenishmentStore for SeaOrmStore {
    async fn find_stats(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ConsumptionStats>, ServiceError> {
        let row = consumption_stats::Entity::find_by_id((customer_id, product_id))
            .one(self.conn())
            .await?;
        Ok(row.map(ConsumptionStats::from))
    }

    async fn save_stats(&self, stats: &ConsumptionStats) -> Result<(), ServiceError> {
        use consumption_stats::Column;

        let model = consumption_stats::ActiveModel::from(stats);
        consumption_stats::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([Column::CustomerId, Column::ProductId])
                    .update_columns([
                        Column::DailyAvg,
                        Column::LastDeliveryId,
                        Column::LastDeliveryQty,
                        Column::LastDeliveryAt,
                        Column::PrevDeliveryId,
                        Column::PrevDeliveryQty,
                        Column::PrevDeliveryAt,
                        Column::LastDeclId,
                        Column::LastDeclQty,
                        Column::LastDeclAt,
                        Column::SpikeActive,
                        Column::SpikeDailyAvg,
                        Column::SpikeRatio,
                        Column::SpikeConsumed,
                        Column::SpikeWindowDays,
                        Column::SpikeDetectedAt,
                        Column::SpikeSourceDeclId,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.conn())
            .await?;
        Ok(())
    }

    async fn list_stats(&self, customer_id: Uuid) -> Result<Vec<ConsumptionStats>, ServiceError> {
        let rows = consumption_stats::Entity::find()
            .filter(consumption_stats::Column::CustomerId.eq(customer_id))
            .order_by_asc(consumption_stats::Column::ProductId)
            .all(self.conn())
            .await?;
        Ok(rows.into_iter().map(ConsumptionStats::from).collect())
    }

    async fn insert_variance_event_if_absent(
        &self,
        event: VarianceEvent,
    ) -> Result<(VarianceEvent, bool), ServiceError> {
        use variance_event::Column;

        let inserted = match variance_event::Entity::insert(variance_event::ActiveModel::from(&event))
            .on_conflict(
                OnConflict::columns([Column::TriggerType, Column::TriggerRefId, Column::ProductId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn())
            .await
        {
            Ok(rows) => rows,
            Err(DbErr::RecordNotInserted) => 0,
            Err(e) => return Err(e.into()),
        };

        if inserted > 0 {
            return Ok((event, true));
        }

        debug!(
            trigger_ref_id = %event.trigger.ref_id,
            product_id = %event.product_id,
            "Variance event already recorded for trigger"
        );
        let existing = variance_event::Entity::find()
            .filter(Column::TriggerType.eq(event.trigger.trigger_type.to_string()))
            .filter(Column::TriggerRefId.eq(event.trigger.ref_id))
            .filter(Column::ProductId.eq(event.product_id))
            .one(self.conn())
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "variance event for trigger {} vanished after conflict",
                    event.trigger.ref_id
                ))
            })?;
        Ok((VarianceEvent::try_from(existing)?, false))
    }

    async fn find_variance_event(&self, id: Uuid) -> Result<Option<VarianceEvent>, ServiceError> {
        variance_event::Entity::find_by_id(id)
            .one(self.conn())
            .await?
            .map(VarianceEvent::try_from)
            .transpose()
    }

    async fn update_variance_event(&self, event: &VarianceEvent) -> Result<(), ServiceError> {
        match variance_event::ActiveModel::from(event).update(self.conn()).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(ServiceError::NotFound(format!(
                "variance event {} not found",
                event.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_variance_events(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<VarianceEvent>, ServiceError> {
        variance_event::Entity::find()
            .filter(variance_event::Column::CustomerId.eq(customer_id))
            .order_by_asc(variance_event::Column::DetectedAt)
            .order_by_asc(variance_event::Column::Id)
            .all(self.conn())
            .await?
            .into_iter()
            .map(VarianceEvent::try_from)
            .collect()
    }

    async fn replace_draft(&self, draft: &SystemDraft) -> Result<(), ServiceError> {
        use system_draft::Column;

        let model = system_draft::ActiveModel::try_from(draft)?;
        system_draft::Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::CustomerId)
                    .update_columns([
                        Column::GeneratedFrom,
                        Column::NextRouteDays,
                        Column::Items,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.conn())
            .await?;
        Ok(())
    }

    async fn find_draft(&self, customer_id: Uuid) -> Result<Option<SystemDraft>, ServiceError> {
        system_draft::Entity::find_by_id(customer_id)
            .one(self.conn())
            .await?
            .map(SystemDraft::try_from)
            .transpose()
    }

    async fn save_working_copy(&self, copy: &WorkingCopy) -> Result<(), ServiceError> {
        use working_copy::Column;

        working_copy::Entity::insert(working_copy::ActiveModel::from(copy))
            .on_conflict(
                OnConflict::column(Column::CustomerId)
                    .update_columns([
                        Column::Status,
                        Column::Payload,
                        Column::UpdatedAt,
                        Column::DeletedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.conn())
            .await?;
        Ok(())
    }

    async fn find_working_copy(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<WorkingCopy>, ServiceError> {
        working_copy::Entity::find_by_id(customer_id)
            .one(self.conn())
            .await?
            .map(WorkingCopy::try_from)
            .transpose()
    }

    async fn invalidate_working_copy(
        &self,
        customer_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        use working_copy::Column;

        let result = working_copy::Entity::update_many()
            .col_expr(
                Column::Status,
                Expr::value(WorkingCopyStatus::DeletedByDelivery.to_string()),
            )
            .col_expr(Column::DeletedAt, Expr::value(at))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .filter(Column::CustomerId.eq(customer_id))
            .filter(Column::Status.eq(WorkingCopyStatus::Active.to_string()))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }
}
