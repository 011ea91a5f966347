use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    SpikeEvent, TriggerType, VarianceDirection, VarianceEvent, VarianceSeverity, VarianceStatus,
    VarianceTrigger,
};
use crate::repositories::ReplenishmentStore;
use crate::services::clock::Clock;

/// Relative change of the observed rate against the baseline. Zero when
/// there is no baseline.
pub fn change_ratio(observed_daily: f64, base_avg: f64) -> f64 {
    if base_avg > 0.0 {
        (observed_daily - base_avg) / base_avg
    } else {
        0.0
    }
}

/// Turns spikes into durable anomaly records awaiting a human reason.
pub struct VarianceTracker {
    store: Arc<dyn ReplenishmentStore>,
    clock: Arc<dyn Clock>,
}

impl VarianceTracker {
    pub fn new(store: Arc<dyn ReplenishmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records the anomaly for a spike. Replays of the same declaration
    /// return the record created the first time; the flag tells whether this
    /// call created it.
    #[instrument(skip(self, spike), fields(customer_id = %spike.customer_id, product_id = %spike.product_id, stock_decl_id = %spike.stock_decl_id))]
    pub async fn record_spike(
        &self,
        spike: &SpikeEvent,
    ) -> Result<(VarianceEvent, bool), ServiceError> {
        let candidate = VarianceEvent {
            id: Uuid::new_v4(),
            customer_id: spike.customer_id,
            product_id: spike.product_id,
            detected_at: self.clock.now(),
            trigger: VarianceTrigger {
                trigger_type: TriggerType::StockDeclSpike,
                ref_id: spike.stock_decl_id,
            },
            change_ratio: change_ratio(spike.observed_daily, spike.base_avg),
            direction: VarianceDirection::Increase,
            severity: VarianceSeverity::Major,
            status: VarianceStatus::NeedsReason,
            reason_code: None,
            reason_note: None,
            customer_action_at: None,
        };

        let (event, created) = self.store.insert_variance_event_if_absent(candidate).await?;
        if created {
            counter!("replenish.variance_events.created", 1);
            info!(variance_event_id = %event.id, change_ratio = event.change_ratio, "Variance event recorded");
        } else {
            info!(variance_event_id = %event.id, "Variance event already exists for this declaration");
        }
        Ok((event, created))
    }

    /// Variance events of a customer still waiting for a reason.
    pub async fn list_open(&self, customer_id: Uuid) -> Result<Vec<VarianceEvent>, ServiceError> {
        let events = self.store.list_variance_events(customer_id).await?;
        Ok(events.into_iter().filter(|e| e.needs_reason()).collect())
    }

    /// Explains an open variance event with a reason code.
    #[instrument(skip(self, note))]
    pub async fn resolve(
        &self,
        event_id: Uuid,
        reason_code: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<VarianceEvent, ServiceError> {
        let reason_code = reason_code.trim();
        if reason_code.is_empty() {
            return Err(ServiceError::ValidationError(
                "reason code must not be empty".to_string(),
            ));
        }
        self.close(event_id, VarianceStatus::Explained, Some(reason_code.to_string()), note, at)
            .await
    }

    /// Closes an open variance event without a reason code.
    #[instrument(skip(self, note))]
    pub async fn dismiss(
        &self,
        event_id: Uuid,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<VarianceEvent, ServiceError> {
        self.close(event_id, VarianceStatus::Dismissed, None, note, at)
            .await
    }

    async fn close(
        &self,
        event_id: Uuid,
        status: VarianceStatus,
        reason_code: Option<String>,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<VarianceEvent, ServiceError> {
        let mut event = self
            .store
            .find_variance_event(event_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("variance event {} not found", event_id)))?;

        if !event.needs_reason() {
            return Err(ServiceError::InvalidStatus(format!(
                "variance event {} is already {}",
                event_id, event.status
            )));
        }

        event.status = status;
        event.reason_code = reason_code;
        event.reason_note = note;
        event.customer_action_at = Some(at);
        self.store.update_variance_event(&event).await?;

        info!(variance_event_id = %event.id, status = %event.status, "Variance event closed");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryStore;
    use crate::services::clock::FixedClock;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn tracker() -> VarianceTracker {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        VarianceTracker::new(Arc::new(InMemoryStore::new()), Arc::new(FixedClock::new(now)))
    }

    fn spike(customer_id: Uuid, stock_decl_id: Uuid) -> SpikeEvent {
        SpikeEvent {
            customer_id,
            product_id: Uuid::from_u128(7),
            stock_decl_id,
            ratio: 3.6,
            observed_daily: 18.0,
            base_avg: 5.0,
        }
    }

    #[test]
    fn change_ratio_without_baseline_is_zero() {
        assert_eq!(change_ratio(18.0, 5.0), 2.6);
        assert_eq!(change_ratio(18.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn replayed_spike_returns_existing_record() {
        let tracker = tracker();
        let (customer, decl) = (Uuid::new_v4(), Uuid::new_v4());

        let (first, created) = tracker.record_spike(&spike(customer, decl)).await.unwrap();
        assert!(created);
        assert_eq!(first.status, VarianceStatus::NeedsReason);
        assert_eq!(first.direction, VarianceDirection::Increase);
        assert_eq!(first.severity, VarianceSeverity::Major);
        assert!(first.reason_code.is_none());

        let (second, created) = tracker.record_spike(&spike(customer, decl)).await.unwrap();
        assert!(!created);
        assert_eq!(second, first);
        assert_eq!(tracker.list_open(customer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolve_moves_event_out_of_open_queue() {
        let tracker = tracker();
        let customer = Uuid::new_v4();
        let (event, _) = tracker
            .record_spike(&spike(customer, Uuid::new_v4()))
            .await
            .unwrap();

        let at = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let resolved = tracker
            .resolve(event.id, "promotion", Some("weekend campaign".into()), at)
            .await
            .unwrap();
        assert_eq!(resolved.status, VarianceStatus::Explained);
        assert_eq!(resolved.reason_code.as_deref(), Some("promotion"));
        assert_eq!(resolved.customer_action_at, Some(at));
        assert!(tracker.list_open(customer).await.unwrap().is_empty());

        assert_matches!(
            tracker.dismiss(event.id, None, at).await,
            Err(ServiceError::InvalidStatus(_))
        );
    }

    #[tokio::test]
    async fn resolve_rejects_unknown_event_and_blank_reason() {
        let tracker = tracker();
        let at = Utc::now();
        assert_matches!(
            tracker.resolve(Uuid::new_v4(), "promotion", None, at).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            tracker.resolve(Uuid::new_v4(), "  ", None, at).await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
