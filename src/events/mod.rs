use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{Delivery, StockDeclaration};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Non-blocking send that logs instead of failing. Handlers running
    /// inside `process_events` publish to the channel they are drained from,
    /// so waiting for capacity here could stall the loop.
    pub fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.sender.try_send(event) {
            warn!(event = name, error = %e, "Dropping outbound event");
        }
    }
}

// Inbound events drive the pipeline, outbound events report what it did.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Inbound
    DeliveryAccepted {
        customer_id: Uuid,
        delivery: Delivery,
    },
    StockDeclared {
        customer_id: Uuid,
        declaration: StockDeclaration,
    },
    DraftRecomputeRequested {
        customer_id: Uuid,
        #[serde(default)]
        changed_product_ids: Vec<Uuid>,
        trigger: String,
    },

    // Outbound
    StatsUpdated {
        customer_id: Uuid,
        product_ids: Vec<Uuid>,
        trigger: String,
    },
    SpikeDetected {
        customer_id: Uuid,
        product_id: Uuid,
        stock_decl_id: Uuid,
        ratio: f64,
    },
    VarianceEventRecorded {
        variance_event_id: Uuid,
        customer_id: Uuid,
        product_id: Uuid,
        created: bool,
    },
    DraftRecomputed {
        customer_id: Uuid,
        generated_from: String,
        item_count: usize,
        updated_at: DateTime<Utc>,
    },
    WorkingCopyInvalidated {
        customer_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::DeliveryAccepted { .. } => "delivery_accepted",
            Event::StockDeclared { .. } => "stock_declared",
            Event::DraftRecomputeRequested { .. } => "draft_recompute_requested",
            Event::StatsUpdated { .. } => "stats_updated",
            Event::SpikeDetected { .. } => "spike_detected",
            Event::VarianceEventRecorded { .. } => "variance_event_recorded",
            Event::DraftRecomputed { .. } => "draft_recomputed",
            Event::WorkingCopyInvalidated { .. } => "working_copy_invalidated",
        }
    }

    /// Business timestamp carried by an inbound event, if any.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Event::DeliveryAccepted { delivery, .. } => delivery.accepted_at(),
            Event::StockDeclared { declaration, .. } => Some(declaration.declared_at),
            _ => None,
        }
    }

    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            Event::DeliveryAccepted { .. }
                | Event::StockDeclared { .. }
                | Event::DraftRecomputeRequested { .. }
        )
    }
}

// Define a trait for handling events. Handlers implementing this trait will process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the channel, handing every inbound event to `handler`. Outbound
/// events are logged only.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handler: Arc<dyn EventHandler>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        if !event.is_inbound() {
            info!(event = name, "Observed outbound event: {:?}", event);
            continue;
        }

        if let Err(e) = handler.handle_event(event).await {
            error!(event = name, error = %e, "Failed to handle inbound event");
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle_event(&self, _event: Event) -> Result<(), String> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn only_inbound_events_reach_the_handler() {
        let (tx, rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let handler = Arc::new(CountingHandler {
            handled: AtomicUsize::new(0),
        });

        sender.publish(Event::DraftRecomputeRequested {
            customer_id: Uuid::new_v4(),
            changed_product_ids: vec![],
            trigger: "manual".into(),
        });
        sender.publish(Event::WorkingCopyInvalidated {
            customer_id: Uuid::new_v4(),
            at: Utc::now(),
        });
        drop(sender);

        process_events(rx, handler.clone()).await;
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_on_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.publish(Event::WorkingCopyInvalidated {
            customer_id: Uuid::new_v4(),
            at: Utc::now(),
        });
        assert!(sender
            .send(Event::WorkingCopyInvalidated {
                customer_id: Uuid::new_v4(),
                at: Utc::now(),
            })
            .await
            .is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(Event::SpikeDetected {
            customer_id: Uuid::nil(),
            product_id: Uuid::nil(),
            stock_decl_id: Uuid::nil(),
            ratio: 3.6,
        })
        .unwrap();
        assert_eq!(json["type"], "spike_detected");
    }
}
