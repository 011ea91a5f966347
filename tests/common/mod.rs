#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};
use replenish_engine::{
    config::EngineConfig,
    db::{self, DbConfig},
    events::{Event, EventSender},
    models::{
        AcceptanceState, Customer, DeclarationItem, Delivery, DeliveryItem, Product, RoutePlan,
        StockDeclaration,
    },
    repositories::{InMemoryReferenceData, InMemoryStore, ReplenishmentStore, SeaOrmStore},
    services::{FixedClock, ReplenishmentService},
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Monday 2024-03-04 08:00 UTC plus `n` days.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap() + Duration::days(n)
}

/// Pipeline wired against a chosen store with a manually driven clock.
pub struct TestPipeline {
    pub service: Arc<ReplenishmentService>,
    pub store: Arc<dyn ReplenishmentStore>,
    pub reference: Arc<InMemoryReferenceData>,
    pub clock: Arc<FixedClock>,
    pub events: mpsc::Receiver<Event>,
    pub customer_id: Uuid,
}

impl TestPipeline {
    pub async fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new())).await
    }

    pub async fn sqlite() -> Self {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..DbConfig::default()
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("sqlite connection");
        db::create_schema(&pool).await.expect("schema");
        Self::with_store(Arc::new(SeaOrmStore::new(Arc::new(pool)))).await
    }

    pub async fn with_store(store: Arc<dyn ReplenishmentStore>) -> Self {
        let reference = Arc::new(InMemoryReferenceData::new());
        let clock = Arc::new(FixedClock::new(day(0)));
        let (tx, rx) = mpsc::channel(256);

        let customer_id = Uuid::new_v4();
        reference.upsert_customer(Customer::new(
            customer_id,
            RoutePlan::new([Weekday::Mon, Weekday::Fri]),
        ));

        let service = ReplenishmentService::new(
            store.clone(),
            reference.clone(),
            clock.clone(),
            EngineConfig::default(),
        )
        .with_event_sender(EventSender::new(tx));

        Self {
            service: Arc::new(service),
            store,
            reference,
            clock,
            events: rx,
            customer_id,
        }
    }

    pub fn add_product(&self, name: &str, shelf_life_days: Option<u32>) -> Uuid {
        let id = Uuid::new_v4();
        let mut product = Product::new(id, name);
        product.shelf_life_days = shelf_life_days;
        self.reference.upsert_product(product);
        id
    }

    pub fn accepted_delivery(&self, items: &[(Uuid, f64)], at: DateTime<Utc>) -> Delivery {
        let items = items
            .iter()
            .map(|(product_id, qty)| DeliveryItem::new(*product_id, *qty))
            .collect();
        let mut delivery = Delivery::new(self.customer_id, items, at);
        delivery.acceptance = AcceptanceState::Accepted { at };
        delivery
    }

    pub fn declaration(&self, items: &[(Uuid, f64)], at: DateTime<Utc>) -> StockDeclaration {
        let items = items
            .iter()
            .map(|(product_id, qty)| DeclarationItem::new(*product_id, *qty))
            .collect();
        StockDeclaration::new(self.customer_id, items, at)
    }

    /// Moves the clock to `at` and applies the delivery.
    pub async fn deliver(&self, items: &[(Uuid, f64)], at: DateTime<Utc>) -> Delivery {
        self.clock.set(at);
        let delivery = self.accepted_delivery(items, at);
        self.service
            .apply_delivery_accepted(self.customer_id, &delivery)
            .await
            .expect("delivery applied");
        delivery
    }

    /// Moves the clock to `at` and applies the declaration.
    pub async fn declare(&self, items: &[(Uuid, f64)], at: DateTime<Utc>) -> StockDeclaration {
        self.clock.set(at);
        let declaration = self.declaration(items, at);
        self.service
            .apply_stock_declaration(self.customer_id, &declaration)
            .await
            .expect("declaration applied");
        declaration
    }

    pub fn drain_event_names(&mut self) -> Vec<&'static str> {
        std::iter::from_fn(|| self.events.try_recv().ok())
            .map(|event| event.name())
            .collect()
    }
}
