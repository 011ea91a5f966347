use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ReferenceData;
use crate::errors::ServiceError;
use crate::models::{Customer, Product};

/// Reference data held in memory, seeded by the caller.
#[derive(Clone, Default)]
pub struct InMemoryReferenceData {
    customers: Arc<DashMap<Uuid, Customer>>,
    products: Arc<DashMap<Uuid, Product>>,
}

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn upsert_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }
}

#[async_trait]
impl ReferenceData for InMemoryReferenceData {
    async fn customer(&self, customer_id: Uuid) -> Result<Option<Customer>, ServiceError> {
        Ok(self.customers.get(&customer_id).map(|c| c.value().clone()))
    }

    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, ServiceError> {
        Ok(self.products.get(&product_id).map(|p| p.value().clone()))
    }
}
