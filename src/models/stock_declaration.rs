use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeclarationItem {
    pub product_id: Uuid,
    /// On-hand quantity the customer reports.
    pub qty: f64,
}

impl DeclarationItem {
    pub fn new(product_id: Uuid, qty: f64) -> Self {
        Self { product_id, qty }
    }
}

/// Customer-reported snapshot of remaining stock. Never mutated once received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_declaration_items"))]
pub struct StockDeclaration {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub declared_at: DateTime<Utc>,
    #[validate(length(min = 1, message = "stock declaration must contain at least one item"))]
    pub items: Vec<DeclarationItem>,
}

impl StockDeclaration {
    pub fn new(customer_id: Uuid, items: Vec<DeclarationItem>, declared_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            declared_at,
            items,
        }
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|item| item.product_id).collect()
    }
}

// An empty shelf (0) is a valid declaration, negative stock is not.
fn validate_declaration_items(declaration: &StockDeclaration) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(declaration.items.len());
    for item in &declaration.items {
        if !item.qty.is_finite() || item.qty < 0.0 {
            let mut err = ValidationError::new("declared_quantity");
            err.message = Some(
                format!(
                    "declared quantity for product {} must be zero or more",
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
