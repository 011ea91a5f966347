//! Replenishment forecasting engine
//!
//! Maintains per customer x product consumption rates from accepted
//! deliveries and stock declarations, records consumption spikes as variance
//! events, and builds a ranked replenishment draft for the next route visit.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod models;
pub mod repositories;
pub mod schedule;
pub mod services;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::repositories::{InMemoryStore, ReplenishmentStore, SeaOrmStore};

/// Builds the store selected by `store_backend`, creating the schema when
/// configured to.
pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn ReplenishmentStore>, ServiceError> {
    if !config.uses_database() {
        tracing::info!("Using in-memory replenishment store");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let pool = db::establish_connection_from_app_config(config).await?;
    if config.auto_create_schema {
        db::create_schema(&pool).await?;
    }
    Ok(Arc::new(SeaOrmStore::new(Arc::new(pool))))
}
