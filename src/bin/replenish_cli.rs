use std::{collections::BTreeSet, fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use replenish_engine::{
    build_store,
    config::{self, AppConfig},
    events::{process_events, Event, EventSender},
    models::{Customer, Product, SystemDraft, VarianceEvent, WorkingCopy},
    repositories::{InMemoryReferenceData, ReplenishmentStore},
    services::{FixedClock, ReplenishmentService},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "replenish-cli", about = "Replenishment engine utilities")]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded event log through the pipeline and print the outcome
    Replay(ReplayArgs),
    /// Load and validate configuration, then print the effective engine settings
    CheckConfig,
}

#[derive(Args)]
struct ReplayArgs {
    /// JSON document with customers, products and an ordered list of events
    file: PathBuf,
    /// Stop at the first event the pipeline rejects
    #[arg(long, action = ArgAction::SetTrue)]
    fail_fast: bool,
}

/// Replay input. Each event may carry an `at` override for the engine
/// clock; otherwise the event's own timestamp is used.
#[derive(Deserialize)]
struct ReplayDocument {
    #[serde(default)]
    customers: Vec<Customer>,
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    working_copies: Vec<WorkingCopy>,
    events: Vec<ReplayStep>,
}

#[derive(Deserialize)]
struct ReplayStep {
    #[serde(default)]
    at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    event: Event,
}

#[derive(Serialize)]
struct CustomerReport {
    customer_id: Uuid,
    draft: Option<SystemDraft>,
    variance_events: Vec<VarianceEvent>,
}

#[derive(Serialize)]
struct ReplayReport {
    applied: usize,
    failed: usize,
    customers: Vec<CustomerReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(&config.log_level, config.log_json);

    match cli.command {
        Commands::Replay(args) => handle_replay(&config, args, cli.json).await?,
        Commands::CheckConfig => handle_check_config(&config),
    }

    Ok(())
}

async fn handle_replay(config: &AppConfig, args: ReplayArgs, json: bool) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let document: ReplayDocument =
        serde_json::from_str(&raw).context("replay file is not a valid replay document")?;

    let store = build_store(config)
        .await
        .context("failed to initialize replenishment store")?;
    let reference = Arc::new(InMemoryReferenceData::new());
    let mut customer_ids = BTreeSet::new();
    for customer in document.customers {
        customer_ids.insert(customer.id);
        reference.upsert_customer(customer);
    }
    for product in document.products {
        reference.upsert_product(product);
    }
    for copy in &document.working_copies {
        store
            .save_working_copy(copy)
            .await
            .context("failed to seed working copy")?;
    }

    let start = document
        .events
        .iter()
        .find_map(|step| step.at.or_else(|| step.event.occurred_at()))
        .unwrap_or_else(Utc::now);
    let clock = Arc::new(FixedClock::new(start));
    let (event_tx, event_rx) = mpsc::channel::<Event>(config.event_channel_capacity);
    let service = Arc::new(
        ReplenishmentService::new(store.clone(), reference, clock.clone(), config.engine.clone())
            .with_event_sender(EventSender::new(event_tx)),
    );
    // Outbound notifications are only logged here.
    tokio::spawn(process_events(event_rx, service.clone()));

    let (mut applied, mut failed) = (0usize, 0usize);
    for (index, step) in document.events.into_iter().enumerate() {
        if let Some(at) = step.at.or_else(|| step.event.occurred_at()) {
            clock.set(at);
        }
        if let Some(customer_id) = customer_of(&step.event) {
            customer_ids.insert(customer_id);
        }

        let name = step.event.name();
        match service.apply(step.event).await {
            Ok(()) => applied += 1,
            Err(e) if args.fail_fast => {
                return Err(e).with_context(|| format!("event #{} ({}) failed", index + 1, name));
            }
            Err(e) => {
                failed += 1;
                error!(
                    index = index + 1,
                    event = name,
                    code = e.code(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Replay event rejected"
                );
            }
        }
    }
    info!(applied, failed, "Replay finished");

    let mut customers = Vec::with_capacity(customer_ids.len());
    for customer_id in customer_ids {
        customers.push(CustomerReport {
            customer_id,
            draft: store.find_draft(customer_id).await?,
            variance_events: store.list_variance_events(customer_id).await?,
        });
    }
    let report = ReplayReport {
        applied,
        failed,
        customers,
    };

    if json {
        print_json(&report)?;
    } else {
        render_report(&report);
    }
    Ok(())
}

fn handle_check_config(config: &AppConfig) {
    println!("environment:            {}", config.environment);
    println!("store backend:          {}", config.store_backend);
    if config.uses_database() {
        println!("database url:           {}", config.database_url);
    }
    println!("epsilon:                {}", config.engine.epsilon);
    println!("spike ratio threshold:  {}", config.engine.spike_ratio_threshold);
    println!("spike recency (days):   {}", config.engine.spike_recency_days);
    println!("no-consumption d2z:     {}", config.engine.no_consumption_days);
}

fn customer_of(event: &Event) -> Option<Uuid> {
    match event {
        Event::DeliveryAccepted { customer_id, .. }
        | Event::StockDeclared { customer_id, .. }
        | Event::DraftRecomputeRequested { customer_id, .. } => Some(*customer_id),
        _ => None,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_report(report: &ReplayReport) {
    println!(
        "Replayed {} event(s), {} rejected",
        report.applied + report.failed,
        report.failed
    );
    for customer in &report.customers {
        println!();
        println!("Customer {}", customer.customer_id);
        match &customer.draft {
            Some(draft) => render_draft(draft),
            None => println!("  no draft"),
        }
        for event in &customer.variance_events {
            render_variance(event);
        }
    }
}

fn render_draft(draft: &SystemDraft) {
    println!(
        "  draft from {} • next route in {} day(s) • {} item(s)",
        draft.generated_from,
        draft.next_route_days,
        draft.items.len()
    );
    for item in &draft.items {
        println!(
            "  {:>3}. {} • {} avg {:.2}/day • stock {} ({}) • d2z {:.1} • risk {:.1} • suggest {}{}",
            item.priority_rank,
            item.product_name
                .clone()
                .unwrap_or_else(|| item.product_id.to_string()),
            item.avg_type,
            item.avg_effective,
            item.effective_stock,
            item.stock_source,
            item.days_to_zero,
            item.risk_score,
            item.suggested_qty,
            if item.skt_risk { " • shelf-life risk" } else { "" }
        );
    }
}

fn render_variance(event: &VarianceEvent) {
    println!(
        "  variance {} • product {} • {} {} • change {:+.0}% • {}",
        event.id,
        event.product_id,
        event.severity,
        event.direction,
        event.change_ratio * 100.0,
        event.status
    );
}
