//! Marketplace repricing service
//!
//! Turns marketplace signals into governed price changes: strategy
//! evaluation, unit-economics validation, and an audited commit pipeline
//! with cooldown and rate limits.

mod api;
mod db;
mod economics;
mod models;
mod pricing;
mod repricer;
mod signals;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::db::Database;
use crate::models::{SignalType, Sku, Strategy, StrategyRules, StrategyType};
use crate::repricer::{inject_signal, Repricer, RepricerConfig};

/// Repricer CLI.
#[derive(Parser)]
#[command(name = "repricer")]
#[command(about = "Automated marketplace price management", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./repricer.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a SKU with its cost structure
    AddSku {
        /// Listing ID on the marketplace
        #[arg(long)]
        external_id: String,

        /// Product name
        #[arg(long)]
        name: String,

        /// Current price
        #[arg(long)]
        price: f64,

        /// Unit cost
        #[arg(long)]
        cost: f64,

        /// Marketplace commission percentage
        #[arg(long, default_value = "0")]
        commission: f64,

        /// Logistics fee per unit
        #[arg(long, default_value = "0")]
        logistics: f64,

        /// Storage fee per unit
        #[arg(long, default_value = "0")]
        storage: f64,

        /// Seller-funded discount percentage
        #[arg(long, default_value = "0")]
        discount: f64,

        /// Tax percentage
        #[arg(long, default_value = "0")]
        tax: f64,

        /// Currency code
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Units on hand
        #[arg(long, default_value = "0")]
        stock: i64,
    },

    /// List all SKUs
    ListSkus,

    /// Add a pricing strategy
    AddStrategy {
        /// Strategy name
        #[arg(long)]
        name: String,

        /// Strategy type (competitive_hold, price_leader, margin_maximizer,
        /// inventory_driven, clearance)
        #[arg(long = "type")]
        strategy_type: String,

        /// Rules document as JSON (conditions, actions, constraints, ...)
        #[arg(long, default_value = "{}")]
        rules: String,

        /// Minimum minutes between price changes
        #[arg(long, default_value = "360")]
        cooldown: i64,

        /// Maximum price changes per day
        #[arg(long, default_value = "5")]
        max_changes: i64,
    },

    /// Attach a strategy to a SKU and make it the active one
    Attach {
        /// SKU id
        sku_id: i64,

        /// Strategy id
        strategy_id: i64,
    },

    /// Inject a signal into the queue
    Signal {
        /// SKU id
        sku_id: i64,

        /// Signal type (competitor_price_change, market_position_change,
        /// stock_level_change, cost_change, margin_breach, scheduled_check,
        /// manual_trigger)
        #[arg(long, default_value = "manual_trigger")]
        signal_type: String,

        /// JSON payload attached to the signal
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Run one reprice attempt for a SKU
    Reprice {
        /// SKU id
        sku_id: i64,
    },

    /// Start the worker loop: sweep signals, admit, reprice
    Run {
        /// Sweep interval in seconds
        #[arg(short, long, default_value = "60")]
        interval: u64,

        /// Concurrent reprice attempts per sweep
        #[arg(short, long, default_value = "4")]
        concurrency: usize,

        /// Publish committed prices to the marketplace
        #[arg(long)]
        live: bool,
    },

    /// Price autopsy: economics breakdown, recent changes and rejections
    Autopsy {
        /// SKU id
        sku_id: i64,

        /// Rows of history and rejections to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Show SKUs, their strategies, and queue depth
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize database
    let db = Database::new(&cli.database).await?;

    match cli.command {
        Commands::AddSku {
            external_id,
            name,
            price,
            cost,
            commission,
            logistics,
            storage,
            discount,
            tax,
            currency,
            stock,
        } => {
            let sku = Sku {
                id: 0,
                external_id,
                name: name.clone(),
                current_price: decimal_arg(price, "price")?,
                cost_price: decimal_arg(cost, "cost")?,
                commission_pct: decimal_arg(commission, "commission")?,
                logistics_fee: decimal_arg(logistics, "logistics")?,
                storage_fee: decimal_arg(storage, "storage")?,
                seller_discount_pct: decimal_arg(discount, "discount")?,
                tax_pct: decimal_arg(tax, "tax")?,
                currency,
                stock_quantity: stock,
                market_position: None,
                active: true,
                updated_at: Utc::now(),
            };

            let econ = sku.economics();
            let id = db.create_sku(&sku).await?;

            println!("Created SKU {} ({})", id, name);
            match economics::breakeven(&econ) {
                Ok(breakeven) => {
                    println!("  Breakeven:     {}", breakeven);
                    println!("  Profit at {}: {}", sku.current_price, economics::profit(sku.current_price, &econ));
                }
                Err(e) => {
                    println!("  WARNING: {}", e);
                }
            }
        }

        Commands::ListSkus => {
            let skus = db.list_skus().await?;

            if skus.is_empty() {
                println!("No SKUs. Use 'repricer add-sku' to add one.");
                return Ok(());
            }

            println!(
                "\n{:<5} {:<24} {:>10} {:>10} {:>7} {:>6}",
                "ID", "NAME", "PRICE", "COST", "STOCK", "ACTIVE"
            );
            println!("{}", "-".repeat(68));

            for sku in skus {
                println!(
                    "{:<5} {:<24} {:>10} {:>10} {:>7} {:>6}",
                    sku.id,
                    truncate(&sku.name, 22),
                    sku.current_price,
                    sku.cost_price,
                    sku.stock_quantity,
                    if sku.active { "yes" } else { "no" }
                );
            }
        }

        Commands::AddStrategy {
            name,
            strategy_type,
            rules,
            cooldown,
            max_changes,
        } => {
            let strategy_type = StrategyType::parse(&strategy_type)
                .with_context(|| format!("unknown strategy type '{}'", strategy_type))?;
            let rules: StrategyRules =
                serde_json::from_str(&rules).context("invalid rules JSON")?;

            let mut strategy = Strategy::new(&name, strategy_type);
            strategy.rules = rules;
            strategy.cooldown_minutes = cooldown;
            strategy.max_changes_per_day = max_changes;
            strategy
                .validate()
                .map_err(|e| anyhow::anyhow!("invalid strategy: {}", e))?;

            let id = db.create_strategy(&strategy).await?;
            println!("Created strategy {} ({})", id, name);
        }

        Commands::Attach {
            sku_id,
            strategy_id,
        } => {
            db.get_sku(sku_id)
                .await?
                .with_context(|| format!("SKU {} not found", sku_id))?;
            db.get_strategy(strategy_id)
                .await?
                .with_context(|| format!("strategy {} not found", strategy_id))?;

            db.activate_attachment(sku_id, strategy_id).await?;
            println!("Strategy {} is now active for SKU {}", strategy_id, sku_id);
        }

        Commands::Signal {
            sku_id,
            signal_type,
            payload,
        } => {
            let signal_type = SignalType::parse(&signal_type)
                .with_context(|| format!("unknown signal type '{}'", signal_type))?;
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("invalid payload JSON")?;

            let signal = inject_signal(&db, sku_id, signal_type, payload).await?;
            println!(
                "Queued signal {} ({}, priority {})",
                signal.id, signal.signal_type, signal.priority
            );
        }

        Commands::Reprice { sku_id } => {
            let repricer = Repricer::new(RepricerConfig::default(), db.clone());
            let result = repricer.reprice(sku_id, None).await?;

            println!("\n=== Reprice Result ===");
            println!("Success:   {}", result.success);
            if let Some(failure) = result.failure {
                println!("Failure:   {:?} (retryable: {})", failure, failure.retryable());
            }
            println!("Old price: {}", result.old_price);
            println!("New price: {}", result.new_price);
            println!("Changed:   {}", result.changed);
            println!("Reason:    {}", result.reason);
            println!("Duration:  {}ms", result.duration_ms);
        }

        Commands::Run {
            interval,
            concurrency,
            live,
        } => {
            let config = RepricerConfig {
                sweep_interval_secs: interval,
                max_concurrent: concurrency,
                dry_run: !live,
                ..Default::default()
            };

            info!(
                interval = interval,
                concurrency = concurrency,
                live = live,
                "Starting repricer"
            );

            println!("\n=== Repricer ===");
            println!("Sweep interval: {}s", interval);
            println!("Concurrency:    {}", concurrency);
            println!(
                "Mode:           {}",
                if live { "LIVE (publishing prices)" } else { "DRY RUN (local commits only)" }
            );
            println!("\nPress Ctrl+C to stop.\n");

            let repricer = Repricer::new(config, db);
            repricer.run().await?;
        }

        Commands::Autopsy { sku_id, limit } => {
            let sku = db
                .get_sku(sku_id)
                .await?
                .with_context(|| format!("SKU {} not found", sku_id))?;
            let econ = sku.economics();

            println!("\n=== Price Autopsy: {} ===", sku.name);
            println!("Current price:  {}", sku.current_price);
            println!("Unit cost:      {}", econ.cost_price);
            println!("Fixed costs:    {}", econ.fixed_costs());
            println!(
                "Variable rate:  {}%",
                econ.variable_rate() * Decimal::from(100)
            );
            println!("Profit:         {}", economics::profit(sku.current_price, &econ));
            match economics::margin(sku.current_price, &econ) {
                Ok(margin) => println!("Margin:         {}%", margin),
                Err(e) => println!("Margin:         {}", e),
            }
            match economics::breakeven(&econ) {
                Ok(breakeven) => println!("Breakeven:      {}", breakeven),
                Err(e) => println!("Breakeven:      {}", e),
            }

            match db.get_active_strategy(sku_id).await? {
                Some((strategy, _)) => println!(
                    "Strategy:       {} ({})",
                    strategy.name,
                    strategy.strategy_type.as_str()
                ),
                None => println!("Strategy:       none"),
            }

            let history = db.recent_history(sku_id, limit).await?;
            println!("\n--- Recent Changes ({}) ---", history.len());
            for entry in &history {
                println!(
                    "  {} {} -> {} | profit {:.2} margin {:.2}%{} | {}",
                    entry.changed_at,
                    entry.old_price,
                    entry.new_price,
                    entry.profit,
                    entry.margin,
                    if entry.reverted { " | REVERTED" } else { "" },
                    truncate(&entry.reason, 48)
                );
            }

            let rejections = db.recent_rejections(sku_id, limit).await?;
            println!("\n--- Recent Rejections ({}) ---", rejections.len());
            for rejection in &rejections {
                println!(
                    "  {} proposed {} | {}",
                    rejection.rejected_at,
                    rejection.proposed_price,
                    truncate(&rejection.reason, 60)
                );
            }
        }

        Commands::Status => {
            let skus = db.list_skus().await?;
            let queued = db.unprocessed_signals(1000).await?;

            println!("\n=== Repricer Status ===");
            println!("SKUs:            {}", skus.len());
            println!("Queued signals:  {}", queued.len());

            if !skus.is_empty() {
                println!(
                    "\n{:<5} {:<24} {:>10} {:<24}",
                    "ID", "NAME", "PRICE", "STRATEGY"
                );
                println!("{}", "-".repeat(66));

                for sku in &skus {
                    let strategy = db
                        .get_active_strategy(sku.id)
                        .await?
                        .map(|(s, _)| s.name)
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<5} {:<24} {:>10} {:<24}",
                        sku.id,
                        truncate(&sku.name, 22),
                        sku.current_price,
                        truncate(&strategy, 22)
                    );
                }
            }

            if !queued.is_empty() {
                println!("\n--- Queued Signals ---");
                for signal in queued.iter().take(10) {
                    println!(
                        "  {} sku {} {} (priority {})",
                        signal.created_at.format("%Y-%m-%d %H:%M:%S"),
                        signal.sku_id,
                        signal.signal_type,
                        signal.priority
                    );
                }
            }
        }
    }

    Ok(())
}

fn decimal_arg(value: f64, name: &str) -> Result<Decimal> {
    Decimal::try_from(value).with_context(|| format!("invalid {} value {}", name, value))
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}
