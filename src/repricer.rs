//! Reprice orchestrator: the commit pipeline and the worker loop.
//!
//! Handles:
//! - Running one reprice attempt end to end (load, evaluate, validate, commit)
//! - Compensating committed changes when the external push fails
//! - Sweeping unprocessed signals through admission control
//! - Per-SKU locking so at most one reprice is in flight per SKU

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

use crate::api::{MarketClient, PushClient};
use crate::db::Database;
use crate::models::{MarketSnapshot, Signal, Sku, Strategy};
use crate::pricing::{Evaluation, EvaluationContext, StrategyEngine};
use crate::economics::{self, EconomicsError};
use crate::signals::{local_midnight_utc, Admission, SignalProcessor};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct RepricerConfig {
    /// Sweep interval for the worker loop (seconds)
    pub sweep_interval_secs: u64,

    /// Maximum signals pulled per sweep
    pub sweep_batch: i64,

    /// Concurrent reprice attempts per sweep
    pub max_concurrent: usize,

    /// Per-SKU lock acquisition timeout (seconds)
    pub lock_timeout_secs: u64,

    /// Refetch competitor data when the stored snapshot is older than this
    pub snapshot_max_age_secs: i64,

    /// Timeout for one market fetch or price push (seconds)
    pub io_timeout_secs: u64,

    /// Evaluate and commit locally without publishing to the marketplace
    pub dry_run: bool,
}

impl Default for RepricerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            sweep_batch: 50,
            max_concurrent: 4,
            lock_timeout_secs: 10,
            snapshot_max_age_secs: 900,
            io_timeout_secs: 30,
            dry_run: true,
        }
    }
}

/// Why a reprice attempt did not commit a new price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// SKU does not exist
    NotFound,
    /// SKU is inactive
    Inactive,
    /// No active strategy attached
    Ungoverned,
    /// Economics validation rejected the proposal (recorded)
    ValidationRejected,
    /// Degenerate cost structure; operator must fix the SKU
    CostModel,
    /// Cooldown or daily change limit hit at commit time
    Paced,
    /// Push or infrastructure failure; the commit was compensated
    TransientInfra,
    /// Another reprice holds the SKU lock
    ConcurrencyConflict,
}

impl FailureKind {
    /// Whether retrying the same attempt later can succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Paced | Self::TransientInfra | Self::ConcurrencyConflict
        )
    }
}

/// Outcome of one reprice attempt.
#[derive(Debug, Clone)]
pub struct RepriceResult {
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub old_price: Decimal,
    pub new_price: Decimal,
    /// True only when a new price was committed
    pub changed: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RepriceResult {
    fn success(old_price: Decimal, new_price: Decimal, reason: impl Into<String>) -> Self {
        Self {
            success: true,
            failure: None,
            old_price,
            new_price,
            changed: old_price != new_price,
            reason: reason.into(),
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    fn failed(kind: FailureKind, old_price: Decimal, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            failure: Some(kind),
            old_price,
            new_price: old_price,
            changed: false,
            reason: reason.into(),
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }
}

/// Main orchestrator.
pub struct Repricer {
    config: RepricerConfig,
    db: Database,
    processor: SignalProcessor,
    market_client: Option<MarketClient>,
    push_client: Option<PushClient>,

    // Per-SKU locks; entries are created on first use and never removed
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,

    shutdown: Arc<AtomicBool>,
}

impl Repricer {
    /// Create a new orchestrator. Marketplace clients are taken from the
    /// environment; either may be absent, degrading to stored snapshots and
    /// local-only commits.
    pub fn new(config: RepricerConfig, db: Database) -> Self {
        let market_client = match MarketClient::from_env() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Market client not configured: {}. Using stored snapshots only.", e);
                None
            }
        };

        let push_client = if config.dry_run {
            None
        } else {
            match PushClient::from_env() {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Push client not configured: {}. Running in dry-run mode.", e);
                    None
                }
            }
        };

        Self {
            config,
            processor: SignalProcessor::new(db.clone()),
            db,
            market_client,
            push_client,
            locks: Mutex::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    async fn sku_lock(&self, sku_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(sku_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one reprice attempt for a SKU.
    ///
    /// Fail-closed: every exit is a typed result and the committed price only
    /// moves inside the commit transaction. The triggering signal, when
    /// present, is marked processed for every non-retryable outcome.
    pub async fn reprice(&self, sku_id: i64, signal: Option<&Signal>) -> Result<RepriceResult> {
        let started = Instant::now();

        let lock = self.sku_lock(sku_id).await;
        let guard = timeout(
            Duration::from_secs(self.config.lock_timeout_secs),
            lock.lock_owned(),
        )
        .await;
        let _guard = match guard {
            Ok(guard) => guard,
            Err(_) => {
                let current_price = self
                    .db
                    .get_sku(sku_id)
                    .await?
                    .map(|sku| sku.current_price)
                    .unwrap_or(Decimal::ZERO);
                return Ok(RepriceResult::failed(
                    FailureKind::ConcurrencyConflict,
                    current_price,
                    format!("sku {} is being repriced by another worker", sku_id),
                ));
            }
        };

        let mut result = self.reprice_locked(sku_id, signal).await?;
        result.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(signal) = signal {
            let retryable = result.failure.is_some_and(|f| f.retryable());
            if !retryable {
                self.db.mark_signal_processed(&signal.id).await?;
            }
        }

        Ok(result)
    }

    async fn reprice_locked(
        &self,
        sku_id: i64,
        signal: Option<&Signal>,
    ) -> Result<RepriceResult> {
        let Some(sku) = self.db.get_sku(sku_id).await? else {
            return Ok(RepriceResult::failed(
                FailureKind::NotFound,
                Decimal::ZERO,
                format!("sku {} not found", sku_id),
            ));
        };

        if !sku.active {
            return Ok(RepriceResult::failed(
                FailureKind::Inactive,
                sku.current_price,
                format!("sku {} is inactive", sku_id),
            ));
        }

        let Some((strategy, activated_at)) = self.db.get_active_strategy(sku_id).await? else {
            return Ok(RepriceResult::failed(
                FailureKind::Ungoverned,
                sku.current_price,
                format!("sku {} has no active strategy", sku_id),
            ));
        };

        let market = self.load_snapshot(&sku).await?;

        let ctx = EvaluationContext {
            sku_id: sku.id,
            current_price: sku.current_price,
            market_position: sku.market_position,
            stock_quantity: sku.stock_quantity,
            economics: sku.economics(),
            market,
            strategy_activated_at: activated_at,
            now: Utc::now(),
        };

        let proposal = match StrategyEngine::evaluate(&strategy, &ctx)? {
            Evaluation::Stop { reason } => {
                info!(
                    sku = sku.id,
                    strategy = %strategy.name,
                    reason = %reason,
                    "Stop condition fired; deactivating strategy"
                );
                self.db.deactivate_attachment(sku.id, strategy.id).await?;
                return Ok(RepriceResult::success(
                    sku.current_price,
                    sku.current_price,
                    format!("strategy deactivated: {}", reason),
                ));
            }
            Evaluation::Hold { reason } => {
                debug!(sku = sku.id, reason = %reason, "Holding current price");
                return Ok(RepriceResult::success(
                    sku.current_price,
                    sku.current_price,
                    reason,
                ));
            }
            Evaluation::Proposal(proposal) => proposal,
        };

        if proposal.price == sku.current_price {
            return Ok(RepriceResult::success(
                sku.current_price,
                sku.current_price,
                proposal.reason,
            ));
        }

        // Admission gates run before the lock was taken; re-check pacing
        // under it so two racing triggers cannot both commit.
        if let Some(reason) = self.pacing_violation(sku_id, &strategy).await? {
            debug!(sku = sku.id, reason = %reason, "Commit paced");
            return Ok(RepriceResult::failed(
                FailureKind::Paced,
                sku.current_price,
                reason,
            ));
        }

        let report = match economics::validate_price(
            proposal.price,
            &ctx.economics,
            &strategy.rules.constraints,
            Some(sku.current_price),
        ) {
            Ok(report) => report,
            // A zero proposal is a broken strategy, not broken SKU economics.
            Err(EconomicsError::ZeroPrice) => {
                let reason = format!("proposed price {} is not sellable", proposal.price);
                info!(
                    sku = sku.id,
                    proposed = %proposal.price,
                    "Proposal rejected by validation"
                );
                self.db
                    .record_rejection(sku.id, proposal.price, &reason, &[])
                    .await?;
                return Ok(RepriceResult::failed(
                    FailureKind::ValidationRejected,
                    sku.current_price,
                    reason,
                ));
            }
            Err(e) => {
                error!(sku = sku.id, error = %e, "Misconfigured SKU economics");
                return Ok(RepriceResult::failed(
                    FailureKind::CostModel,
                    sku.current_price,
                    e.to_string(),
                ));
            }
        };

        if !report.valid {
            let reason = report
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let reason = match report.min_allowed_price {
                Some(floor) => format!("{} (min allowed price {})", reason, floor),
                None => reason,
            };

            info!(
                sku = sku.id,
                proposed = %proposal.price,
                reason = %reason,
                "Proposal rejected by validation"
            );
            self.db
                .record_rejection(sku.id, proposal.price, &reason, &report.errors)
                .await?;

            return Ok(RepriceResult::failed(
                FailureKind::ValidationRejected,
                sku.current_price,
                reason,
            ));
        }

        let history_id = self
            .db
            .commit_price_change(
                sku.id,
                sku.current_price,
                proposal.price,
                strategy.id,
                signal,
                &proposal.reason,
                report.profit,
                report.margin,
            )
            .await?;

        if let Some(push) = &self.push_client {
            let pushed = timeout(
                Duration::from_secs(self.config.io_timeout_secs),
                push.push_price(&sku.external_id, proposal.price),
            )
            .await;

            let push_error = match pushed {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("price push timed out".to_string()),
            };

            if let Some(push_error) = push_error {
                warn!(
                    sku = sku.id,
                    error = %push_error,
                    "Price push failed; reverting commit"
                );
                self.db
                    .revert_price_change(
                        history_id,
                        sku.id,
                        sku.current_price,
                        signal.map(|s| s.id.as_str()),
                    )
                    .await?;

                return Ok(RepriceResult::failed(
                    FailureKind::TransientInfra,
                    sku.current_price,
                    format!("price push failed: {}", push_error),
                ));
            }
        }

        info!(
            sku = sku.id,
            strategy = %strategy.name,
            old_price = %sku.current_price,
            new_price = %proposal.price,
            profit = %report.profit,
            margin = %report.margin,
            reason = %proposal.reason,
            "Price changed"
        );

        Ok(RepriceResult::success(
            sku.current_price,
            proposal.price,
            proposal.reason,
        ))
    }

    /// Cooldown and daily-rate check against committed (non-reverted)
    /// changes, read fresh under the per-SKU lock. Returns the violation
    /// reason, if any.
    async fn pacing_violation(
        &self,
        sku_id: i64,
        strategy: &Strategy,
    ) -> Result<Option<String>> {
        let now = Utc::now();

        if let Some(last_change) = self.db.last_change_at(sku_id).await? {
            let elapsed = now - last_change;
            if elapsed < chrono::Duration::minutes(strategy.cooldown_minutes) {
                return Ok(Some(format!(
                    "cooldown active: {}m elapsed of {}m",
                    elapsed.num_minutes(),
                    strategy.cooldown_minutes
                )));
            }
        }

        let changes_today = self
            .db
            .count_changes_since(sku_id, local_midnight_utc(now))
            .await?;
        if changes_today >= strategy.max_changes_per_day {
            return Ok(Some(format!(
                "daily change limit reached: {} of {}",
                changes_today, strategy.max_changes_per_day
            )));
        }

        Ok(None)
    }

    /// Latest stored snapshot, refreshed from the marketplace when missing or
    /// stale. Market fetch failures never fail the attempt: the pipeline runs
    /// against a zero snapshot and the engine holds accordingly.
    async fn load_snapshot(&self, sku: &Sku) -> Result<MarketSnapshot> {
        let stored = self.db.latest_snapshot(sku.id).await?;

        let fresh_enough = stored.as_ref().is_some_and(|s| {
            (Utc::now() - s.fetched_at).num_seconds() < self.config.snapshot_max_age_secs
        });
        if fresh_enough {
            return Ok(stored.unwrap_or_else(MarketSnapshot::empty));
        }

        if let Some(client) = &self.market_client {
            let fetched = timeout(
                Duration::from_secs(self.config.io_timeout_secs),
                client.fetch_snapshot(&sku.external_id),
            )
            .await;

            match fetched {
                Ok(Ok(snapshot)) => {
                    self.db.save_snapshot(sku.id, &snapshot).await?;
                    return Ok(snapshot);
                }
                Ok(Err(e)) => {
                    warn!(sku = sku.id, error = %e, "Market fetch failed; using stored snapshot");
                }
                Err(_) => {
                    warn!(sku = sku.id, "Market fetch timed out; using stored snapshot");
                }
            }
        }

        Ok(stored.unwrap_or_else(MarketSnapshot::empty))
    }

    /// One sweep: pull unprocessed signals, run admission, reprice the
    /// admitted ones concurrently. Returns how many signals were admitted.
    pub async fn sweep(&self) -> Result<usize> {
        let signals = self.db.unprocessed_signals(self.config.sweep_batch).await?;
        if signals.is_empty() {
            return Ok(0);
        }

        debug!(count = signals.len(), "Sweeping unprocessed signals");

        let mut admitted = Vec::new();
        for signal in signals {
            match self.processor.process(&signal).await? {
                Admission::Accepted => admitted.push(signal),
                Admission::Rejected { .. } => {}
            }
        }

        let count = admitted.len();
        stream::iter(admitted)
            .for_each_concurrent(self.config.max_concurrent, |signal| async move {
                if let Err(e) = self.reprice(signal.sku_id, Some(&signal)).await {
                    error!(
                        signal = %signal.id,
                        sku = signal.sku_id,
                        error = %e,
                        "Reprice attempt failed"
                    );
                }
            })
            .await;

        Ok(count)
    }

    /// Worker loop: sweep on an interval until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(
            sweep_interval = self.config.sweep_interval_secs,
            dry_run = self.push_client.is_none(),
            "Starting repricer worker loop"
        );

        let mut sweep_interval = interval(Duration::from_secs(self.config.sweep_interval_secs));

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            sweep_interval.tick().await;

            match self.sweep().await {
                Ok(admitted) if admitted > 0 => {
                    info!(admitted = admitted, "Sweep complete");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Sweep failed");
                }
            }
        }

        info!("Repricer shutdown complete");
        Ok(())
    }
}

/// Inject a signal into the queue (operator surface and integrations).
pub async fn inject_signal(
    db: &Database,
    sku_id: i64,
    signal_type: crate::models::SignalType,
    payload: serde_json::Value,
) -> Result<Signal> {
    let signal = Signal::new(sku_id, signal_type, payload);
    db.create_signal(&signal).await?;
    debug!(signal = %signal.id, sku = sku_id, "Signal queued");
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::models::{
        Constraint, ConstraintKind, SignalType, StopCondition, StopConditionKind, StrategyType,
    };

    fn make_sku() -> Sku {
        Sku {
            id: 0,
            external_id: "ext-1".to_string(),
            name: "Widget".to_string(),
            current_price: dec!(1200),
            cost_price: dec!(800),
            commission_pct: dec!(15),
            logistics_fee: dec!(50),
            storage_fee: dec!(0),
            seller_discount_pct: dec!(0),
            tax_pct: dec!(6),
            currency: "USD".to_string(),
            stock_quantity: 25,
            market_position: Some(4),
            active: true,
            updated_at: Utc::now(),
        }
    }

    async fn make_repricer() -> (Repricer, Database) {
        let db = Database::new_in_memory().await.unwrap();
        let repricer = Repricer::new(RepricerConfig::default(), db.clone());
        (repricer, db)
    }

    #[tokio::test]
    async fn test_reprice_missing_sku() {
        let (repricer, _db) = make_repricer().await;

        let result = repricer.reprice(99, None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_reprice_without_strategy_is_ungoverned() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Ungoverned));
    }

    #[tokio::test]
    async fn test_zero_snapshot_competitive_hold_succeeds_without_change() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let strategy_id = db
            .create_strategy(&Strategy::new("hold", StrategyType::CompetitiveHold))
            .await
            .unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert!(result.success);
        assert!(!result.changed);
        assert_eq!(result.new_price, dec!(1200));

        // A no-op leaves no audit row behind.
        assert!(db.recent_history(sku_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_action_commits_and_audits() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let mut strategy = Strategy::new("cut", StrategyType::CompetitiveHold);
        strategy.rules.actions.push(crate::models::Action {
            kind: crate::models::ActionKind::SetPrice,
            value: Some(dec!(1150)),
            mode: crate::models::AdjustmentMode::Absolute,
        });
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert!(result.success);
        assert!(result.changed);
        assert_eq!(result.new_price, dec!(1150));

        let sku = db.get_sku(sku_id).await.unwrap().unwrap();
        assert_eq!(sku.current_price, dec!(1150));

        let history = db.recent_history(sku_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].new_price, 1150.0);
    }

    #[tokio::test]
    async fn test_invalid_proposal_records_rejection() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        // Breakeven is 1076; propose 1000.
        let mut strategy = Strategy::new("dump", StrategyType::CompetitiveHold);
        strategy.rules.actions.push(crate::models::Action {
            kind: crate::models::ActionKind::SetPrice,
            value: Some(dec!(1000)),
            mode: crate::models::AdjustmentMode::Absolute,
        });
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::ValidationRejected));
        assert!(result.reason.contains("1076"));

        // Price untouched, rejection recorded.
        let sku = db.get_sku(sku_id).await.unwrap().unwrap();
        assert_eq!(sku.current_price, dec!(1200));
        assert_eq!(db.recent_rejections(sku_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_constraint_violation_rejects() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let mut strategy = Strategy::new("step", StrategyType::CompetitiveHold);
        strategy.rules.actions.push(crate::models::Action {
            kind: crate::models::ActionKind::SetPrice,
            value: Some(dec!(1400)),
            mode: crate::models::AdjustmentMode::Absolute,
        });
        strategy
            .rules
            .constraints
            .push(Constraint::new(ConstraintKind::MaxDeltaPerStep, dec!(100)));
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert_eq!(result.failure, Some(FailureKind::ValidationRejected));
    }

    #[tokio::test]
    async fn test_stop_condition_deactivates_attachment() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let mut strategy = Strategy::new("stop", StrategyType::CompetitiveHold);
        strategy.rules.stop_conditions.push(StopCondition {
            kind: StopConditionKind::StockLevel,
            value: dec!(30), // fixture stock is 25
        });
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert!(result.success);
        assert!(!result.changed);

        assert!(db.get_active_strategy(sku_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_contention_is_concurrency_conflict() {
        let (mut repricer, db) = make_repricer().await;
        repricer.config.lock_timeout_secs = 0;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let lock = repricer.sku_lock(sku_id).await;
        let _held = lock.lock().await;

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert_eq!(result.failure, Some(FailureKind::ConcurrencyConflict));
        assert!(result.failure.unwrap().retryable());

        // The conflict report still carries the real current price.
        assert_eq!(result.old_price, dec!(1200));
        assert_eq!(result.new_price, dec!(1200));
    }

    #[tokio::test]
    async fn test_racing_signals_commit_only_once() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let mut strategy = Strategy::new("chase", StrategyType::CompetitiveHold);
        strategy.rules.actions.push(crate::models::Action {
            kind: crate::models::ActionKind::DecreasePrice,
            value: Some(dec!(5)),
            mode: crate::models::AdjustmentMode::Percentage,
        });
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        // Both signals pass admission before any commit exists; only one
        // may commit under the per-SKU lock.
        inject_signal(
            &db,
            sku_id,
            SignalType::CompetitorPriceChange,
            serde_json::json!({}),
        )
        .await
        .unwrap();
        inject_signal(&db, sku_id, SignalType::ManualTrigger, serde_json::json!({}))
            .await
            .unwrap();

        let admitted = repricer.sweep().await.unwrap();
        assert_eq!(admitted, 2);

        let history = db.recent_history(sku_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);

        let sku = db.get_sku(sku_id).await.unwrap().unwrap();
        assert_eq!(sku.current_price, dec!(1140));

        // The loser is paced, not consumed: it stays queued.
        assert_eq!(db.unprocessed_signals(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_commit_within_cooldown_is_paced() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let mut strategy = Strategy::new("chase", StrategyType::CompetitiveHold);
        strategy.rules.actions.push(crate::models::Action {
            kind: crate::models::ActionKind::DecreasePrice,
            value: Some(dec!(5)),
            mode: crate::models::AdjustmentMode::Percentage,
        });
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        let first = repricer.reprice(sku_id, None).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.new_price, dec!(1140));

        let second = repricer.reprice(sku_id, None).await.unwrap();
        assert_eq!(second.failure, Some(FailureKind::Paced));
        assert!(second.failure.unwrap().retryable());

        let sku = db.get_sku(sku_id).await.unwrap().unwrap();
        assert_eq!(sku.current_price, dec!(1140));
        assert_eq!(db.recent_history(sku_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_price_proposal_rejected_as_validation() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        // A full 100% cut proposes price zero.
        let mut strategy = Strategy::new("floor", StrategyType::Clearance);
        strategy.rules.actions.push(crate::models::Action {
            kind: crate::models::ActionKind::DecreasePrice,
            value: Some(dec!(100)),
            mode: crate::models::AdjustmentMode::Percentage,
        });
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        let result = repricer.reprice(sku_id, None).await.unwrap();
        assert_eq!(result.failure, Some(FailureKind::ValidationRejected));

        let sku = db.get_sku(sku_id).await.unwrap().unwrap();
        assert_eq!(sku.current_price, dec!(1200));
        assert_eq!(db.recent_rejections(sku_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_admits_and_commits() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let mut strategy = Strategy::new("cut", StrategyType::CompetitiveHold);
        strategy.rules.actions.push(crate::models::Action {
            kind: crate::models::ActionKind::SetPrice,
            value: Some(dec!(1180)),
            mode: crate::models::AdjustmentMode::Absolute,
        });
        let strategy_id = db.create_strategy(&strategy).await.unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        inject_signal(
            &db,
            sku_id,
            SignalType::CompetitorPriceChange,
            serde_json::json!({}),
        )
        .await
        .unwrap();

        let admitted = repricer.sweep().await.unwrap();
        assert_eq!(admitted, 1);

        let sku = db.get_sku(sku_id).await.unwrap().unwrap();
        assert_eq!(sku.current_price, dec!(1180));
        assert!(db.unprocessed_signals(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_leaves_cooldown_rejections_queued() {
        let (repricer, db) = make_repricer().await;
        let sku_id = db.create_sku(&make_sku()).await.unwrap();

        let strategy_id = db
            .create_strategy(&Strategy::new("hold", StrategyType::CompetitiveHold))
            .await
            .unwrap();
        db.activate_attachment(sku_id, strategy_id).await.unwrap();

        // A fresh committed change puts the SKU in cooldown.
        db.commit_price_change(
            sku_id,
            dec!(1200),
            dec!(1190),
            strategy_id,
            None,
            "seed",
            dec!(90),
            dec!(7.5),
        )
        .await
        .unwrap();

        inject_signal(
            &db,
            sku_id,
            SignalType::CompetitorPriceChange,
            serde_json::json!({}),
        )
        .await
        .unwrap();

        let admitted = repricer.sweep().await.unwrap();
        assert_eq!(admitted, 0);

        // Transient rejection: the signal stays queued for a later sweep.
        assert_eq!(db.unprocessed_signals(10).await.unwrap().len(), 1);
    }
}
