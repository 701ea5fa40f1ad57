//! Database persistence for the repricing pipeline.
//!
//! Stores everything the pipeline reads and writes:
//! - SKUs and their cost inputs
//! - Strategies and SKU attachments (at most one active per SKU)
//! - Signals (the inbound event audit trail)
//! - Market snapshots
//! - Price history and rejections (the authoritative audit log)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{
    MarketSnapshot, Signal, SignalType, Sku, Strategy, StrategyRules, StrategyType,
};

/// Database connection pool for all pipeline state.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// Committed price change record. Append-only; `reverted` marks rows undone
/// by a failed external push and excludes them from pacing queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceHistoryEntry {
    pub id: i64,
    pub sku_id: i64,
    pub old_price: f64,
    pub new_price: f64,
    pub strategy_id: Option<i64>,
    pub signal_type: Option<String>,
    pub reason: String,
    pub profit: f64,
    pub margin: f64,
    pub reverted: bool,
    pub changed_at: String,
}

/// Economics-validation failure record, append-only. Feeds the price autopsy.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceRejection {
    pub id: i64,
    pub sku_id: i64,
    pub proposed_price: f64,
    pub reason: String,
    pub errors: String,
    pub rejected_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SkuRow {
    id: i64,
    external_id: String,
    name: String,
    current_price: f64,
    cost_price: f64,
    commission_pct: f64,
    logistics_fee: f64,
    storage_fee: f64,
    seller_discount_pct: f64,
    tax_pct: f64,
    currency: String,
    stock_quantity: i64,
    market_position: Option<i64>,
    active: bool,
    updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StrategyRow {
    id: i64,
    name: String,
    strategy_type: String,
    active: bool,
    rules: String,
    cooldown_minutes: i64,
    max_changes_per_day: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SignalRow {
    id: String,
    sku_id: i64,
    signal_type: String,
    priority: i64,
    payload: String,
    processed: bool,
    created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SnapshotRow {
    min_price: f64,
    max_price: f64,
    median_price: f64,
    competitors: String,
    fetched_at: String,
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::ZERO)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Database {
    /// Create a new database connection and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// In-memory database for tests. Single connection: each in-memory
    /// connection is its own database.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS skus (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                current_price REAL NOT NULL DEFAULT 0,
                cost_price REAL NOT NULL DEFAULT 0,
                commission_pct REAL NOT NULL DEFAULT 0,
                logistics_fee REAL NOT NULL DEFAULT 0,
                storage_fee REAL NOT NULL DEFAULT 0,
                seller_discount_pct REAL NOT NULL DEFAULT 0,
                tax_pct REAL NOT NULL DEFAULT 0,
                currency TEXT NOT NULL DEFAULT 'USD',
                stock_quantity INTEGER NOT NULL DEFAULT 0,
                market_position INTEGER,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                strategy_type TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                rules TEXT NOT NULL DEFAULT '{}',
                cooldown_minutes INTEGER NOT NULL DEFAULT 360,
                max_changes_per_day INTEGER NOT NULL DEFAULT 5,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sku_strategies (
                sku_id INTEGER NOT NULL,
                strategy_id INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                attached_at TEXT NOT NULL,
                activated_at TEXT,
                PRIMARY KEY (sku_id, strategy_id),
                FOREIGN KEY (sku_id) REFERENCES skus(id),
                FOREIGN KEY (strategy_id) REFERENCES strategies(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                sku_id INTEGER NOT NULL,
                signal_type TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 5,
                payload TEXT NOT NULL DEFAULT '{}',
                processed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sku_id INTEGER NOT NULL,
                min_price REAL NOT NULL DEFAULT 0,
                max_price REAL NOT NULL DEFAULT 0,
                median_price REAL NOT NULL DEFAULT 0,
                competitors TEXT NOT NULL DEFAULT '[]',
                fetched_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sku_id INTEGER NOT NULL,
                old_price REAL NOT NULL,
                new_price REAL NOT NULL,
                strategy_id INTEGER,
                signal_type TEXT,
                reason TEXT NOT NULL DEFAULT '',
                profit REAL NOT NULL DEFAULT 0,
                margin REAL NOT NULL DEFAULT 0,
                reverted INTEGER NOT NULL DEFAULT 0,
                changed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_rejections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sku_id INTEGER NOT NULL,
                proposed_price REAL NOT NULL,
                reason TEXT NOT NULL DEFAULT '',
                errors TEXT NOT NULL DEFAULT '[]',
                rejected_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_sweep ON signals(processed, priority, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_sku ON price_history(sku_id, changed_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rejections_sku ON price_rejections(sku_id, rejected_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_sku ON market_snapshots(sku_id, fetched_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== SKUs ====================

    /// Insert a new SKU, returning its id.
    pub async fn create_sku(&self, sku: &Sku) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO skus (
                external_id, name, current_price, cost_price, commission_pct,
                logistics_fee, storage_fee, seller_discount_pct, tax_pct,
                currency, stock_quantity, market_position, active, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&sku.external_id)
        .bind(&sku.name)
        .bind(to_f64(sku.current_price))
        .bind(to_f64(sku.cost_price))
        .bind(to_f64(sku.commission_pct))
        .bind(to_f64(sku.logistics_fee))
        .bind(to_f64(sku.storage_fee))
        .bind(to_f64(sku.seller_discount_pct))
        .bind(to_f64(sku.tax_pct))
        .bind(&sku.currency)
        .bind(sku.stock_quantity)
        .bind(sku.market_position)
        .bind(sku.active)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(sqlx::Row::get(&row, "id"))
    }

    /// Load a SKU by id.
    pub async fn get_sku(&self, id: i64) -> Result<Option<Sku>> {
        let row = sqlx::query_as::<_, SkuRow>("SELECT * FROM skus WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(sku_from_row))
    }

    /// List all SKUs.
    pub async fn list_skus(&self) -> Result<Vec<Sku>> {
        let rows = sqlx::query_as::<_, SkuRow>("SELECT * FROM skus ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch SKUs")?;

        Ok(rows.into_iter().map(sku_from_row).collect())
    }

    /// Flip a SKU's active flag.
    pub async fn set_sku_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE skus SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Strategies ====================

    /// Insert a new strategy, returning its id.
    pub async fn create_strategy(&self, strategy: &Strategy) -> Result<i64> {
        let rules = serde_json::to_string(&strategy.rules)?;

        let row = sqlx::query(
            r#"
            INSERT INTO strategies (name, strategy_type, active, rules, cooldown_minutes, max_changes_per_day, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&strategy.name)
        .bind(strategy.strategy_type.as_str())
        .bind(strategy.active)
        .bind(rules)
        .bind(strategy.cooldown_minutes)
        .bind(strategy.max_changes_per_day)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(sqlx::Row::get(&row, "id"))
    }

    /// Load a strategy by id.
    pub async fn get_strategy(&self, id: i64) -> Result<Option<Strategy>> {
        let row = sqlx::query_as::<_, StrategyRow>(
            "SELECT id, name, strategy_type, active, rules, cooldown_minutes, max_changes_per_day FROM strategies WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(strategy_from_row).transpose()
    }

    /// Flip a strategy's active flag.
    pub async fn set_strategy_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE strategies SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Attachments ====================

    /// Attach a strategy to a SKU and make it the single active one.
    ///
    /// Atomic: all other attachments for the SKU are deactivated in the same
    /// transaction, preserving the at-most-one-active invariant.
    pub async fn activate_attachment(&self, sku_id: i64, strategy_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE sku_strategies SET active = 0 WHERE sku_id = ?")
            .bind(sku_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO sku_strategies (sku_id, strategy_id, active, attached_at, activated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(sku_id, strategy_id) DO UPDATE SET
                active = 1,
                activated_at = excluded.activated_at
            "#,
        )
        .bind(sku_id)
        .bind(strategy_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deactivate one attachment (stop-condition follow-through).
    pub async fn deactivate_attachment(&self, sku_id: i64, strategy_id: i64) -> Result<()> {
        sqlx::query("UPDATE sku_strategies SET active = 0 WHERE sku_id = ? AND strategy_id = ?")
            .bind(sku_id)
            .bind(strategy_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// The SKU's single active strategy, with its activation time.
    pub async fn get_active_strategy(
        &self,
        sku_id: i64,
    ) -> Result<Option<(Strategy, Option<DateTime<Utc>>)>> {
        #[derive(sqlx::FromRow)]
        struct ActiveRow {
            id: i64,
            name: String,
            strategy_type: String,
            active: bool,
            rules: String,
            cooldown_minutes: i64,
            max_changes_per_day: i64,
            activated_at: Option<String>,
        }

        let row = sqlx::query_as::<_, ActiveRow>(
            r#"
            SELECT s.id, s.name, s.strategy_type, s.active, s.rules,
                   s.cooldown_minutes, s.max_changes_per_day, a.activated_at
            FROM strategies s
            JOIN sku_strategies a ON a.strategy_id = s.id
            WHERE a.sku_id = ? AND a.active = 1 AND s.active = 1
            LIMIT 1
            "#,
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let activated_at = row.activated_at.as_deref().map(parse_ts);
        let strategy = strategy_from_row(StrategyRow {
            id: row.id,
            name: row.name,
            strategy_type: row.strategy_type,
            active: row.active,
            rules: row.rules,
            cooldown_minutes: row.cooldown_minutes,
            max_changes_per_day: row.max_changes_per_day,
        })?;

        Ok(Some((strategy, activated_at)))
    }

    /// Count active attachments for a SKU (invariant check, diagnostics).
    pub async fn count_active_attachments(&self, sku_id: i64) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sku_strategies WHERE sku_id = ? AND active = 1")
                .bind(sku_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    // ==================== Signals ====================

    /// Persist a new signal.
    pub async fn create_signal(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (id, sku_id, signal_type, priority, payload, processed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal.id)
        .bind(signal.sku_id)
        .bind(signal.signal_type.as_str())
        .bind(signal.priority)
        .bind(signal.payload.to_string())
        .bind(signal.processed)
        .bind(signal.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a signal as consumed. Signals are never deleted.
    pub async fn mark_signal_processed(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE signals SET processed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Unprocessed signals in sweep order: priority descending, then oldest
    /// first.
    pub async fn unprocessed_signals(&self, limit: i64) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>(
            r#"
            SELECT * FROM signals
            WHERE processed = 0
            ORDER BY priority DESC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch unprocessed signals")?;

        rows.into_iter().map(signal_from_row).collect()
    }

    // ==================== Market snapshots ====================

    /// Store a fetched snapshot for a SKU.
    pub async fn save_snapshot(&self, sku_id: i64, snapshot: &MarketSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market_snapshots (sku_id, min_price, max_price, median_price, competitors, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sku_id)
        .bind(to_f64(snapshot.min_price))
        .bind(to_f64(snapshot.max_price))
        .bind(to_f64(snapshot.median_price))
        .bind(serde_json::to_string(&snapshot.competitors)?)
        .bind(snapshot.fetched_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent snapshot for a SKU, if any was ever fetched.
    pub async fn latest_snapshot(&self, sku_id: i64) -> Result<Option<MarketSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT min_price, max_price, median_price, competitors, fetched_at
            FROM market_snapshots
            WHERE sku_id = ?
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(MarketSnapshot {
            min_price: to_decimal(row.min_price),
            max_price: to_decimal(row.max_price),
            median_price: to_decimal(row.median_price),
            competitors: serde_json::from_str(&row.competitors).unwrap_or_default(),
            fetched_at: parse_ts(&row.fetched_at),
        }))
    }

    // ==================== Price history ====================

    /// Commit a price change: update the SKU, append the history row, and
    /// mark the triggering signal processed, all in one transaction.
    ///
    /// Returns the history row id so a failed external push can compensate.
    #[allow(clippy::too_many_arguments)]
    pub async fn commit_price_change(
        &self,
        sku_id: i64,
        old_price: Decimal,
        new_price: Decimal,
        strategy_id: i64,
        signal: Option<&Signal>,
        reason: &str,
        profit: Decimal,
        margin: Decimal,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE skus SET current_price = ?, updated_at = ? WHERE id = ?")
            .bind(to_f64(new_price))
            .bind(&now)
            .bind(sku_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO price_history (sku_id, old_price, new_price, strategy_id, signal_type, reason, profit, margin, changed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(sku_id)
        .bind(to_f64(old_price))
        .bind(to_f64(new_price))
        .bind(strategy_id)
        .bind(signal.map(|s| s.signal_type.as_str()))
        .bind(reason)
        .bind(to_f64(profit))
        .bind(to_f64(margin))
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(signal) = signal {
            sqlx::query("UPDATE signals SET processed = 1 WHERE id = ?")
                .bind(&signal.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(sqlx::Row::get(&row, "id"))
    }

    /// Compensate a committed change after a failed external push: restore
    /// the old price, flag the history row so pacing queries skip it, and
    /// requeue the triggering signal so a later sweep can retry it.
    pub async fn revert_price_change(
        &self,
        history_id: i64,
        sku_id: i64,
        old_price: Decimal,
        signal_id: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE skus SET current_price = ?, updated_at = ? WHERE id = ?")
            .bind(to_f64(old_price))
            .bind(&now)
            .bind(sku_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE price_history SET reverted = 1 WHERE id = ?")
            .bind(history_id)
            .execute(&mut *tx)
            .await?;

        if let Some(signal_id) = signal_id {
            sqlx::query("UPDATE signals SET processed = 0 WHERE id = ?")
                .bind(signal_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Timestamp of the most recent committed (non-reverted) change.
    pub async fn last_change_at(&self, sku_id: i64) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT changed_at FROM price_history
            WHERE sku_id = ? AND reverted = 0
            ORDER BY changed_at DESC
            LIMIT 1
            "#,
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(ts,)| parse_ts(&ts)))
    }

    /// Committed (non-reverted) changes since a timestamp.
    pub async fn count_changes_since(&self, sku_id: i64, since: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM price_history WHERE sku_id = ? AND reverted = 0 AND changed_at >= ?",
        )
        .bind(sku_id)
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Recent history rows for a SKU, newest first.
    pub async fn recent_history(&self, sku_id: i64, limit: i64) -> Result<Vec<PriceHistoryEntry>> {
        sqlx::query_as::<_, PriceHistoryEntry>(
            "SELECT * FROM price_history WHERE sku_id = ? ORDER BY changed_at DESC LIMIT ?",
        )
        .bind(sku_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch price history")
    }

    // ==================== Price rejections ====================

    /// Append a validation-failure record.
    pub async fn record_rejection(
        &self,
        sku_id: i64,
        proposed_price: Decimal,
        reason: &str,
        errors: &[crate::economics::ValidationError],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_rejections (sku_id, proposed_price, reason, errors, rejected_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(sku_id)
        .bind(to_f64(proposed_price))
        .bind(reason)
        .bind(serde_json::to_string(errors)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Recent rejections for a SKU, newest first.
    pub async fn recent_rejections(&self, sku_id: i64, limit: i64) -> Result<Vec<PriceRejection>> {
        sqlx::query_as::<_, PriceRejection>(
            "SELECT * FROM price_rejections WHERE sku_id = ? ORDER BY rejected_at DESC LIMIT ?",
        )
        .bind(sku_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch price rejections")
    }

    /// Get the connection pool (for advanced queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn sku_from_row(row: SkuRow) -> Sku {
    Sku {
        id: row.id,
        external_id: row.external_id,
        name: row.name,
        current_price: to_decimal(row.current_price),
        cost_price: to_decimal(row.cost_price),
        commission_pct: to_decimal(row.commission_pct),
        logistics_fee: to_decimal(row.logistics_fee),
        storage_fee: to_decimal(row.storage_fee),
        seller_discount_pct: to_decimal(row.seller_discount_pct),
        tax_pct: to_decimal(row.tax_pct),
        currency: row.currency,
        stock_quantity: row.stock_quantity,
        market_position: row.market_position,
        active: row.active,
        updated_at: parse_ts(&row.updated_at),
    }
}

fn strategy_from_row(row: StrategyRow) -> Result<Strategy> {
    let strategy_type = StrategyType::parse(&row.strategy_type)
        .with_context(|| format!("unknown strategy type '{}'", row.strategy_type))?;
    let rules: StrategyRules =
        serde_json::from_str(&row.rules).context("invalid strategy rules document")?;

    Ok(Strategy {
        id: row.id,
        name: row.name,
        strategy_type,
        active: row.active,
        rules,
        cooldown_minutes: row.cooldown_minutes,
        max_changes_per_day: row.max_changes_per_day,
    })
}

fn signal_from_row(row: SignalRow) -> Result<Signal> {
    let signal_type = SignalType::parse(&row.signal_type)
        .with_context(|| format!("unknown signal type '{}'", row.signal_type))?;

    Ok(Signal {
        id: row.id,
        sku_id: row.sku_id,
        signal_type,
        priority: row.priority,
        payload: serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null),
        processed: row.processed,
        created_at: parse_ts(&row.created_at),
    })
}
