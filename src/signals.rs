//! Signal processor: admission control in front of the reprice pipeline.
//!
//! Decides whether an incoming signal should trigger a reprice attempt
//! without itself changing any price. Gates, in order: activity (SKU exists,
//! is active, has one active strategy), cooldown, interest, daily rate.
//! The decision itself is a pure function of loaded inputs; `SignalProcessor`
//! is the async wrapper that loads them from the database.

use anyhow::Result;
use chrono::{DateTime, Duration, Local, LocalResult, Utc};
use tracing::debug;

use crate::db::Database;
use crate::models::{Signal, Sku, Strategy};

/// Which admission gate produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Activity,
    Cooldown,
    Interest,
    Rate,
}

/// Admission decision for one signal.
///
/// `terminal` rejections will never succeed for this signal (wrong type,
/// missing SKU) and mark it processed; transient ones (cooldown, rate) leave
/// the signal unprocessed so a later sweep may admit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected {
        gate: Gate,
        reason: String,
        terminal: bool,
    },
}

impl Admission {
    fn terminal(gate: Gate, reason: impl Into<String>) -> Self {
        Self::Rejected {
            gate,
            reason: reason.into(),
            terminal: true,
        }
    }

    fn transient(gate: Gate, reason: impl Into<String>) -> Self {
        Self::Rejected {
            gate,
            reason: reason.into(),
            terminal: false,
        }
    }
}

/// Inputs the admission decision reads, loaded at decision time.
pub struct AdmissionContext<'a> {
    pub sku: Option<&'a Sku>,
    pub strategy: Option<&'a Strategy>,
    /// Most recent committed (non-reverted) price change for the SKU
    pub last_change_at: Option<DateTime<Utc>>,
    /// Committed price changes since local midnight
    pub changes_today: i64,
    pub now: DateTime<Utc>,
}

/// Pure admission decision over pre-loaded state.
pub fn admit(signal: &Signal, ctx: &AdmissionContext) -> Admission {
    // Activity gate
    let Some(sku) = ctx.sku else {
        return Admission::terminal(Gate::Activity, format!("sku {} not found", signal.sku_id));
    };
    if !sku.active {
        return Admission::terminal(Gate::Activity, format!("sku {} is inactive", sku.id));
    }
    let Some(strategy) = ctx.strategy else {
        return Admission::terminal(
            Gate::Activity,
            format!("sku {} has no active strategy", sku.id),
        );
    };

    // Cooldown gate: no prior committed change means always allowed.
    if let Some(last_change) = ctx.last_change_at {
        let elapsed = ctx.now - last_change;
        let cooldown = Duration::minutes(strategy.cooldown_minutes);
        if elapsed < cooldown {
            return Admission::transient(
                Gate::Cooldown,
                format!(
                    "cooldown active: {}m elapsed of {}m",
                    elapsed.num_minutes(),
                    strategy.cooldown_minutes
                ),
            );
        }
    }

    // Interest gate: the ignore list wins; a non-empty allow list restricts.
    if strategy.rules.ignored_signals.contains(&signal.signal_type) {
        return Admission::terminal(
            Gate::Interest,
            format!("signal type {} is ignored by strategy", signal.signal_type),
        );
    }
    if !strategy.rules.allowed_signals.is_empty()
        && !strategy.rules.allowed_signals.contains(&signal.signal_type)
    {
        return Admission::terminal(
            Gate::Interest,
            format!(
                "signal type {} not in strategy allow list",
                signal.signal_type
            ),
        );
    }

    // Rate gate
    if ctx.changes_today >= strategy.max_changes_per_day {
        return Admission::transient(
            Gate::Rate,
            format!(
                "daily change limit reached: {} of {}",
                ctx.changes_today, strategy.max_changes_per_day
            ),
        );
    }

    Admission::Accepted
}

/// Start of the current local day, in UTC, for the rate gate window.
pub fn local_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    let Some(midnight) = local.date_naive().and_hms_opt(0, 0, 0) else {
        return now;
    };
    match midnight.and_local_timezone(Local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => now,
    }
}

/// Database-backed signal admission.
pub struct SignalProcessor {
    db: Database,
}

impl SignalProcessor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the SKU, strategy and pacing counters, then run the gates.
    /// Terminal rejections mark the signal processed so sweeps do not
    /// re-deliver it forever.
    pub async fn process(&self, signal: &Signal) -> Result<Admission> {
        let now = Utc::now();
        let sku = self.db.get_sku(signal.sku_id).await?;

        let strategy = match &sku {
            Some(sku) if sku.active => self
                .db
                .get_active_strategy(sku.id)
                .await?
                .map(|(strategy, _)| strategy),
            _ => None,
        };

        let last_change_at = self.db.last_change_at(signal.sku_id).await?;
        let changes_today = self
            .db
            .count_changes_since(signal.sku_id, local_midnight_utc(now))
            .await?;

        let admission = admit(
            signal,
            &AdmissionContext {
                sku: sku.as_ref(),
                strategy: strategy.as_ref(),
                last_change_at,
                changes_today,
                now,
            },
        );

        if let Admission::Rejected {
            gate,
            reason,
            terminal,
        } = &admission
        {
            debug!(
                signal = %signal.id,
                sku = signal.sku_id,
                gate = ?gate,
                terminal = terminal,
                reason = %reason,
                "Signal rejected"
            );
            if *terminal {
                self.db.mark_signal_processed(&signal.id).await?;
            }
        }

        Ok(admission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::models::{SignalType, StrategyType};

    fn make_sku() -> Sku {
        Sku {
            id: 1,
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

    fn make_strategy() -> Strategy {
        Strategy::new("hold", StrategyType::CompetitiveHold)
    }

    fn make_signal(signal_type: SignalType) -> Signal {
        Signal::new(1, signal_type, serde_json::json!({}))
    }

    fn ctx<'a>(
        sku: Option<&'a Sku>,
        strategy: Option<&'a Strategy>,
        last_change_at: Option<DateTime<Utc>>,
        changes_today: i64,
    ) -> AdmissionContext<'a> {
        AdmissionContext {
            sku,
            strategy,
            last_change_at,
            changes_today,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_missing_sku_is_terminal() {
        let signal = make_signal(SignalType::CompetitorPriceChange);
        let admission = admit(&signal, &ctx(None, None, None, 0));

        assert!(matches!(
            admission,
            Admission::Rejected {
                gate: Gate::Activity,
                terminal: true,
                ..
            }
        ));
    }

    #[test]
    fn test_inactive_sku_rejected() {
        let mut sku = make_sku();
        sku.active = false;
        let strategy = make_strategy();
        let signal = make_signal(SignalType::CompetitorPriceChange);

        let admission = admit(&signal, &ctx(Some(&sku), Some(&strategy), None, 0));
        assert!(matches!(
            admission,
            Admission::Rejected {
                gate: Gate::Activity,
                ..
            }
        ));
    }

    #[test]
    fn test_cooldown_one_second_after_change_rejected() {
        let sku = make_sku();
        let strategy = make_strategy(); // 360 minute cooldown
        let signal = make_signal(SignalType::CompetitorPriceChange);
        let last_change = Utc::now() - Duration::seconds(1);

        let admission = admit(&signal, &ctx(Some(&sku), Some(&strategy), Some(last_change), 0));
        assert!(matches!(
            admission,
            Admission::Rejected {
                gate: Gate::Cooldown,
                terminal: false,
                ..
            }
        ));
    }

    #[test]
    fn test_cooldown_elapsed_admitted() {
        let sku = make_sku();
        let strategy = make_strategy();
        let signal = make_signal(SignalType::CompetitorPriceChange);
        let last_change = Utc::now() - Duration::minutes(361);

        let admission = admit(&signal, &ctx(Some(&sku), Some(&strategy), Some(last_change), 0));
        assert_eq!(admission, Admission::Accepted);
    }

    #[test]
    fn test_no_prior_change_always_passes_cooldown() {
        let sku = make_sku();
        let strategy = make_strategy();
        let signal = make_signal(SignalType::CompetitorPriceChange);

        let admission = admit(&signal, &ctx(Some(&sku), Some(&strategy), None, 0));
        assert_eq!(admission, Admission::Accepted);
    }

    #[test]
    fn test_ignored_signal_type_is_terminal() {
        let sku = make_sku();
        let mut strategy = make_strategy();
        strategy
            .rules
            .ignored_signals
            .push(SignalType::ScheduledCheck);
        let signal = make_signal(SignalType::ScheduledCheck);

        let admission = admit(&signal, &ctx(Some(&sku), Some(&strategy), None, 0));
        assert!(matches!(
            admission,
            Admission::Rejected {
                gate: Gate::Interest,
                terminal: true,
                ..
            }
        ));
    }

    #[test]
    fn test_allow_list_restricts_types() {
        let sku = make_sku();
        let mut strategy = make_strategy();
        strategy
            .rules
            .allowed_signals
            .push(SignalType::CompetitorPriceChange);

        let allowed = make_signal(SignalType::CompetitorPriceChange);
        let blocked = make_signal(SignalType::StockLevelChange);

        assert_eq!(
            admit(&allowed, &ctx(Some(&sku), Some(&strategy), None, 0)),
            Admission::Accepted
        );
        assert!(matches!(
            admit(&blocked, &ctx(Some(&sku), Some(&strategy), None, 0)),
            Admission::Rejected {
                gate: Gate::Interest,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_allow_list_accepts_by_default() {
        let sku = make_sku();
        let strategy = make_strategy();
        let signal = make_signal(SignalType::StockLevelChange);

        assert_eq!(
            admit(&signal, &ctx(Some(&sku), Some(&strategy), None, 0)),
            Admission::Accepted
        );
    }

    #[test]
    fn test_rate_gate_at_daily_limit() {
        let sku = make_sku();
        let mut strategy = make_strategy();
        strategy.max_changes_per_day = 3;
        let signal = make_signal(SignalType::ManualTrigger);

        let admission = admit(&signal, &ctx(Some(&sku), Some(&strategy), None, 3));
        assert!(matches!(
            admission,
            Admission::Rejected {
                gate: Gate::Rate,
                terminal: false,
                ..
            }
        ));
    }

    #[test]
    fn test_rate_gate_below_limit_passes() {
        let sku = make_sku();
        let mut strategy = make_strategy();
        strategy.max_changes_per_day = 3;
        let signal = make_signal(SignalType::ManualTrigger);

        assert_eq!(
            admit(&signal, &ctx(Some(&sku), Some(&strategy), None, 2)),
            Admission::Accepted
        );
    }
}
