//! Strategy engine: per-evaluation state machine producing a price proposal.
//!
//! Stateless across calls: every evaluation re-derives its outcome purely
//! from the passed-in context and strategy configuration.

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::models::{StopCondition, StopConditionKind, Strategy, StrategyType};

use super::{actions, conditions, EvaluationContext, PriceProposal};

/// Outcome of evaluating one strategy against one context.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// A concrete price to validate and commit
    Proposal(PriceProposal),

    /// Nothing to do this cycle
    Hold { reason: String },

    /// A stop condition fired: the caller must deactivate the attachment
    Stop { reason: String },
}

pub struct StrategyEngine;

impl StrategyEngine {
    /// Run the evaluation state machine:
    /// inactive check, stop conditions, condition gate, then action or
    /// built-in algorithm dispatch.
    pub fn evaluate(strategy: &Strategy, ctx: &EvaluationContext) -> Result<Evaluation> {
        if !strategy.active {
            return Ok(Evaluation::Hold {
                reason: "strategy is inactive".to_string(),
            });
        }

        for stop in &strategy.rules.stop_conditions {
            if let Some(reason) = stop_condition_met(stop, ctx) {
                return Ok(Evaluation::Stop { reason });
            }
        }

        // All top-level conditions must pass (AND semantics).
        if !strategy
            .rules
            .conditions
            .iter()
            .all(|c| conditions::evaluate_condition(c, ctx))
        {
            return Ok(Evaluation::Hold {
                reason: "strategy conditions not met".to_string(),
            });
        }

        if let Some(action) = strategy.rules.actions.first() {
            if strategy.rules.actions.len() > 1 {
                debug!(
                    strategy = %strategy.name,
                    actions = strategy.rules.actions.len(),
                    "Action chains not supported; executing first action only"
                );
            }
            let proposal = actions::execute_action(action, ctx)?;
            return Ok(Evaluation::Proposal(proposal));
        }

        Ok(match strategy.strategy_type {
            StrategyType::CompetitiveHold => competitive_hold(ctx),
            StrategyType::PriceLeader => price_leader(ctx),
            StrategyType::MarginMaximizer => margin_maximizer(ctx),
            StrategyType::InventoryDriven | StrategyType::Clearance => Evaluation::Hold {
                reason: format!(
                    "{} strategy has no built-in algorithm; configure explicit actions",
                    strategy.strategy_type.as_str()
                ),
            },
        })
    }
}

fn stop_condition_met(stop: &StopCondition, ctx: &EvaluationContext) -> Option<String> {
    match stop.kind {
        StopConditionKind::PriceReached => (ctx.current_price <= stop.value).then(|| {
            format!(
                "price {} reached stop threshold {}",
                ctx.current_price, stop.value
            )
        }),
        StopConditionKind::PositionReached => ctx.market_position.and_then(|position| {
            (Decimal::from(position) <= stop.value).then(|| {
                format!(
                    "market position {} reached stop threshold {}",
                    position, stop.value
                )
            })
        }),
        StopConditionKind::TimeElapsed => ctx.strategy_activated_at.and_then(|activated| {
            let elapsed = (ctx.now - activated).num_minutes();
            (Decimal::from(elapsed) >= stop.value)
                .then(|| format!("{} minutes elapsed since activation", elapsed))
        }),
        StopConditionKind::StockLevel => (Decimal::from(ctx.stock_quantity) <= stop.value)
            .then(|| {
                format!(
                    "stock {} at or below stop threshold {}",
                    ctx.stock_quantity, stop.value
                )
            }),
    }
}

/// Track the trimmed competitive median, ignoring dumpers and price noise.
fn competitive_hold(ctx: &EvaluationContext) -> Evaluation {
    let mut prices: Vec<Decimal> = ctx
        .market
        .competitors
        .iter()
        .filter(|c| c.in_stock && c.discounted_price > Decimal::ZERO)
        .map(|c| c.discounted_price)
        .collect();

    if prices.is_empty() {
        return Evaluation::Proposal(PriceProposal {
            price: ctx.current_price,
            reason: "no competitor data; holding current price".to_string(),
            confidence: 0.2,
        });
    }

    prices.sort();

    // Drop the lowest 20% to avoid chasing dumpers.
    let trim = prices.len() / 5;
    let kept = &prices[trim..];
    let mid = kept.len() / 2;
    let target = if kept.len() % 2 == 0 {
        (kept[mid - 1] + kept[mid]) / Decimal::TWO
    } else {
        kept[mid]
    };

    if ctx.current_price > Decimal::ZERO {
        let relative_move = ((target - ctx.current_price) / ctx.current_price).abs();
        if relative_move < dec!(0.02) {
            return Evaluation::Proposal(PriceProposal {
                price: ctx.current_price,
                reason: format!(
                    "competitive median {} within 2% of current price; holding",
                    target
                ),
                confidence: 0.6,
            });
        }
    }

    Evaluation::Proposal(PriceProposal {
        price: target.round(),
        reason: format!(
            "following trimmed competitive median {} across {} in-stock offers",
            target,
            kept.len()
        ),
        confidence: 0.75,
    })
}

/// Undercut the market minimum by 2%, limiting any single step to a 10% drop.
fn price_leader(ctx: &EvaluationContext) -> Evaluation {
    if let Some(position) = ctx.market_position {
        if position <= 3 {
            return Evaluation::Proposal(PriceProposal {
                price: ctx.current_price,
                reason: format!("already leading at position {}; holding", position),
                confidence: 0.8,
            });
        }
    }

    if ctx.market.min_price <= Decimal::ZERO {
        return Evaluation::Proposal(PriceProposal {
            price: ctx.current_price,
            reason: "no market data to undercut; holding current price".to_string(),
            confidence: 0.2,
        });
    }

    let target = ctx.market.min_price * dec!(0.98);
    let step_floor = ctx.current_price - ctx.current_price * dec!(0.10);
    let price = target
        .max(step_floor)
        .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);

    if price >= ctx.current_price {
        return Evaluation::Proposal(PriceProposal {
            price: ctx.current_price,
            reason: "already at or below the undercut target; holding".to_string(),
            confidence: 0.7,
        });
    }

    Evaluation::Proposal(PriceProposal {
        price,
        reason: format!(
            "undercutting market minimum {} by 2% (step-limited to 10%)",
            ctx.market.min_price
        ),
        confidence: 0.7,
    })
}

/// Raise price 2% while the position is strong, capped near the market median.
fn margin_maximizer(ctx: &EvaluationContext) -> Evaluation {
    match ctx.market_position {
        Some(position) if position <= 5 => {
            let raised = ctx.current_price * dec!(1.02);
            let price = if ctx.market.median_price > Decimal::ZERO {
                raised.min(ctx.market.median_price * dec!(1.10))
            } else {
                raised
            }
            .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);

            if price <= ctx.current_price {
                return Evaluation::Proposal(PriceProposal {
                    price: ctx.current_price,
                    reason: "median cap leaves no room to raise; holding".to_string(),
                    confidence: 0.6,
                });
            }

            Evaluation::Proposal(PriceProposal {
                price,
                reason: format!("raising 2% from position {} strength", position),
                confidence: 0.65,
            })
        }
        _ => Evaluation::Proposal(PriceProposal {
            price: ctx.current_price,
            reason: "position too weak to justify a raise; holding".to_string(),
            confidence: 0.5,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::models::{
        Action, ActionKind, AdjustmentMode, CompareOp, CompetitorQuote, Condition, MarketSnapshot,
        Metric, UnitEconomics,
    };

    fn make_ctx(current_price: Decimal, market: MarketSnapshot) -> EvaluationContext {
        EvaluationContext {
            sku_id: 1,
            current_price,
            market_position: Some(4),
            stock_quantity: 25,
            economics: UnitEconomics {
                cost_price: dec!(800),
                commission_pct: dec!(15),
                logistics_fee: dec!(50),
                storage_fee: dec!(0),
                seller_discount_pct: dec!(0),
                tax_pct: dec!(6),
                currency: "USD".to_string(),
            },
            market,
            strategy_activated_at: Some(Utc::now() - Duration::hours(1)),
            now: Utc::now(),
        }
    }

    fn make_market(prices: &[Decimal]) -> MarketSnapshot {
        MarketSnapshot::from_competitors(
            prices
                .iter()
                .map(|p| CompetitorQuote {
                    price: *p,
                    discounted_price: *p,
                    in_stock: true,
                })
                .collect(),
        )
    }

    fn proposal_price(evaluation: Evaluation) -> Decimal {
        match evaluation {
            Evaluation::Proposal(p) => p.price,
            other => panic!("expected proposal, got {:?}", other),
        }
    }

    #[test]
    fn test_inactive_strategy_holds() {
        let mut strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        strategy.active = false;
        let ctx = make_ctx(dec!(1200), MarketSnapshot::empty());

        let result = StrategyEngine::evaluate(&strategy, &ctx).unwrap();
        assert!(matches!(result, Evaluation::Hold { .. }));
    }

    #[test]
    fn test_stop_condition_stock_level() {
        let mut strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        strategy.rules.stop_conditions.push(StopCondition {
            kind: StopConditionKind::StockLevel,
            value: dec!(30),
        });
        let ctx = make_ctx(dec!(1200), MarketSnapshot::empty()); // stock 25

        let result = StrategyEngine::evaluate(&strategy, &ctx).unwrap();
        assert!(matches!(result, Evaluation::Stop { .. }));
    }

    #[test]
    fn test_stop_condition_time_elapsed() {
        let mut strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        strategy.rules.stop_conditions.push(StopCondition {
            kind: StopConditionKind::TimeElapsed,
            value: dec!(30), // activated an hour ago in the fixture
        });
        let ctx = make_ctx(dec!(1200), MarketSnapshot::empty());

        let result = StrategyEngine::evaluate(&strategy, &ctx).unwrap();
        assert!(matches!(result, Evaluation::Stop { .. }));
    }

    #[test]
    fn test_condition_gate_blocks_proposal() {
        let mut strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        strategy.rules.conditions.push(Condition {
            metric: Metric::Stock,
            op: CompareOp::Gt,
            value: dec!(100),
            values: vec![],
            all: vec![],
            any: vec![],
        });
        let ctx = make_ctx(dec!(1200), make_market(&[dec!(1000)]));

        let result = StrategyEngine::evaluate(&strategy, &ctx).unwrap();
        assert!(matches!(result, Evaluation::Hold { .. }));
    }

    #[test]
    fn test_explicit_action_takes_precedence() {
        let mut strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        strategy.rules.actions.push(Action {
            kind: ActionKind::SetPrice,
            value: Some(dec!(1500)),
            mode: AdjustmentMode::Absolute,
        });
        let ctx = make_ctx(dec!(1200), make_market(&[dec!(1000)]));

        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1500));
    }

    #[test]
    fn test_competitive_hold_no_market_holds_low_confidence() {
        let strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        let ctx = make_ctx(dec!(1200), MarketSnapshot::empty());

        match StrategyEngine::evaluate(&strategy, &ctx).unwrap() {
            Evaluation::Proposal(p) => {
                assert_eq!(p.price, dec!(1200));
                assert!(p.confidence < 0.5);
            }
            other => panic!("expected proposal, got {:?}", other),
        }
    }

    #[test]
    fn test_competitive_hold_trims_dumpers_and_takes_median() {
        let strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        // Lowest offer (the dumper at 600) is trimmed; median of the rest
        // of [1100, 1120, 1150, 1500] is 1135.
        let ctx = make_ctx(
            dec!(1200),
            make_market(&[dec!(600), dec!(1100), dec!(1120), dec!(1150), dec!(1500)]),
        );

        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1135));
    }

    #[test]
    fn test_competitive_hold_ignores_noise() {
        let strategy = Strategy::new("s", StrategyType::CompetitiveHold);
        let ctx = make_ctx(dec!(1200), make_market(&[dec!(1190), dec!(1200), dec!(1210)]));

        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1200)); // within 2%, held
    }

    #[test]
    fn test_price_leader_holds_when_leading() {
        let strategy = Strategy::new("s", StrategyType::PriceLeader);
        let mut ctx = make_ctx(dec!(1200), make_market(&[dec!(1000)]));
        ctx.market_position = Some(2);

        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1200));
    }

    #[test]
    fn test_price_leader_undercut_is_step_limited() {
        let strategy = Strategy::new("s", StrategyType::PriceLeader);
        let mut ctx = make_ctx(dec!(1200), make_market(&[dec!(1000)]));
        ctx.market_position = Some(7);

        // Raw undercut 980 is below the 10% step floor of 1080.
        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1080));
    }

    #[test]
    fn test_price_leader_no_market_holds() {
        let strategy = Strategy::new("s", StrategyType::PriceLeader);
        let mut ctx = make_ctx(dec!(1200), MarketSnapshot::empty());
        ctx.market_position = Some(7);

        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1200));
    }

    #[test]
    fn test_margin_maximizer_raises_when_strong() {
        let strategy = Strategy::new("s", StrategyType::MarginMaximizer);
        let mut ctx = make_ctx(dec!(1200), make_market(&[dec!(1150)]));
        ctx.market_position = Some(3);

        // min(1200 * 1.02, 1150 * 1.10) = min(1224, 1265) = 1224
        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1224));
    }

    #[test]
    fn test_margin_maximizer_holds_when_weak() {
        let strategy = Strategy::new("s", StrategyType::MarginMaximizer);
        let mut ctx = make_ctx(dec!(1200), make_market(&[dec!(1150)]));
        ctx.market_position = Some(9);

        let price = proposal_price(StrategyEngine::evaluate(&strategy, &ctx).unwrap());
        assert_eq!(price, dec!(1200));
    }

    #[test]
    fn test_inventory_driven_without_actions_holds() {
        let strategy = Strategy::new("s", StrategyType::InventoryDriven);
        let ctx = make_ctx(dec!(1200), make_market(&[dec!(1000)]));

        let result = StrategyEngine::evaluate(&strategy, &ctx).unwrap();
        assert!(matches!(result, Evaluation::Hold { .. }));
    }
}
