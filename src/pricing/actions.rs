//! Action executor: maps one configured action to a concrete price proposal.

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::economics;
use crate::models::{Action, ActionKind, AdjustmentMode};

use super::{EvaluationContext, PriceProposal};

/// Execute a single action against the context.
///
/// Set/increase/decrease fail fast when their required value is absent (a
/// configuration error). Market-relative actions tolerate a zero snapshot by
/// holding the current price rather than failing the pipeline.
pub fn execute_action(action: &Action, ctx: &EvaluationContext) -> Result<PriceProposal> {
    match action.kind {
        ActionKind::SetPrice => {
            let Some(value) = action.value else {
                bail!("set_price action requires a value");
            };
            Ok(PriceProposal {
                price: round_price(value),
                reason: format!("set price to {}", value),
                confidence: 0.9,
            })
        }

        ActionKind::IncreasePrice => adjust(action, ctx, Decimal::ONE),
        ActionKind::DecreasePrice => adjust(action, ctx, -Decimal::ONE),

        ActionKind::FollowCompetitor => {
            if ctx.market.has_no_data() || ctx.market.min_price <= Decimal::ZERO {
                return Ok(hold(ctx, "no competitor data; holding current price"));
            }
            let offset = action.value.unwrap_or(Decimal::ZERO);
            let target = match action.mode {
                AdjustmentMode::Percentage => {
                    ctx.market.min_price * (Decimal::ONE + offset / dec!(100))
                }
                AdjustmentMode::Absolute => ctx.market.min_price + offset,
            };
            Ok(PriceProposal {
                price: round_price(target),
                reason: format!(
                    "following market minimum {} with offset {}",
                    ctx.market.min_price, offset
                ),
                confidence: 0.75,
            })
        }

        ActionKind::SetToMedian => {
            if ctx.market.has_no_data() || ctx.market.median_price <= Decimal::ZERO {
                return Ok(hold(ctx, "no competitor data; holding current price"));
            }
            Ok(PriceProposal {
                price: round_price(ctx.market.median_price),
                reason: format!("matching market median {}", ctx.market.median_price),
                confidence: 0.8,
            })
        }

        ActionKind::SetToBreakeven => {
            let breakeven = economics::breakeven(&ctx.economics)?;
            Ok(PriceProposal {
                price: breakeven,
                reason: format!("setting price to breakeven {}", breakeven),
                confidence: 0.85,
            })
        }
    }
}

fn adjust(action: &Action, ctx: &EvaluationContext, sign: Decimal) -> Result<PriceProposal> {
    let direction = if sign > Decimal::ZERO {
        "increase"
    } else {
        "decrease"
    };
    let Some(value) = action.value else {
        bail!("{}_price action requires a value", direction);
    };

    let delta = match action.mode {
        AdjustmentMode::Percentage => ctx.current_price * value / dec!(100),
        AdjustmentMode::Absolute => value,
    };
    let price = round_price(ctx.current_price + sign * delta);

    Ok(PriceProposal {
        price,
        reason: format!(
            "{} price by {}{} from {}",
            direction,
            value,
            match action.mode {
                AdjustmentMode::Percentage => "%",
                AdjustmentMode::Absolute => "",
            },
            ctx.current_price
        ),
        confidence: 0.85,
    })
}

fn hold(ctx: &EvaluationContext, reason: &str) -> PriceProposal {
    PriceProposal {
        price: ctx.current_price,
        reason: reason.to_string(),
        confidence: 0.2,
    }
}

fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::{CompetitorQuote, MarketSnapshot, UnitEconomics};

    fn make_ctx(market: MarketSnapshot) -> EvaluationContext {
        EvaluationContext {
            sku_id: 1,
            current_price: dec!(1200),
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
            strategy_activated_at: None,
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

    fn act(kind: ActionKind, value: Option<Decimal>, mode: AdjustmentMode) -> Action {
        Action { kind, value, mode }
    }

    #[test]
    fn test_set_price_literal() {
        let ctx = make_ctx(MarketSnapshot::empty());
        let proposal = execute_action(
            &act(ActionKind::SetPrice, Some(dec!(1350)), AdjustmentMode::Absolute),
            &ctx,
        )
        .unwrap();
        assert_eq!(proposal.price, dec!(1350));
    }

    #[test]
    fn test_set_price_missing_value_fails() {
        let ctx = make_ctx(MarketSnapshot::empty());
        let result = execute_action(
            &act(ActionKind::SetPrice, None, AdjustmentMode::Absolute),
            &ctx,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_increase_percentage() {
        let ctx = make_ctx(MarketSnapshot::empty());
        let proposal = execute_action(
            &act(
                ActionKind::IncreasePrice,
                Some(dec!(5)),
                AdjustmentMode::Percentage,
            ),
            &ctx,
        )
        .unwrap();
        assert_eq!(proposal.price, dec!(1260));
    }

    #[test]
    fn test_decrease_absolute() {
        let ctx = make_ctx(MarketSnapshot::empty());
        let proposal = execute_action(
            &act(
                ActionKind::DecreasePrice,
                Some(dec!(75)),
                AdjustmentMode::Absolute,
            ),
            &ctx,
        )
        .unwrap();
        assert_eq!(proposal.price, dec!(1125));
    }

    #[test]
    fn test_decrease_missing_value_fails() {
        let ctx = make_ctx(MarketSnapshot::empty());
        assert!(execute_action(
            &act(ActionKind::DecreasePrice, None, AdjustmentMode::Absolute),
            &ctx,
        )
        .is_err());
    }

    #[test]
    fn test_follow_competitor_percentage_offset() {
        let ctx = make_ctx(make_market(&[dec!(1000), dec!(1100)]));
        let proposal = execute_action(
            &act(
                ActionKind::FollowCompetitor,
                Some(dec!(-2)),
                AdjustmentMode::Percentage,
            ),
            &ctx,
        )
        .unwrap();
        assert_eq!(proposal.price, dec!(980));
    }

    #[test]
    fn test_follow_competitor_without_market_holds() {
        let ctx = make_ctx(MarketSnapshot::empty());
        let proposal = execute_action(
            &act(ActionKind::FollowCompetitor, None, AdjustmentMode::Absolute),
            &ctx,
        )
        .unwrap();
        assert_eq!(proposal.price, ctx.current_price);
        assert!(proposal.confidence < 0.5);
    }

    #[test]
    fn test_set_to_median() {
        let ctx = make_ctx(make_market(&[dec!(1000), dec!(1150), dec!(1400)]));
        let proposal = execute_action(
            &act(ActionKind::SetToMedian, None, AdjustmentMode::Absolute),
            &ctx,
        )
        .unwrap();
        assert_eq!(proposal.price, dec!(1150));
    }

    #[test]
    fn test_set_to_breakeven() {
        let ctx = make_ctx(MarketSnapshot::empty());
        let proposal = execute_action(
            &act(ActionKind::SetToBreakeven, None, AdjustmentMode::Absolute),
            &ctx,
        )
        .unwrap();
        assert_eq!(proposal.price, dec!(1076));
    }
}
