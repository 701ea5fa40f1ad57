//! Unit-economics engine: profit, margin, breakeven, and price validation.
//!
//! Everything here is pure and synchronous. The orchestrator feeds it an
//! immutable economics snapshot plus the strategy's constraints and gets back
//! a full validation report with suggested prices for every failure.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Constraint, ConstraintKind, UnitEconomics};

/// Errors from a degenerate cost structure. These indicate misconfigured SKU
/// economics and must surface loudly, never default silently.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EconomicsError {
    #[error("variable costs consume {0}% of price; breakeven is undefined")]
    CostModel(Decimal),

    #[error("cannot compute margin at zero price")]
    ZeroPrice,

    #[error("target margin {0}% is unattainable with this cost structure")]
    UnattainableMargin(Decimal),
}

/// Kind of a single failed validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MinProfitViolated,
    MinMarginViolated,
    MinPriceViolated,
    MaxPriceViolated,
    MaxDeltaViolated,
    BelowBreakeven,
}

/// One failed check from `validate_price`.
///
/// Non-critical errors mean the price can be adjusted (capped) rather than
/// rejected outright; only max-price violations qualify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ViolationKind,
    pub message: String,
    pub critical: bool,
    pub suggested_price: Option<Decimal>,
}

/// Full result of validating one proposed price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub profit: Decimal,
    pub margin: Decimal,
    pub breakeven: Decimal,
    pub suggested_price: Option<Decimal>,
    pub min_allowed_price: Option<Decimal>,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Net profit of selling one unit at `price`.
///
/// The seller-funded discount reduces the realized price first; commission
/// and tax are charged on the discounted amount.
pub fn profit(price: Decimal, econ: &UnitEconomics) -> Decimal {
    let after_discount = price * (Decimal::ONE - econ.seller_discount_pct / dec!(100));
    let commission = after_discount * econ.commission_pct / dec!(100);
    let tax = after_discount * econ.tax_pct / dec!(100);

    round_money(
        after_discount - econ.cost_price - commission - econ.logistics_fee - econ.storage_fee - tax,
    )
}

/// Profit as a percentage of the sale price.
pub fn margin(price: Decimal, econ: &UnitEconomics) -> Result<Decimal, EconomicsError> {
    if price.is_zero() {
        return Err(EconomicsError::ZeroPrice);
    }
    Ok(round_money(profit(price, econ) / price * dec!(100)))
}

/// Minimum price at which profit is exactly zero, rounded up to the next
/// integer currency unit.
pub fn breakeven(econ: &UnitEconomics) -> Result<Decimal, EconomicsError> {
    let variable_rate = econ.variable_rate();
    if variable_rate >= Decimal::ONE {
        return Err(EconomicsError::CostModel(variable_rate * dec!(100)));
    }
    Ok((econ.fixed_costs() / (Decimal::ONE - variable_rate)).ceil())
}

/// Price required to earn `target_profit` per unit.
pub fn price_for_profit(
    target_profit: Decimal,
    econ: &UnitEconomics,
) -> Result<Decimal, EconomicsError> {
    let variable_rate = econ.variable_rate();
    if variable_rate >= Decimal::ONE {
        return Err(EconomicsError::CostModel(variable_rate * dec!(100)));
    }
    Ok(round_money(
        (target_profit + econ.fixed_costs()) / (Decimal::ONE - variable_rate),
    ))
}

/// Price required to reach `target_margin` percent.
pub fn price_for_margin(
    target_margin: Decimal,
    econ: &UnitEconomics,
) -> Result<Decimal, EconomicsError> {
    let denominator = Decimal::ONE - econ.variable_rate() - target_margin / dec!(100);
    if denominator <= Decimal::ZERO {
        return Err(EconomicsError::UnattainableMargin(target_margin));
    }
    Ok(round_money(econ.fixed_costs() / denominator))
}

/// Validate a proposed price against the strategy's enabled constraints plus
/// the always-on breakeven floor.
///
/// `current_price` is the SKU's committed price before this proposal; the
/// max-delta-per-step constraint compares against it. Max-changes-per-day is
/// a pacing rule enforced by the signal processor's rate gate and is skipped
/// here.
pub fn validate_price(
    price: Decimal,
    econ: &UnitEconomics,
    constraints: &[Constraint],
    current_price: Option<Decimal>,
) -> Result<ValidationReport, EconomicsError> {
    let profit_value = profit(price, econ);
    let margin_value = margin(price, econ)?;
    let breakeven_value = breakeven(econ)?;

    let mut errors: Vec<ValidationError> = Vec::new();

    for constraint in constraints.iter().filter(|c| c.enabled) {
        match constraint.kind {
            ConstraintKind::MinProfit => {
                if profit_value < constraint.value {
                    errors.push(ValidationError {
                        kind: ViolationKind::MinProfitViolated,
                        message: format!(
                            "profit {} below minimum {}",
                            profit_value, constraint.value
                        ),
                        critical: true,
                        suggested_price: price_for_profit(constraint.value, econ).ok(),
                    });
                }
            }
            ConstraintKind::MinMargin => {
                if margin_value < constraint.value {
                    let (message, suggested) = match price_for_margin(constraint.value, econ) {
                        Ok(target) => (
                            format!(
                                "margin {}% below minimum {}%",
                                margin_value, constraint.value
                            ),
                            Some(target),
                        ),
                        Err(e) => (e.to_string(), None),
                    };
                    errors.push(ValidationError {
                        kind: ViolationKind::MinMarginViolated,
                        message,
                        critical: true,
                        suggested_price: suggested,
                    });
                }
            }
            ConstraintKind::MinPrice => {
                if price < constraint.value {
                    errors.push(ValidationError {
                        kind: ViolationKind::MinPriceViolated,
                        message: format!("price {} below minimum {}", price, constraint.value),
                        critical: true,
                        suggested_price: Some(constraint.value),
                    });
                }
            }
            ConstraintKind::MaxPrice => {
                if price > constraint.value {
                    errors.push(ValidationError {
                        kind: ViolationKind::MaxPriceViolated,
                        message: format!("price {} above maximum {}", price, constraint.value),
                        critical: false,
                        suggested_price: Some(constraint.value),
                    });
                }
            }
            ConstraintKind::MaxDeltaPerStep => match current_price {
                Some(current) => {
                    let delta = (price - current).abs();
                    if delta > constraint.value {
                        let step = if price > current {
                            current + constraint.value
                        } else {
                            current - constraint.value
                        };
                        errors.push(ValidationError {
                            kind: ViolationKind::MaxDeltaViolated,
                            message: format!(
                                "price step {} exceeds maximum {} per change",
                                delta, constraint.value
                            ),
                            critical: true,
                            suggested_price: Some(step),
                        });
                    }
                }
                None => {
                    errors.push(ValidationError {
                        kind: ViolationKind::MaxDeltaViolated,
                        message: "max_delta_per_step requires a prior price".to_string(),
                        critical: true,
                        suggested_price: None,
                    });
                }
            },
            // Pacing rule; lives in the signal processor's rate gate.
            ConstraintKind::MaxChangesPerDay => {}
        }
    }

    // Hard floor regardless of configured constraints. Skip the duplicate if
    // a min-price constraint at or above breakeven already fired.
    if price < breakeven_value {
        let already_covered = errors.iter().any(|e| {
            e.kind == ViolationKind::MinPriceViolated
                && e.suggested_price.is_some_and(|p| p >= breakeven_value)
        });
        if !already_covered {
            errors.push(ValidationError {
                kind: ViolationKind::BelowBreakeven,
                message: format!("price {} below breakeven {}", price, breakeven_value),
                critical: true,
                suggested_price: Some(breakeven_value),
            });
        }
    }

    let valid = errors.is_empty();

    let min_allowed_price = if valid {
        None
    } else {
        let mut floor = breakeven_value;
        for constraint in constraints.iter().filter(|c| c.enabled) {
            let required = match constraint.kind {
                ConstraintKind::MinProfit => price_for_profit(constraint.value, econ).ok(),
                ConstraintKind::MinMargin => price_for_margin(constraint.value, econ).ok(),
                ConstraintKind::MinPrice => Some(constraint.value),
                _ => None,
            };
            if let Some(required) = required {
                floor = floor.max(required);
            }
        }
        Some(round_money(floor))
    };

    let suggested_price = if valid {
        None
    } else if errors.iter().all(|e| !e.critical) {
        // Only capped by max-price rules: suggest the tightest cap.
        errors.iter().filter_map(|e| e.suggested_price).min()
    } else {
        min_allowed_price
    };

    Ok(ValidationReport {
        valid,
        errors,
        profit: profit_value,
        margin: margin_value,
        breakeven: breakeven_value,
        suggested_price,
        min_allowed_price,
    })
}
