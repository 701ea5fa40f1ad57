//! Pricing pipeline: condition evaluation, action execution, and the
//! strategy engine that turns a market context into a price proposal.

mod actions;
mod conditions;
mod engine;

pub use actions::execute_action;
pub use conditions::evaluate_condition;
pub use engine::{Evaluation, StrategyEngine};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::economics;
use crate::models::{MarketSnapshot, Metric, UnitEconomics};

/// Everything one evaluation cycle reads. Built fresh by the orchestrator
/// from the loaded SKU and the latest market snapshot; never mutated.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub sku_id: i64,
    pub current_price: Decimal,
    pub market_position: Option<i64>,
    pub stock_quantity: i64,
    pub economics: UnitEconomics,
    pub market: MarketSnapshot,

    /// When the active strategy was attached to this SKU (drives the
    /// time-elapsed stop condition)
    pub strategy_activated_at: Option<DateTime<Utc>>,

    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    /// Resolve a named metric against this context. `None` means the metric
    /// has no value right now (unknown position, empty market) and any
    /// condition reading it evaluates false.
    pub fn metric(&self, metric: Metric) -> Option<Decimal> {
        match metric {
            Metric::Position => self.market_position.map(Decimal::from),
            Metric::CurrentPrice => Some(self.current_price),
            Metric::CompetitorMin => self.market_metric(self.market.min_price),
            Metric::CompetitorMedian => self.market_metric(self.market.median_price),
            Metric::CompetitorMax => self.market_metric(self.market.max_price),
            Metric::CompetitorCount => Some(Decimal::from(self.market.competitors.len() as i64)),
            Metric::Margin => economics::margin(self.current_price, &self.economics).ok(),
            Metric::Profit => Some(economics::profit(self.current_price, &self.economics)),
            Metric::Stock => Some(Decimal::from(self.stock_quantity)),
        }
    }

    fn market_metric(&self, value: Decimal) -> Option<Decimal> {
        if self.market.has_no_data() {
            None
        } else {
            Some(value)
        }
    }
}

/// A concrete price proposal produced by the strategy engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceProposal {
    pub price: Decimal,

    /// Human-readable audit string recorded with the price change
    pub reason: String,

    /// Advisory confidence in the proposal, 0.0 to 1.0
    pub confidence: f64,
}
