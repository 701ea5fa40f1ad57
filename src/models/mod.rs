//! Data models for SKUs, strategies, signals, and market snapshots.

mod market;
mod signal;
mod sku;
mod strategy;

pub use market::{CompetitorQuote, MarketSnapshot};
pub use signal::{Signal, SignalType};
pub use sku::{Sku, UnitEconomics};
pub use strategy::{
    Action, ActionKind, AdjustmentMode, CompareOp, Condition, Constraint, ConstraintKind, Metric,
    StopCondition, StopConditionKind, Strategy, StrategyRules, StrategyType,
};
