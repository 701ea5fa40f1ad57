//! Strategy model: the user-configured rule set governing a SKU's price.
//!
//! A strategy is read-only to the pricing pipeline; the operator creates and
//! edits it. Rules (conditions, actions, constraints, stop conditions and
//! signal filters) are stored together as one JSON document.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SignalType;

/// Maximum nesting depth accepted for condition trees at save time.
pub const MAX_CONDITION_DEPTH: usize = 8;

/// Built-in pricing behavior selected when a strategy has no explicit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Track the competitive median, ignoring dumpers
    CompetitiveHold,
    /// Undercut the market minimum to take the top position
    PriceLeader,
    /// Raise price carefully while the position is strong
    MarginMaximizer,
    /// Driven entirely by explicit stock conditions and actions
    InventoryDriven,
    /// Sell-off mode driven by explicit actions
    Clearance,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompetitiveHold => "competitive_hold",
            Self::PriceLeader => "price_leader",
            Self::MarginMaximizer => "margin_maximizer",
            Self::InventoryDriven => "inventory_driven",
            Self::Clearance => "clearance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "competitive_hold" => Some(Self::CompetitiveHold),
            "price_leader" => Some(Self::PriceLeader),
            "margin_maximizer" => Some(Self::MarginMaximizer),
            "inventory_driven" => Some(Self::InventoryDriven),
            "clearance" => Some(Self::Clearance),
            _ => None,
        }
    }
}

/// Named metric a condition reads from the evaluation context.
///
/// The enum is closed: a strategy document naming an unknown metric fails to
/// deserialize at save time instead of silently evaluating false later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Position,
    CurrentPrice,
    CompetitorMin,
    CompetitorMedian,
    CompetitorMax,
    CompetitorCount,
    Margin,
    Profit,
    Stock,
}

/// Comparison operator applied between a metric and its expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

/// A boolean predicate over the evaluation context, with AND/OR composition.
///
/// `all` children must every one pass; when `any` is non-empty at least one
/// must pass. Both compose with the base comparison: the condition holds only
/// if all three agree. Trees are acyclic by construction (children are owned).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub metric: Metric,
    pub op: CompareOp,

    /// Expected value for scalar operators
    #[serde(default)]
    pub value: Decimal,

    /// Expected set for `in` / `not_in`
    #[serde(default)]
    pub values: Vec<Decimal>,

    /// AND sub-conditions
    #[serde(default)]
    pub all: Vec<Condition>,

    /// OR sub-conditions
    #[serde(default)]
    pub any: Vec<Condition>,
}

impl Condition {
    /// Depth of this condition tree, counting this node.
    pub fn depth(&self) -> usize {
        1 + self
            .all
            .iter()
            .chain(self.any.iter())
            .map(Condition::depth)
            .max()
            .unwrap_or(0)
    }
}

/// How an action's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentMode {
    /// Value is a percentage of the current price
    Percentage,
    /// Value is an absolute currency amount
    #[default]
    Absolute,
}

/// Discrete pricing move a strategy can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SetPrice,
    IncreasePrice,
    DecreasePrice,
    FollowCompetitor,
    SetToMedian,
    SetToBreakeven,
}

/// One configured pricing action. Only the first action of a strategy is
/// executed per evaluation cycle; chains are not yet supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,

    /// Literal price, delta, or competitor offset depending on the kind
    #[serde(default)]
    pub value: Option<Decimal>,

    #[serde(default)]
    pub mode: AdjustmentMode,
}

/// Guardrail type a proposed price must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    MinPrice,
    MaxPrice,
    MinProfit,
    MinMargin,
    /// Largest allowed price move per committed step
    MaxDeltaPerStep,
    /// Enforced by the signal processor's rate gate, not price validation
    MaxChangesPerDay,
}

/// A configured unit-economics guardrail. Disabled constraints are never
/// evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub value: Decimal,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Constraint {
    pub fn new(kind: ConstraintKind, value: Decimal) -> Self {
        Self {
            kind,
            value,
            enabled: true,
        }
    }
}

/// Condition under which a strategy must stop and be deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopConditionKind {
    /// Current price reached the target (at or below threshold)
    PriceReached,
    /// Market position reached the target (at or better than threshold)
    PositionReached,
    /// Minutes elapsed since the strategy was activated for the SKU
    TimeElapsed,
    /// Stock fell to or below the threshold
    StockLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopCondition {
    pub kind: StopConditionKind,
    pub value: Decimal,
}

/// The JSON-stored rule document of a strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyRules {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default)]
    pub constraints: Vec<Constraint>,

    #[serde(default)]
    pub stop_conditions: Vec<StopCondition>,

    /// Non-empty list restricts admitted signal types to members
    #[serde(default)]
    pub allowed_signals: Vec<SignalType>,

    /// Signal types that never trigger this strategy
    #[serde(default)]
    pub ignored_signals: Vec<SignalType>,
}

/// User-configured pricing strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    pub strategy_type: StrategyType,
    pub active: bool,
    pub rules: StrategyRules,

    /// Minimum minutes between two committed price changes
    pub cooldown_minutes: i64,

    /// Maximum committed price changes per local day
    pub max_changes_per_day: i64,
}

impl Strategy {
    /// Create a strategy with default pacing and empty rules.
    pub fn new(name: impl Into<String>, strategy_type: StrategyType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            strategy_type,
            active: true,
            rules: StrategyRules::default(),
            cooldown_minutes: 360,
            max_changes_per_day: 5,
        }
    }

    /// Save-time validation: catches configuration errors before the strategy
    /// ever reaches the pipeline.
    pub fn validate(&self) -> Result<(), String> {
        for condition in &self.rules.conditions {
            let depth = condition.depth();
            if depth > MAX_CONDITION_DEPTH {
                return Err(format!(
                    "condition tree depth {} exceeds maximum {}",
                    depth, MAX_CONDITION_DEPTH
                ));
            }
        }

        for action in &self.rules.actions {
            let needs_value = matches!(
                action.kind,
                ActionKind::SetPrice | ActionKind::IncreasePrice | ActionKind::DecreasePrice
            );
            if needs_value && action.value.is_none() {
                return Err(format!("{:?} action requires a value", action.kind));
            }
        }

        if self.cooldown_minutes < 0 {
            return Err("cooldown_minutes must be non-negative".to_string());
        }
        if self.max_changes_per_day < 1 {
            return Err("max_changes_per_day must be at least 1".to_string());
        }

        Ok(())
    }
}
