//! Signal model: events that may justify re-evaluating a SKU's price.
//!
//! Signals are consumed exactly once by the signal processor and never
//! deleted; the processed flag plus the table itself form an audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event category carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// A competitor changed their price
    CompetitorPriceChange,
    /// Our offer's rank among competitors moved
    MarketPositionChange,
    /// Stock level crossed a notable threshold
    StockLevelChange,
    /// Cost inputs changed (purchase price, fees)
    CostChange,
    /// Current price fell below the margin guardrail
    MarginBreach,
    /// Periodic scheduled re-evaluation
    ScheduledCheck,
    /// Operator-requested reprice
    ManualTrigger,
}

impl SignalType {
    /// Default sweep priority per type (0-10). Unlisted types would default
    /// to 5; the enum is closed so every variant carries an explicit value.
    pub fn default_priority(&self) -> i64 {
        match self {
            Self::ManualTrigger => 10,
            Self::MarginBreach => 9,
            Self::CompetitorPriceChange => 8,
            Self::CostChange => 7,
            Self::MarketPositionChange => 6,
            Self::StockLevelChange => 6,
            Self::ScheduledCheck => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompetitorPriceChange => "competitor_price_change",
            Self::MarketPositionChange => "market_position_change",
            Self::StockLevelChange => "stock_level_change",
            Self::CostChange => "cost_change",
            Self::MarginBreach => "margin_breach",
            Self::ScheduledCheck => "scheduled_check",
            Self::ManualTrigger => "manual_trigger",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "competitor_price_change" => Some(Self::CompetitorPriceChange),
            "market_position_change" => Some(Self::MarketPositionChange),
            "stock_level_change" => Some(Self::StockLevelChange),
            "cost_change" => Some(Self::CostChange),
            "margin_breach" => Some(Self::MarginBreach),
            "scheduled_check" => Some(Self::ScheduledCheck),
            "manual_trigger" => Some(Self::ManualTrigger),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single market or internal event targeting one SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub sku_id: i64,
    pub signal_type: SignalType,

    /// Sweep priority, 0-10, higher first
    pub priority: i64,

    /// Opaque event payload from the ingesting collaborator
    pub payload: serde_json::Value,

    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    /// Create a new unprocessed signal with the type's default priority.
    pub fn new(sku_id: i64, signal_type: SignalType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sku_id,
            signal_type,
            priority: signal_type.default_priority(),
            payload,
            processed: false,
            created_at: Utc::now(),
        }
    }
}
