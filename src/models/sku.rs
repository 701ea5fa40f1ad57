//! SKU model: a priced, sellable product unit and its cost structure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A sellable product unit tracked by the repricer.
///
/// The current price is the only field the pipeline mutates, and only through
/// a committed reprice. Cost inputs are edited by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sku {
    pub id: i64,

    /// Listing ID on the marketplace (used for market data and price push)
    pub external_id: String,

    /// Human-readable product name
    pub name: String,

    /// Current committed price
    pub current_price: Decimal,

    // === Unit-cost inputs ===
    pub cost_price: Decimal,
    pub commission_pct: Decimal,
    pub logistics_fee: Decimal,
    pub storage_fee: Decimal,
    /// Seller-funded discount percentage (SPP)
    pub seller_discount_pct: Decimal,
    pub tax_pct: Decimal,
    pub currency: String,

    /// Units on hand (drives stock-level conditions)
    pub stock_quantity: i64,

    /// Rank among competing offers, 1 = cheapest. None when unknown.
    pub market_position: Option<i64>,

    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Sku {
    /// Snapshot the SKU's cost inputs for one evaluation cycle.
    ///
    /// The snapshot is immutable: every pipeline run re-derives it from the
    /// SKU record so mid-cycle edits never leak into an evaluation.
    pub fn economics(&self) -> UnitEconomics {
        UnitEconomics {
            cost_price: self.cost_price,
            commission_pct: self.commission_pct,
            logistics_fee: self.logistics_fee,
            storage_fee: self.storage_fee,
            seller_discount_pct: self.seller_discount_pct,
            tax_pct: self.tax_pct,
            currency: self.currency.clone(),
        }
    }
}

/// Immutable per-evaluation view of a SKU's cost structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitEconomics {
    pub cost_price: Decimal,
    pub commission_pct: Decimal,
    pub logistics_fee: Decimal,
    pub storage_fee: Decimal,
    pub seller_discount_pct: Decimal,
    pub tax_pct: Decimal,
    pub currency: String,
}

impl UnitEconomics {
    /// Costs that do not scale with price.
    pub fn fixed_costs(&self) -> Decimal {
        self.cost_price + self.logistics_fee + self.storage_fee
    }

    /// Fraction of the sale price consumed by percentage-based costs.
    pub fn variable_rate(&self) -> Decimal {
        (self.commission_pct + self.seller_discount_pct + self.tax_pct) / dec!(100)
    }
}
