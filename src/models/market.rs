//! Market snapshot: competitor offers for a SKU at one fetch instant.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One competing offer observed on the marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorQuote {
    /// List price of the offer
    pub price: Decimal,

    /// Price after marketplace discounts (what a buyer actually pays)
    pub discounted_price: Decimal,

    /// Whether the offer can currently be fulfilled
    pub in_stock: bool,
}

/// Aggregated competitor prices for a SKU at one point in time.
///
/// The pipeline always evaluates against the most recent snapshot. When no
/// snapshot exists the zero default is substituted; strategies must tolerate
/// zero-data inputs and typically hold the current price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub median_price: Decimal,
    pub competitors: Vec<CompetitorQuote>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// All-zero snapshot used when no market data exists for a SKU.
    pub fn empty() -> Self {
        Self {
            min_price: Decimal::ZERO,
            max_price: Decimal::ZERO,
            median_price: Decimal::ZERO,
            competitors: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Build a snapshot from raw quotes, deriving min/max/median from
    /// in-stock discounted prices.
    pub fn from_competitors(competitors: Vec<CompetitorQuote>) -> Self {
        let mut prices: Vec<Decimal> = competitors
            .iter()
            .filter(|c| c.in_stock && c.discounted_price > Decimal::ZERO)
            .map(|c| c.discounted_price)
            .collect();
        prices.sort();

        let (min_price, max_price, median_price) = if prices.is_empty() {
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
        } else {
            let mid = prices.len() / 2;
            let median = if prices.len() % 2 == 0 {
                (prices[mid - 1] + prices[mid]) / Decimal::TWO
            } else {
                prices[mid]
            };
            (prices[0], prices[prices.len() - 1], median)
        };

        Self {
            min_price,
            max_price,
            median_price,
            competitors,
            fetched_at: Utc::now(),
        }
    }

    /// True when the snapshot carries no usable competitor data.
    pub fn has_no_data(&self) -> bool {
        self.competitors.is_empty()
    }
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(discounted: Decimal, in_stock: bool) -> CompetitorQuote {
        CompetitorQuote {
            price: discounted + dec!(100),
            discounted_price: discounted,
            in_stock,
        }
    }

    #[test]
    fn test_from_competitors_aggregates() {
        let snapshot = MarketSnapshot::from_competitors(vec![
            quote(dec!(900), true),
            quote(dec!(1100), true),
            quote(dec!(1000), true),
            quote(dec!(500), false), // out of stock, ignored
        ]);

        assert_eq!(snapshot.min_price, dec!(900));
        assert_eq!(snapshot.max_price, dec!(1100));
        assert_eq!(snapshot.median_price, dec!(1000));
    }

    #[test]
    fn test_even_count_median() {
        let snapshot = MarketSnapshot::from_competitors(vec![
            quote(dec!(800), true),
            quote(dec!(1000), true),
            quote(dec!(1200), true),
            quote(dec!(1400), true),
        ]);

        assert_eq!(snapshot.median_price, dec!(1100));
    }

    #[test]
    fn test_empty_snapshot_is_all_zero() {
        let snapshot = MarketSnapshot::empty();
        assert!(snapshot.has_no_data());
        assert_eq!(snapshot.min_price, Decimal::ZERO);
        assert_eq!(snapshot.median_price, Decimal::ZERO);
    }
}
