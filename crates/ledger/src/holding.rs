use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierstock_catalog::PriceSet;

/// One (custodian, variant) stock row.
///
/// Created on first credit, never removed; a zero-quantity row stays
/// as a historical anchor. The quantity is a custody figure, not a
/// conservation figure: sub-allocating to a child does *not* reduce the
/// parent's row; only order placement and remittance reduce a row (both
/// agent-side). Quantity never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: i64,
    /// The prices supplied at the most recent credit; overwritten on
    /// every credit carrying prices.
    pub prices: PriceSet,
    pub last_credited_at: DateTime<Utc>,
}

impl Holding {
    pub fn new(quantity: i64, prices: PriceSet, credited_at: DateTime<Utc>) -> Self {
        Self {
            quantity,
            prices,
            last_credited_at: credited_at,
        }
    }

    /// Credit stock in, overwriting the price fields with the values
    /// supplied for this credit.
    pub fn credit(&mut self, quantity: i64, prices: PriceSet, at: DateTime<Utc>) {
        self.quantity += quantity;
        self.prices = prices;
        self.last_credited_at = at;
    }

    /// Return stock to the row without touching prices (order denial).
    pub fn restock(&mut self, quantity: i64) {
        self.quantity += quantity;
    }

    /// Reserve stock against a client order.
    pub fn debit(&mut self, quantity: i64) {
        self.quantity -= quantity;
    }

    /// Zero the row (remittance), returning what was held.
    pub fn debit_to_zero(&mut self) -> i64 {
        core::mem::replace(&mut self.quantity, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_overwrites_prices() {
        let mut holding = Holding::new(
            10,
            PriceSet {
                selling_price: Some(5000),
                ..PriceSet::EMPTY
            },
            Utc::now(),
        );

        holding.credit(
            5,
            PriceSet {
                selling_price: Some(5500),
                dealer_price: Some(4500),
                ..PriceSet::EMPTY
            },
            Utc::now(),
        );

        assert_eq!(holding.quantity, 15);
        assert_eq!(holding.prices.selling_price, Some(5500));
        assert_eq!(holding.prices.dealer_price, Some(4500));
    }

    #[test]
    fn restock_keeps_prices() {
        let prices = PriceSet {
            selling_price: Some(5000),
            ..PriceSet::EMPTY
        };
        let mut holding = Holding::new(10, prices, Utc::now());
        holding.debit(4);
        holding.restock(4);

        assert_eq!(holding.quantity, 10);
        assert_eq!(holding.prices, prices);
    }

    #[test]
    fn debit_to_zero_reports_what_was_held() {
        let mut holding = Holding::new(250, PriceSet::EMPTY, Utc::now());
        assert_eq!(holding.debit_to_zero(), 250);
        assert_eq!(holding.quantity, 0);
        assert_eq!(holding.debit_to_zero(), 0);
    }
}
