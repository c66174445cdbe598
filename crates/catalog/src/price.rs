use serde::{Deserialize, Serialize};

use tierstock_core::{DomainError, ValueObject};

/// The four price points a variant can carry down the custody chain.
///
/// Which fields an allocation must supply depends on the tier of the
/// receiving custodian; that dispatch lives with the ledger. Here the
/// field names double as the `field` detail in pricing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    UnitCost,
    DealerPrice,
    SellingPrice,
    RetailPrice,
}

impl PriceField {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceField::UnitCost => "unit_cost",
            PriceField::DealerPrice => "dealer_price",
            PriceField::SellingPrice => "selling_price",
            PriceField::RetailPrice => "retail_price",
        }
    }
}

impl core::fmt::Display for PriceField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tiered prices in the smallest currency unit (e.g., centavos).
///
/// All fields are optional: a variant registered without prices is
/// legal, and allocation-time validation decides which fields are
/// mandatory for the receiving tier. A present field must be positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSet {
    pub unit_cost: Option<u64>,
    pub dealer_price: Option<u64>,
    pub selling_price: Option<u64>,
    pub retail_price: Option<u64>,
}

impl ValueObject for PriceSet {}

impl PriceSet {
    pub const EMPTY: PriceSet = PriceSet {
        unit_cost: None,
        dealer_price: None,
        selling_price: None,
        retail_price: None,
    };

    pub fn get(&self, field: PriceField) -> Option<u64> {
        match field {
            PriceField::UnitCost => self.unit_cost,
            PriceField::DealerPrice => self.dealer_price,
            PriceField::SellingPrice => self.selling_price,
            PriceField::RetailPrice => self.retail_price,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Reject zero values: a price point is either absent or positive.
    pub fn validate(&self, variant: impl core::fmt::Display) -> Result<(), DomainError> {
        for field in [
            PriceField::UnitCost,
            PriceField::DealerPrice,
            PriceField::SellingPrice,
            PriceField::RetailPrice,
        ] {
            if self.get(field) == Some(0) {
                return Err(DomainError::validation(format!(
                    "{field} for variant {variant} must be positive when present"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_set_is_valid() {
        assert!(PriceSet::EMPTY.validate("v").is_ok());
        assert!(PriceSet::EMPTY.is_empty());
    }

    #[test]
    fn zero_price_is_rejected() {
        let prices = PriceSet {
            selling_price: Some(0),
            ..PriceSet::EMPTY
        };
        let err = prices.validate("v").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    fn price_option() -> impl Strategy<Value = Option<u64>> {
        prop_oneof![Just(None), (0u64..10_000).prop_map(Some)]
    }

    proptest! {
        #[test]
        fn validate_accepts_exactly_the_zero_free_sets(
            unit_cost in price_option(),
            dealer_price in price_option(),
            selling_price in price_option(),
            retail_price in price_option(),
        ) {
            let prices = PriceSet { unit_cost, dealer_price, selling_price, retail_price };
            let has_zero = [unit_cost, dealer_price, selling_price, retail_price]
                .iter()
                .any(|p| *p == Some(0));
            prop_assert_eq!(prices.validate("v").is_ok(), !has_zero);
        }
    }
}
