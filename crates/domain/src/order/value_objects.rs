//! Value objects for the order domain.

use common::ProductId;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Converts a decimal price, as reported by the inventory service, into
    /// cents, rounding to the nearest cent.
    ///
    /// Negative, non-finite and unrepresentably large values are rejected.
    pub fn from_decimal(amount: f64) -> Result<Self, OrderError> {
        let cents = (amount * 100.0).round();
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        if !cents.is_finite() || amount < 0.0 || cents >= i64::MAX as f64 {
            return Err(OrderError::InvalidPrice { price: amount });
        }
        Ok(Self {
            cents: cents as i64,
        })
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the amount as a decimal number of currency units.
    pub fn as_decimal(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Multiplies by a quantity, saturating at the representable bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A requested order line: what the caller wants, before prices are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A line item of a persisted order.
///
/// `price` is the unit price snapshotted from inventory when the order was
/// created. Later price changes in inventory never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit at order time.
    pub price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(product_id: ProductId, quantity: u32, price: Money) -> Self {
        Self {
            product_id,
            quantity,
            price,
        }
    }

    /// Returns the total price for this item (quantity * price).
    pub fn total_price(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: i64) -> ProductId {
        ProductId::new(id).unwrap()
    }

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_from_decimal_rounds_to_cents() {
        assert_eq!(Money::from_decimal(10.0).unwrap().cents(), 1000);
        assert_eq!(Money::from_decimal(19.99).unwrap().cents(), 1999);
        assert_eq!(Money::from_decimal(0.005).unwrap().cents(), 1);
        assert_eq!(Money::from_decimal(0.0).unwrap(), Money::zero());
    }

    #[test]
    fn test_money_from_decimal_rejects_negative_and_nan() {
        assert!(matches!(
            Money::from_decimal(-0.01),
            Err(OrderError::InvalidPrice { .. })
        ));
        assert!(Money::from_decimal(f64::NAN).is_err());
        assert!(Money::from_decimal(f64::INFINITY).is_err());
    }

    #[test]
    fn test_money_from_decimal_rejects_amounts_beyond_i64_cents() {
        assert!(matches!(
            Money::from_decimal(1e17),
            Err(OrderError::InvalidPrice { .. })
        ));
        assert!(Money::from_decimal(f64::MAX).is_err());
        assert_eq!(
            Money::from_decimal(1e15).unwrap().cents(),
            100_000_000_000_000_000
        );
    }

    #[test]
    fn test_money_arithmetic_saturates_instead_of_overflowing() {
        let huge = Money::from_cents(i64::MAX / 2 + 1);
        assert_eq!(huge.multiply(2).cents(), i64::MAX);
        assert_eq!((huge + huge).cents(), i64::MAX);

        let mut total = huge;
        total += huge;
        assert_eq!(total.cents(), i64::MAX);

        let item = OrderItem::new(pid(1), u32::MAX, Money::from_cents(i64::MAX / 3));
        let sum: Money = [item.total_price(), item.total_price()].into_iter().sum();
        assert_eq!(sum.cents(), i64::MAX);
    }

    #[test]
    fn test_money_as_decimal() {
        assert_eq!(Money::from_cents(1050).as_decimal(), 10.5);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 350);
    }

    #[test]
    fn test_order_item_total_price() {
        let item = OrderItem::new(pid(1), 3, Money::from_cents(1000));
        assert_eq!(item.total_price().cents(), 3000);
    }

    #[test]
    fn test_order_item_serialization() {
        let item = OrderItem::new(pid(9), 2, Money::from_cents(999));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["product_id"], 9);
        assert_eq!(json["price"], 999);
        let deserialized: OrderItem = serde_json::from_value(json).unwrap();
        assert_eq!(item, deserialized);
    }
}
