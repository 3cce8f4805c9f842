//! Order commands.
//!
//! Commands arrive with raw integers straight off the wire. Validation turns
//! them into typed lines before anything touches inventory.

use std::collections::BTreeMap;

use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderLine};

/// One requested line as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: i64,
    pub quantity: i64,

    /// Client-supplied unit price. Ignored in favour of the inventory price,
    /// but a negative value is still rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl LineRequest {
    pub fn new(product_id: i64, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            price: None,
        }
    }
}

/// Command to create a new order from validated lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    /// The user placing the order.
    pub user_id: UserId,

    /// Requested lines in caller order. Never empty.
    pub lines: Vec<OrderLine>,
}

impl CreateOrder {
    /// Validates raw caller input.
    ///
    /// Errors name the index of the first offending line.
    pub fn parse(user_id: i64, lines: &[LineRequest]) -> Result<Self, OrderError> {
        let user_id = UserId::new(user_id)?;
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }

        let lines = lines
            .iter()
            .enumerate()
            .map(|(index, line)| validate_line(index, line))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { user_id, lines })
    }

    /// Sums the requested quantity per distinct product.
    ///
    /// Products iterate in ascending id order, which is also the order
    /// reservations are taken in.
    pub fn demand(&self) -> BTreeMap<ProductId, i64> {
        let mut demand = BTreeMap::new();
        for line in &self.lines {
            *demand.entry(line.product_id).or_insert(0) += i64::from(line.quantity);
        }
        demand
    }

    /// Distinct products referenced by the order, ascending.
    pub fn products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.demand().into_keys()
    }
}

fn validate_line(index: usize, line: &LineRequest) -> Result<OrderLine, OrderError> {
    let product_id = ProductId::new(line.product_id).map_err(|_| OrderError::InvalidLine {
        index,
        reason: format!("product id must be greater than 0, got {}", line.product_id),
    })?;

    let quantity = u32::try_from(line.quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| OrderError::InvalidLine {
            index,
            reason: format!("quantity must be between 1 and {}, got {}", u32::MAX, line.quantity),
        })?;

    if let Some(price) = line.price
        && (price.is_nan() || price < 0.0)
    {
        return Err(OrderError::InvalidLine {
            index,
            reason: format!("price must not be negative, got {price}"),
        });
    }

    Ok(OrderLine::new(product_id, quantity))
}
