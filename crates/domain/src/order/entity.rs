//! Persisted order records.

use chrono::{DateTime, Utc};
use common::{OrderId, SagaId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderItem, OrderStatus};

/// An order as recorded by the order store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,

    /// Saga run that created the order. Absent only for rows written by
    /// something other than the fulfillment saga.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saga_id: Option<SagaId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the total amount of the order.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
    }

    /// Returns the number of line items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// An order that has not been stored yet. The store assigns id and
/// timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub saga_id: Option<SagaId>,
}

impl NewOrder {
    /// A fresh `pending` order owned by a saga run.
    pub fn pending(user_id: UserId, items: Vec<OrderItem>, saga_id: SagaId) -> Self {
        Self {
            user_id,
            items,
            status: OrderStatus::Pending,
            saga_id: Some(saga_id),
        }
    }

    /// Materializes the record with store-assigned identity.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            id,
            user_id: self.user_id,
            items: self.items,
            status: self.status,
            saga_id: self.saga_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;

    #[test]
    fn test_into_order_keeps_items_and_status() {
        let items = vec![
            OrderItem::new(ProductId::new(1).unwrap(), 2, Money::from_cents(1000)),
            OrderItem::new(ProductId::new(2).unwrap(), 1, Money::from_cents(250)),
        ];
        let saga_id = SagaId::new();
        let now = Utc::now();
        let order = NewOrder::pending(UserId::new(3).unwrap(), items.clone(), saga_id)
            .into_order(OrderId::new(11).unwrap(), now);

        assert_eq!(order.id.as_i64(), 11);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items, items);
        assert_eq!(order.saga_id, Some(saga_id));
        assert_eq!(order.created_at, order.updated_at);
        assert_eq!(order.total_amount().cents(), 2250);
        assert_eq!(order.item_count(), 2);
    }
}
