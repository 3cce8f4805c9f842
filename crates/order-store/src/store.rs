use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, Page, SagaId, UserId};
use domain::{NewOrder, Order, OrderStatus};

use crate::Result;

/// Transactional persistence for orders.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order header and all of its items as one atomic unit and
    /// returns the stored order with its assigned id and timestamps.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Loads an order with its items. Fails with `NotFound` if absent.
    async fn get_order(&self, id: OrderId) -> Result<Order>;

    /// Moves the order from `expected` to `status`, bumps `updated_at` and
    /// returns the order.
    ///
    /// The check and the write are one atomic step. Fails with `NotFound` if
    /// absent and with `StatusChanged` if the order is no longer in
    /// `expected`.
    async fn set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<Order>;

    /// Orders of one user, newest first.
    async fn list_by_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>>;

    /// The order created by a given saga run, if that run got far enough.
    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Order>>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        (**self).create_order(order).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        (**self).get_order(id).await
    }

    async fn set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<Order> {
        (**self).set_status(id, expected, status).await
    }

    async fn list_by_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>> {
        (**self).list_by_user(user_id, page).await
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Order>> {
        (**self).find_by_saga(saga_id).await
    }
}
