//! Order status transitions.

use std::future::Future;

use common::OrderId;
use domain::{Order, OrderItem, OrderStatus};
use order_store::{OrderStore, StoreError};

use crate::config::SagaConfig;
use crate::error::{CompensationFailure, SagaError};
use crate::services::InventoryGateway;
use crate::stock::StockClient;

/// Moves persisted orders through the status graph and returns stock when an
/// order is cancelled.
pub struct OrderLifecycle<G, S> {
    gateway: G,
    store: S,
    config: SagaConfig,
}

impl<G, S> OrderLifecycle<G, S>
where
    G: InventoryGateway,
    S: OrderStore,
{
    pub fn new(gateway: G, store: S, config: SagaConfig) -> Self {
        Self {
            gateway,
            store,
            config,
        }
    }

    /// Applies `target` to the order.
    ///
    /// Staying in the current status is a no-op that returns the order
    /// untouched. Cancelling a live order first hands every item's quantity
    /// back to inventory, best effort: a failed restock is logged and the
    /// cancellation still goes through.
    ///
    /// The status write only lands if the order is still in the status it
    /// was read in. When a concurrent update wins, the stock this call
    /// returned is withdrawn again and the transition is re-evaluated
    /// against the fresh status, so a cancellation returns stock once.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, target = %target))]
    pub async fn transition_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order, SagaError> {
        loop {
            let order = self
                .with_store_timeout(self.store.get_order(order_id))
                .await?;

            let transition = order.status.transition(target).inspect_err(|e| {
                tracing::warn!(current = %order.status, error = %e, "transition rejected");
            })?;

            if transition.target() == order.status {
                tracing::debug!(status = %order.status, "status unchanged");
                return Ok(order);
            }

            let restocked = if transition.is_cancellation() {
                self.restock(&order).await
            } else {
                Vec::new()
            };

            let written = tokio::time::timeout(
                self.config.call_timeout,
                self.store.set_status(order_id, order.status, target),
            )
            .await;

            let updated = match written {
                Ok(Ok(updated)) => updated,
                Ok(Err(StoreError::StatusChanged { actual, .. })) => {
                    metrics::counter!("order_status_conflicts_total").increment(1);
                    tracing::info!(
                        read = %order.status,
                        actual = %actual,
                        "status changed concurrently, re-evaluating"
                    );
                    self.withdraw(&order, &restocked).await;
                    continue;
                }
                Ok(Err(e)) => {
                    let err = SagaError::from_store(e);
                    Self::report_stranded_restock(&order, &restocked, &err);
                    return Err(err);
                }
                Err(_) => {
                    let err = self.store_timeout();
                    Self::report_stranded_restock(&order, &restocked, &err);
                    return Err(err);
                }
            };

            if transition.is_cancellation() {
                metrics::counter!("order_cancellations_total").increment(1);
            }
            tracing::info!(from = %order.status, to = %updated.status, "order status changed");
            return Ok(updated);
        }
    }

    fn report_stranded_restock(order: &Order, restocked: &[OrderItem], err: &SagaError) {
        if !restocked.is_empty() {
            tracing::error!(
                order_id = %order.id,
                status = %order.status,
                error = %err,
                "stock was returned but the order keeps its previous status"
            );
        }
    }

    /// Returns every item's quantity on top of the current stock. Items are
    /// independent; one failing does not stop the others. Returns the items
    /// whose stock actually went back.
    async fn restock(&self, order: &Order) -> Vec<OrderItem> {
        let stock = StockClient::new(&self.gateway, &self.config);
        let mut restocked = Vec::with_capacity(order.items.len());

        for item in &order.items {
            let quantity = i64::from(item.quantity);
            match stock.give_back(item.product_id, quantity).await {
                Ok(stock_after) => {
                    tracing::debug!(
                        product_id = %item.product_id,
                        quantity,
                        stock_after,
                        "stock returned"
                    );
                    restocked.push(item.clone());
                }
                Err(e) => {
                    metrics::counter!("order_restock_failures_total").increment(1);
                    CompensationFailure {
                        saga_id: order.saga_id,
                        order_id: Some(order.id),
                        product_id: item.product_id,
                        quantity,
                        intended_stock: None,
                        reason: e.to_string(),
                    }
                    .report();
                }
            }
        }
        restocked
    }

    /// Takes back stock returned by a cancellation that lost the status
    /// write to another update.
    async fn withdraw(&self, order: &Order, restocked: &[OrderItem]) {
        let stock = StockClient::new(&self.gateway, &self.config);

        for item in restocked {
            let quantity = i64::from(item.quantity);
            if let Err(e) = stock.withdraw(item.product_id, quantity).await {
                metrics::counter!("order_restock_failures_total").increment(1);
                CompensationFailure {
                    saga_id: order.saga_id,
                    order_id: Some(order.id),
                    product_id: item.product_id,
                    quantity,
                    intended_stock: None,
                    reason: format!("withdrawing a duplicate restock: {e}"),
                }
                .report();
            }
        }
    }

    fn store_timeout(&self) -> SagaError {
        SagaError::Dependency(format!(
            "order store timed out after {:?}",
            self.config.call_timeout
        ))
    }

    async fn with_store_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SagaError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result.map_err(SagaError::from_store),
            Err(_) => Err(self.store_timeout()),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{ProductId, UserId};
    use domain::{Money, NewOrder};
    use order_store::InMemoryOrderStore;

    use super::*;
    use crate::services::InMemoryInventory;

    fn pid(id: i64) -> ProductId {
        ProductId::new(id).unwrap()
    }

    async fn setup(
        stock: i64,
    ) -> (
        OrderLifecycle<InMemoryInventory, InMemoryOrderStore>,
        InMemoryInventory,
        InMemoryOrderStore,
        Order,
    ) {
        let inventory = InMemoryInventory::with_products([(pid(1), Money::from_cents(1000), stock)]);
        let store = InMemoryOrderStore::new();
        let order = store
            .create_order(NewOrder {
                user_id: UserId::new(1).unwrap(),
                items: vec![OrderItem::new(pid(1), 2, Money::from_cents(1000))],
                status: OrderStatus::Pending,
                saga_id: None,
            })
            .await
            .unwrap();
        let lifecycle =
            OrderLifecycle::new(inventory.clone(), store.clone(), SagaConfig::default());
        (lifecycle, inventory, store, order)
    }

    #[tokio::test]
    async fn completing_does_not_touch_stock() {
        let (lifecycle, inventory, _, order) = setup(3).await;

        let updated = lifecycle
            .transition_status(order.id, OrderStatus::Completed)
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Completed);
        assert!(inventory.calls().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (lifecycle, _, _, _) = setup(3).await;
        let err = lifecycle
            .transition_status(OrderId::new(999).unwrap(), OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_failure_after_restock_is_persistence_error() {
        let (lifecycle, inventory, store, order) = setup(3).await;
        store.set_fail_on_set_status(true).await;

        let err = lifecycle
            .transition_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::Persistence(_)));
        // The restock already happened and is not undone.
        assert_eq!(inventory.stock_of(pid(1)).await, Some(5));
        assert_eq!(
            store.get_order(order.id).await.unwrap().status,
            OrderStatus::Pending
        );
    }
}
