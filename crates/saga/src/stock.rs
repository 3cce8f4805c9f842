//! Stock reads and conditional writes with timeouts and conflict retries.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::Retryable;
use common::ProductId;
use thiserror::Error;

use crate::config::SagaConfig;
use crate::services::{InventoryError, InventoryGateway, ProductSnapshot};

/// Failure of a reservation attempt.
#[derive(Debug, Error)]
pub(crate) enum ReserveError {
    /// Fresh stock no longer covers the demand.
    #[error("only {available} left in stock")]
    Insufficient { available: i64 },
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl ReserveError {
    fn is_conflict(&self) -> bool {
        matches!(
            self,
            ReserveError::Inventory(InventoryError::Conflict { .. })
        )
    }
}

/// Bounds `call` by `limit`, reporting expiry as a timeout.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, InventoryError>>,
) -> Result<T, InventoryError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(InventoryError::Timeout(limit)),
    }
}

fn note_conflict(err: &InventoryError, delay: Duration) {
    metrics::counter!("saga_stock_conflicts_total").increment(1);
    tracing::debug!(error = %err, ?delay, "stock changed underneath us, retrying");
}

/// Stock operations against one gateway.
pub(crate) struct StockClient<'a, G: ?Sized> {
    gateway: &'a G,
    config: &'a SagaConfig,
}

impl<'a, G: InventoryGateway + ?Sized> StockClient<'a, G> {
    pub(crate) fn new(gateway: &'a G, config: &'a SagaConfig) -> Self {
        Self { gateway, config }
    }

    pub(crate) async fn read(&self, product: ProductId) -> Result<ProductSnapshot, InventoryError> {
        bounded(self.config.call_timeout, self.gateway.get_product(product)).await
    }

    async fn compare_and_set(
        &self,
        product: ProductId,
        expected: i64,
        new_stock: i64,
    ) -> Result<(), InventoryError> {
        bounded(
            self.config.call_timeout,
            self.gateway.compare_and_set_stock(product, expected, new_stock),
        )
        .await
    }

    /// Takes `quantity` from `product`, starting from the stock observed at
    /// check time.
    ///
    /// On a conflict the product is read again, sufficiency re-checked and
    /// the write retried, up to `conflict_retries` more times. Returns the
    /// stock the reservation was taken from.
    pub(crate) async fn reserve(
        &self,
        product: ProductId,
        quantity: i64,
        stock_at_check: i64,
    ) -> Result<i64, ReserveError> {
        let attempts = &AtomicUsize::new(0);

        let attempt = || async move {
            let stock = if attempts.fetch_add(1, Ordering::Relaxed) == 0 {
                stock_at_check
            } else {
                self.read(product).await?.stock
            };
            if stock < quantity {
                return Err(ReserveError::Insufficient { available: stock });
            }
            self.compare_and_set(product, stock, stock - quantity).await?;
            Ok(stock)
        };

        attempt
            .retry(self.config.conflict_backoff())
            .when(ReserveError::is_conflict)
            .notify(|err, delay| {
                if let ReserveError::Inventory(err) = err {
                    note_conflict(err, delay);
                }
            })
            .await
    }

    /// Takes `quantity` out of `product` starting from a fresh read. Used to
    /// withdraw stock that was handed back twice.
    pub(crate) async fn withdraw(
        &self,
        product: ProductId,
        quantity: i64,
    ) -> Result<i64, ReserveError> {
        let stock = self.read(product).await?.stock;
        self.reserve(product, quantity, stock).await
    }

    /// Undoes a reservation.
    ///
    /// Writes `stock_before` back if nobody touched the product since the
    /// reservation; otherwise falls back to [`give_back`](Self::give_back).
    /// Returns the resulting stock.
    pub(crate) async fn restore(
        &self,
        product: ProductId,
        quantity: i64,
        stock_before: i64,
    ) -> Result<i64, InventoryError> {
        match self.compare_and_set(product, stock_before - quantity, stock_before).await {
            Ok(()) => Ok(stock_before),
            Err(InventoryError::Conflict { .. }) => self.give_back(product, quantity).await,
            Err(e) => Err(e),
        }
    }

    /// Adds `quantity` on top of the current stock with a read and a
    /// conditional write, retrying on conflict. Returns the resulting stock.
    pub(crate) async fn give_back(
        &self,
        product: ProductId,
        quantity: i64,
    ) -> Result<i64, InventoryError> {
        let attempt = || async move {
            let stock = self.read(product).await?.stock;
            self.compare_and_set(product, stock, stock + quantity).await?;
            Ok(stock + quantity)
        };

        attempt
            .retry(self.config.conflict_backoff())
            .when(|e| matches!(e, InventoryError::Conflict { .. }))
            .notify(note_conflict)
            .await
    }
}

#[cfg(test)]
mod tests {
    use domain::Money;

    use super::*;
    use crate::services::{InMemoryInventory, InventoryCall};

    fn pid(id: i64) -> ProductId {
        ProductId::new(id).unwrap()
    }

    fn inventory(stock: i64) -> InMemoryInventory {
        InMemoryInventory::with_products([(pid(1), Money::from_cents(500), stock)])
    }

    #[tokio::test]
    async fn reserve_uses_snapshot_first() {
        let inv = inventory(5);
        let config = SagaConfig::default();
        let stock = StockClient::new(&inv, &config);

        assert_eq!(stock.reserve(pid(1), 2, 5).await.unwrap(), 5);
        assert_eq!(inv.stock_of(pid(1)).await, Some(3));
        assert_eq!(
            inv.calls().await,
            vec![InventoryCall::CompareAndSet {
                product_id: pid(1),
                expected: 5,
                new_stock: 3
            }]
        );
    }

    #[tokio::test]
    async fn reserve_rereads_after_conflict() {
        let inv = inventory(4);
        let config = SagaConfig::default();
        let stock = StockClient::new(&inv, &config);

        // Snapshot says 5, someone already took one.
        assert_eq!(stock.reserve(pid(1), 2, 5).await.unwrap(), 4);
        assert_eq!(inv.stock_of(pid(1)).await, Some(2));
    }

    #[tokio::test]
    async fn reserve_rechecks_sufficiency() {
        let inv = inventory(1);
        let config = SagaConfig::default();
        let stock = StockClient::new(&inv, &config);

        let err = stock.reserve(pid(1), 2, 5).await.unwrap_err();
        assert!(matches!(err, ReserveError::Insufficient { available: 1 }));
        assert_eq!(inv.stock_of(pid(1)).await, Some(1));
    }

    #[tokio::test]
    async fn reserve_gives_up_after_retries() {
        let inv = inventory(5);
        let config = SagaConfig::default().with_conflict_retries(0);
        let stock = StockClient::new(&inv, &config);

        let err = stock.reserve(pid(1), 1, 9).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(inv.stock_of(pid(1)).await, Some(5));
    }

    #[tokio::test]
    async fn restore_falls_back_to_give_back() {
        let inv = inventory(3);
        let config = SagaConfig::default();
        let stock = StockClient::new(&inv, &config);

        // Reserved 2 from 5 leaving 3.
        assert_eq!(stock.restore(pid(1), 2, 5).await.unwrap(), 5);

        // Someone took one more after our reservation: 5 - 2 - 1 = 2.
        inv.set_stock(pid(1), 2).await.unwrap();
        assert_eq!(stock.restore(pid(1), 2, 5).await.unwrap(), 4);
        assert_eq!(inv.stock_of(pid(1)).await, Some(4));
    }

    #[tokio::test]
    async fn withdraw_reads_fresh_stock() {
        let inv = inventory(7);
        let config = SagaConfig::default();
        let stock = StockClient::new(&inv, &config);

        assert_eq!(stock.withdraw(pid(1), 2).await.unwrap(), 7);
        assert_eq!(inv.stock_of(pid(1)).await, Some(5));

        let err = stock.withdraw(pid(1), 6).await.unwrap_err();
        assert_eq!(err.to_string(), "only 5 left in stock");
        assert_eq!(inv.stock_of(pid(1)).await, Some(5));
    }

    #[tokio::test]
    async fn reads_time_out() {
        let inv = inventory(3);
        inv.set_latency(Some(Duration::from_millis(200))).await;
        let config = SagaConfig::default().with_call_timeout(Duration::from_millis(20));
        let stock = StockClient::new(&inv, &config);

        assert!(matches!(
            stock.read(pid(1)).await,
            Err(InventoryError::Timeout(_))
        ));
    }
}
