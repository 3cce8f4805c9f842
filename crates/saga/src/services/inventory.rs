//! Inventory gateway contract and in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use domain::Money;
use thiserror::Error;
use tokio::sync::{Barrier, Mutex};

/// Product state as reported by the inventory service at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub price: Money,
    pub stock: i64,
}

/// Errors reported by an inventory gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("product not found: {0}")]
    NotFound(ProductId),

    /// The inventory service rejected the request, e.g. a negative stock.
    #[error("invalid inventory request: {0}")]
    Validation(String),

    /// A conditional write found a different stock value than expected.
    #[error("stock of product {product_id} changed: expected {expected}, found {actual}")]
    Conflict {
        product_id: ProductId,
        expected: i64,
        actual: i64,
    },

    #[error("inventory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("inventory service unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected inventory response: {0}")]
    InvalidResponse(String),
}

/// Remote interface of the inventory service.
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Reads price and stock of a product.
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot, InventoryError>;

    /// Overwrites the stock with an absolute value.
    ///
    /// Last writer wins. Callers computing `new_stock` from an earlier read
    /// race with every other writer; prefer [`compare_and_set_stock`].
    ///
    /// [`compare_and_set_stock`]: InventoryGateway::compare_and_set_stock
    async fn set_stock(&self, id: ProductId, new_stock: i64) -> Result<(), InventoryError>;

    /// Writes `new_stock` only if the current stock equals `expected`,
    /// otherwise fails with [`InventoryError::Conflict`].
    async fn compare_and_set_stock(
        &self,
        id: ProductId,
        expected: i64,
        new_stock: i64,
    ) -> Result<(), InventoryError>;
}

#[async_trait]
impl<T: InventoryGateway + ?Sized> InventoryGateway for Arc<T> {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot, InventoryError> {
        (**self).get_product(id).await
    }

    async fn set_stock(&self, id: ProductId, new_stock: i64) -> Result<(), InventoryError> {
        (**self).set_stock(id, new_stock).await
    }

    async fn compare_and_set_stock(
        &self,
        id: ProductId,
        expected: i64,
        new_stock: i64,
    ) -> Result<(), InventoryError> {
        (**self).compare_and_set_stock(id, expected, new_stock).await
    }
}

/// A call received by [`InMemoryInventory`], in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryCall {
    GetProduct(ProductId),
    SetStock {
        product_id: ProductId,
        new_stock: i64,
    },
    CompareAndSet {
        product_id: ProductId,
        expected: i64,
        new_stock: i64,
    },
}

impl InventoryCall {
    pub fn product_id(&self) -> ProductId {
        match self {
            InventoryCall::GetProduct(id) => *id,
            InventoryCall::SetStock { product_id, .. }
            | InventoryCall::CompareAndSet { product_id, .. } => *product_id,
        }
    }

    /// Returns true for calls that modify stock.
    pub fn is_write(&self) -> bool {
        !matches!(self, InventoryCall::GetProduct(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct Product {
    price: Money,
    stock: i64,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    products: BTreeMap<ProductId, Product>,
    calls: Vec<InventoryCall>,
    failing_reads: HashMap<ProductId, InventoryError>,
    /// product -> number of writes still allowed before every write fails
    failing_writes: HashMap<ProductId, usize>,
    latency: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
    barrier_reads_left: usize,
}

/// In-memory inventory service for testing.
///
/// Besides holding stock it records every call it receives and supports
/// fault injection: per-product read and write failures, artificial latency
/// and a read barrier that makes concurrent callers rendezvous after reading.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<Mutex<InMemoryInventoryState>>,
}

impl InMemoryInventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory holding the given `(product, price, stock)` rows.
    pub fn with_products(products: impl IntoIterator<Item = (ProductId, Money, i64)>) -> Self {
        let state = InMemoryInventoryState {
            products: products
                .into_iter()
                .map(|(id, price, stock)| (id, Product { price, stock }))
                .collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Adds or replaces a product.
    pub async fn upsert_product(&self, id: ProductId, price: Money, stock: i64) {
        self.state
            .lock()
            .await
            .products
            .insert(id, Product { price, stock });
    }

    /// Current stock of a product.
    pub async fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.state.lock().await.products.get(&id).map(|p| p.stock)
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<InventoryCall> {
        self.state.lock().await.calls.clone()
    }

    /// Stock-modifying calls received so far.
    pub async fn writes(&self) -> Vec<InventoryCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .copied()
            .filter(InventoryCall::is_write)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Makes reads of `id` fail with `error`.
    pub async fn fail_reads_of(&self, id: ProductId, error: InventoryError) {
        self.state.lock().await.failing_reads.insert(id, error);
    }

    /// Lets the next `allowed` writes to `id` through, then fails every
    /// further write with `Unavailable`.
    pub async fn fail_writes_of(&self, id: ProductId, allowed: usize) {
        self.state.lock().await.failing_writes.insert(id, allowed);
    }

    /// Removes all injected failures.
    pub async fn heal(&self) {
        let mut state = self.state.lock().await;
        state.failing_reads.clear();
        state.failing_writes.clear();
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Makes the next `parties` reads wait for each other before returning.
    ///
    /// Two concurrent sagas reading the same product then both act on the
    /// same snapshot, which is exactly the interleaving that loses updates
    /// with absolute writes.
    pub async fn set_read_barrier(&self, parties: usize) {
        let mut state = self.state.lock().await;
        state.barrier = Some(Arc::new(Barrier::new(parties)));
        state.barrier_reads_left = parties;
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_write(
        state: &mut InMemoryInventoryState,
        id: ProductId,
        new_stock: i64,
    ) -> Result<(), InventoryError> {
        if let Some(allowed) = state.failing_writes.get_mut(&id) {
            if *allowed == 0 {
                return Err(InventoryError::Unavailable(format!(
                    "injected write failure for product {id}"
                )));
            }
            *allowed -= 1;
        }
        if new_stock < 0 {
            return Err(InventoryError::Validation(format!(
                "stock cannot be negative: {new_stock}"
            )));
        }
        if !state.products.contains_key(&id) {
            return Err(InventoryError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryGateway for InMemoryInventory {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot, InventoryError> {
        self.simulate_latency().await;

        let (result, barrier) = {
            let mut state = self.state.lock().await;
            state.calls.push(InventoryCall::GetProduct(id));

            let result = match state.failing_reads.get(&id) {
                Some(error) => Err(error.clone()),
                None => state
                    .products
                    .get(&id)
                    .map(|p| ProductSnapshot {
                        product_id: id,
                        price: p.price,
                        stock: p.stock,
                    })
                    .ok_or(InventoryError::NotFound(id)),
            };

            let barrier = if state.barrier_reads_left > 0 {
                state.barrier_reads_left -= 1;
                state.barrier.clone()
            } else {
                None
            };
            (result, barrier)
        };

        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        result
    }

    async fn set_stock(&self, id: ProductId, new_stock: i64) -> Result<(), InventoryError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(InventoryCall::SetStock {
            product_id: id,
            new_stock,
        });

        Self::check_write(&mut state, id, new_stock)?;
        if let Some(product) = state.products.get_mut(&id) {
            product.stock = new_stock;
        }
        Ok(())
    }

    async fn compare_and_set_stock(
        &self,
        id: ProductId,
        expected: i64,
        new_stock: i64,
    ) -> Result<(), InventoryError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.calls.push(InventoryCall::CompareAndSet {
            product_id: id,
            expected,
            new_stock,
        });

        Self::check_write(&mut state, id, new_stock)?;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(InventoryError::NotFound(id))?;
        if product.stock != expected {
            return Err(InventoryError::Conflict {
                product_id: id,
                expected,
                actual: product.stock,
            });
        }
        product.stock = new_stock;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: i64) -> ProductId {
        ProductId::new(id).unwrap()
    }

    fn inventory() -> InMemoryInventory {
        InMemoryInventory::with_products([(pid(1), Money::from_cents(1000), 5)])
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let inv = inventory();
        let snap = inv.get_product(pid(1)).await.unwrap();
        assert_eq!(snap.stock, 5);
        assert_eq!(snap.price.cents(), 1000);

        inv.set_stock(pid(1), 2).await.unwrap();
        assert_eq!(inv.stock_of(pid(1)).await, Some(2));
        assert_eq!(
            inv.calls().await,
            vec![
                InventoryCall::GetProduct(pid(1)),
                InventoryCall::SetStock {
                    product_id: pid(1),
                    new_stock: 2
                }
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let inv = inventory();
        assert_eq!(
            inv.get_product(pid(9)).await,
            Err(InventoryError::NotFound(pid(9)))
        );
        assert_eq!(
            inv.set_stock(pid(9), 1).await,
            Err(InventoryError::NotFound(pid(9)))
        );
    }

    #[tokio::test]
    async fn test_negative_stock_rejected() {
        let inv = inventory();
        assert!(matches!(
            inv.set_stock(pid(1), -1).await,
            Err(InventoryError::Validation(_))
        ));
        assert_eq!(inv.stock_of(pid(1)).await, Some(5));
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let inv = inventory();
        inv.compare_and_set_stock(pid(1), 5, 3).await.unwrap();
        assert_eq!(inv.stock_of(pid(1)).await, Some(3));

        let err = inv.compare_and_set_stock(pid(1), 5, 1).await.unwrap_err();
        assert_eq!(
            err,
            InventoryError::Conflict {
                product_id: pid(1),
                expected: 5,
                actual: 3
            }
        );
        assert_eq!(inv.stock_of(pid(1)).await, Some(3));
    }

    #[tokio::test]
    async fn test_fail_writes_after_allowance() {
        let inv = inventory();
        inv.fail_writes_of(pid(1), 1).await;

        inv.set_stock(pid(1), 4).await.unwrap();
        assert!(matches!(
            inv.set_stock(pid(1), 3).await,
            Err(InventoryError::Unavailable(_))
        ));
        assert_eq!(inv.stock_of(pid(1)).await, Some(4));

        inv.heal().await;
        inv.set_stock(pid(1), 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_reads() {
        let inv = inventory();
        inv.fail_reads_of(pid(1), InventoryError::Unavailable("down".into()))
            .await;
        assert!(inv.get_product(pid(1)).await.is_err());
    }
}
