//! Order fulfillment saga.

use std::collections::BTreeMap;
use std::time::Instant;

use common::{ProductId, SagaId};
use domain::{CreateOrder, NewOrder, Order, OrderItem};
use order_store::{OrderStore, SagaJournal};

use crate::aggregate::Reservation;
use crate::config::SagaConfig;
use crate::error::{CompensationFailure, SagaError};
use crate::events::SagaEvent;
use crate::journal::SagaLog;
use crate::services::{InventoryError, InventoryGateway, ProductSnapshot};
use crate::stock::{ReserveError, StockClient};

/// Creates orders against a remote inventory with compensation instead of a
/// distributed commit.
///
/// One run:
/// 1. read every distinct product once
/// 2. check aggregated demand against the observed stock
/// 3. stamp item prices from the snapshots
/// 4. journal the start, then reserve product by product with conditional
///    writes, journaling each reservation
/// 5. persist the order
///
/// Any failure after the first reservation hands back everything taken so
/// far, in reverse order, and the caller sees the triggering error.
pub struct OrderFulfillmentSaga<G, S, J> {
    gateway: G,
    store: S,
    journal: J,
    config: SagaConfig,
}

impl<G, S, J> OrderFulfillmentSaga<G, S, J>
where
    G: InventoryGateway,
    S: OrderStore,
    J: SagaJournal,
{
    pub fn new(gateway: G, store: S, journal: J, config: SagaConfig) -> Self {
        Self {
            gateway,
            store,
            journal,
            config,
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Runs the saga for a validated command and returns the stored order.
    #[tracing::instrument(skip(self, command), fields(user_id = %command.user_id, saga_id = tracing::field::Empty))]
    pub async fn create_order(&self, command: CreateOrder) -> Result<Order, SagaError> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let saga_id = SagaId::new();
        tracing::Span::current().record("saga_id", tracing::field::display(saga_id));

        let result = self.run(saga_id, &command).await;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        match &result {
            Ok(order) => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(order_id = %order.id, duration, "saga completed successfully");
            }
            Err(e) => {
                metrics::counter!("saga_failed", "reason" => e.label()).increment(1);
                match e {
                    SagaError::InsufficientStock { .. } | SagaError::NotFound(_) => {
                        tracing::warn!(error = %e, "order rejected")
                    }
                    _ => tracing::error!(error = %e, duration, "saga failed"),
                }
            }
        }
        result
    }

    async fn run(&self, saga_id: SagaId, command: &CreateOrder) -> Result<Order, SagaError> {
        let stock = StockClient::new(&self.gateway, &self.config);
        let demand = command.demand();

        // 1. Snapshot every product. Nothing is held yet, so failures here
        //    need no compensation.
        let mut snapshots: BTreeMap<ProductId, ProductSnapshot> = BTreeMap::new();
        for product in demand.keys() {
            let snapshot = stock
                .read(*product)
                .await
                .map_err(|e| lookup_error(*product, e))?;
            snapshots.insert(*product, snapshot);
        }

        // 2. Check aggregated demand before any write.
        for (product, requested) in &demand {
            let available = snapshots.get(product).map_or(0, |s| s.stock);
            if *requested > available {
                return Err(SagaError::InsufficientStock {
                    product_id: *product,
                    requested: *requested,
                    available,
                });
            }
        }

        // 3. Inventory owns the price.
        let items = command
            .lines
            .iter()
            .map(|line| {
                snapshots
                    .get(&line.product_id)
                    .map(|s| OrderItem::new(line.product_id, line.quantity, s.price))
                    .ok_or_else(|| {
                        SagaError::Dependency(format!("no snapshot for product {}", line.product_id))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut log = SagaLog::start(&self.journal, saga_id, self.config.call_timeout);
        log.record(&SagaEvent::saga_started(command.user_id, &demand))
            .await
            .map_err(|e| SagaError::Persistence(format!("could not open saga journal: {e}")))?;

        // 4. Reserve in ascending product order. The ledger lives only for
        //    this run.
        let mut reserved: BTreeMap<ProductId, Reservation> = BTreeMap::new();
        for (product, quantity) in &demand {
            let stock_at_check = snapshots.get(product).map_or(0, |s| s.stock);

            let stock_before = match stock.reserve(*product, *quantity, stock_at_check).await {
                Ok(stock_before) => stock_before,
                Err(e) => {
                    if let ReserveError::Inventory(InventoryError::Timeout(limit)) = &e {
                        // The write may still have landed. Without a
                        // confirmed stock_before there is nothing safe to
                        // undo, so it is left for manual reconciliation.
                        metrics::counter!("saga_unconfirmed_reservations_total").increment(1);
                        CompensationFailure {
                            saga_id: Some(saga_id),
                            order_id: None,
                            product_id: *product,
                            quantity: *quantity,
                            intended_stock: None,
                            reason: format!(
                                "stock write timed out after {limit:?}; outcome unknown"
                            ),
                        }
                        .report();
                    }
                    let error = reservation_error(*product, *quantity, e, &self.config);
                    return Err(self.abort(&mut log, &stock, &reserved, error).await);
                }
            };

            tracing::debug!(
                product_id = %product,
                stock_before,
                quantity,
                "stock reserved"
            );
            reserved.insert(
                *product,
                Reservation {
                    stock_before,
                    quantity: *quantity,
                },
            );

            if let Err(e) = log
                .record(&SagaEvent::stock_reserved(*product, stock_before, *quantity))
                .await
            {
                let error = SagaError::Persistence(format!("could not journal reservation: {e}"));
                return Err(self.abort(&mut log, &stock, &reserved, error).await);
            }
        }

        // 5. Persist.
        let new_order = NewOrder::pending(command.user_id, items, saga_id);
        let created =
            tokio::time::timeout(self.config.call_timeout, self.store.create_order(new_order))
                .await;
        let order = match created {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                let error = SagaError::Persistence(e.to_string());
                return Err(self.abort(&mut log, &stock, &reserved, error).await);
            }
            Err(_) => {
                let error = SagaError::Dependency(format!(
                    "order store timed out after {:?}",
                    self.config.call_timeout
                ));
                return Err(self.abort(&mut log, &stock, &reserved, error).await);
            }
        };

        // The reconciler closes the saga if this write is lost.
        log.record_or_warn(&SagaEvent::saga_completed(order.id)).await;
        Ok(order)
    }

    /// Compensates everything in `reserved` and hands back `error`.
    ///
    /// If every reservation was returned the saga is closed as failed.
    /// Otherwise it stays open so the reconciler retries the rest.
    async fn abort(
        &self,
        log: &mut SagaLog<'_, J>,
        stock: &StockClient<'_, G>,
        reserved: &BTreeMap<ProductId, Reservation>,
        error: SagaError,
    ) -> SagaError {
        let mut failures = 0usize;

        for (product, reservation) in reserved.iter().rev() {
            match stock
                .restore(*product, reservation.quantity, reservation.stock_before)
                .await
            {
                Ok(stock_after) => {
                    tracing::info!(product_id = %product, stock_after, "reservation returned");
                    log.record_or_warn(&SagaEvent::stock_restored(
                        *product,
                        reservation.quantity,
                        stock_after,
                    ))
                    .await;
                }
                Err(e) => {
                    failures += 1;
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    CompensationFailure {
                        saga_id: Some(log.saga_id()),
                        order_id: None,
                        product_id: *product,
                        quantity: reservation.quantity,
                        intended_stock: Some(reservation.stock_before),
                        reason: e.to_string(),
                    }
                    .report();
                    log.record_or_warn(&SagaEvent::compensation_failed(
                        *product,
                        reservation.quantity,
                        e.to_string(),
                    ))
                    .await;
                }
            }
        }

        if failures == 0 {
            log.record_or_warn(&SagaEvent::saga_failed(error.to_string())).await;
        } else {
            tracing::warn!(
                failures,
                "saga left open; reconciler will retry returning stock"
            );
        }
        error
    }
}

/// Maps a failed product read before any reservation.
fn lookup_error(product: ProductId, err: InventoryError) -> SagaError {
    match err {
        InventoryError::NotFound(_) => SagaError::NotFound(format!("product not found: {product}")),
        other => SagaError::Dependency(format!("reading product {product}: {other}")),
    }
}

fn reservation_error(
    product: ProductId,
    quantity: i64,
    err: ReserveError,
    config: &SagaConfig,
) -> SagaError {
    match err {
        ReserveError::Insufficient { available } => SagaError::InsufficientStock {
            product_id: product,
            requested: quantity,
            available,
        },
        ReserveError::Inventory(InventoryError::Conflict { .. }) => SagaError::Dependency(format!(
            "stock of product {product} kept changing; gave up after {} retries",
            config.conflict_retries
        )),
        ReserveError::Inventory(e @ InventoryError::Timeout(_)) => {
            SagaError::Dependency(format!("reserving product {product}: {e}"))
        }
        ReserveError::Inventory(e) => {
            SagaError::Reservation(format!("reserving product {product}: {e}"))
        }
    }
}
