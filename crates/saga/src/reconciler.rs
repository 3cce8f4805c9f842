//! Periodic sweep that closes sagas a crashed or interrupted run left open.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use common::SagaId;
use order_store::{OrderStore, SagaJournal};

use crate::aggregate::SagaInstance;
use crate::config::SagaConfig;
use crate::error::{CompensationFailure, SagaError};
use crate::events::SagaEvent;
use crate::journal::SagaLog;
use crate::services::InventoryGateway;
use crate::stock::StockClient;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Open sagas older than the grace period.
    pub examined: usize,
    /// Closed as completed because their order exists.
    pub completed: usize,
    /// Closed as failed after every reservation was returned.
    pub compensated: usize,
    /// Left open for the next sweep.
    pub still_open: usize,
}

enum Resolution {
    Completed,
    Compensated,
    StillOpen,
}

/// Finishes sagas from their journal.
///
/// A saga whose order was persisted is closed as completed. Any other open
/// saga gets its outstanding reservations handed back and is closed as
/// failed. When a restore fails the saga stays open and the next sweep tries
/// again, so returned stock is at least once, never exactly once.
///
/// `grace` must be longer than any live saga run, otherwise the sweep
/// compensates a run that is still making progress.
pub struct SagaReconciler<G, S, J> {
    gateway: G,
    store: S,
    journal: J,
    config: SagaConfig,
}

impl<G, S, J> SagaReconciler<G, S, J>
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

    /// Resolves every open saga started more than `grace` ago.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, grace: Duration) -> Result<SweepReport, SagaError> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|e| SagaError::Validation(format!("grace period out of range: {e}")))?;
        let cutoff = Utc::now() - grace;

        let open = self
            .journal
            .open_sagas(cutoff)
            .await
            .map_err(|e| SagaError::Persistence(e.to_string()))?;

        let mut report = SweepReport {
            examined: open.len(),
            ..Default::default()
        };

        for saga_id in open {
            match self.resolve(saga_id).await {
                Ok(Resolution::Completed) => report.completed += 1,
                Ok(Resolution::Compensated) => report.compensated += 1,
                Ok(Resolution::StillOpen) => report.still_open += 1,
                Err(e) => {
                    tracing::warn!(saga_id = %saga_id, error = %e, "could not reconcile saga");
                    report.still_open += 1;
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                completed = report.completed,
                compensated = report.compensated,
                still_open = report.still_open,
                "reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    async fn resolve(&self, saga_id: SagaId) -> Result<Resolution, SagaError> {
        let records = self
            .journal
            .load(saga_id)
            .await
            .map_err(|e| SagaError::Persistence(e.to_string()))?;
        let saga = SagaInstance::replay(&records)?;
        let mut log = SagaLog::resume(
            &self.journal,
            saga_id,
            saga.version(),
            self.config.call_timeout,
        );

        if let Some(order) = self
            .store
            .find_by_saga(saga_id)
            .await
            .map_err(SagaError::from_store)?
        {
            log.record(&SagaEvent::saga_completed(order.id))
                .await
                .map_err(|e| SagaError::Persistence(e.to_string()))?;
            metrics::counter!("saga_reconciled_total", "outcome" => "completed").increment(1);
            tracing::info!(saga_id = %saga_id, order_id = %order.id, "saga closed as completed");
            return Ok(Resolution::Completed);
        }

        let stock = StockClient::new(&self.gateway, &self.config);
        let mut failures = 0usize;

        for (product, reservation) in saga.outstanding().iter().rev() {
            match stock
                .restore(*product, reservation.quantity, reservation.stock_before)
                .await
            {
                Ok(stock_after) => {
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
                        saga_id: Some(saga_id),
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

        if failures > 0 {
            return Ok(Resolution::StillOpen);
        }

        let reason = saga
            .failure_reason()
            .unwrap_or("abandoned before completion")
            .to_string();
        log.record(&SagaEvent::saga_failed(reason))
            .await
            .map_err(|e| SagaError::Persistence(e.to_string()))?;
        metrics::counter!("saga_reconciled_total", "outcome" => "compensated").increment(1);
        tracing::info!(saga_id = %saga_id, "saga closed as failed");
        Ok(Resolution::Compensated)
    }

    /// Sweeps every `interval` until `shutdown` resolves.
    pub async fn run(
        &self,
        interval: Duration,
        grace: Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("saga reconciler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(grace).await {
                        tracing::warn!(error = %e, "reconciliation sweep failed");
                    }
                }
            }
        }
    }
}
