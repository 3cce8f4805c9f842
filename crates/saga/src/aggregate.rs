//! Saga instance rebuilt from its journal.

use std::collections::BTreeMap;

use common::{OrderId, ProductId, SagaId, UserId};
use order_store::{JournalRecord, Version};

use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::state::SagaState;

/// Stock taken from one product by a saga run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Stock observed right before the reservation was written.
    pub stock_before: i64,
    pub quantity: i64,
}

/// A fulfillment saga as described by its journal.
///
/// Tracks which reservations are still outstanding so an interrupted run can
/// be compensated later.
#[derive(Debug, Clone, Default)]
pub struct SagaInstance {
    id: Option<SagaId>,
    version: Version,
    state: SagaState,
    user_id: Option<UserId>,
    outstanding: BTreeMap<ProductId, Reservation>,
    order_id: Option<OrderId>,
    failure_reason: Option<String>,
}

impl SagaInstance {
    /// Replays journal records in order.
    pub fn replay(records: &[JournalRecord]) -> Result<Self, SagaError> {
        let mut saga = SagaInstance::default();
        for record in records {
            let event: SagaEvent = serde_json::from_value(record.payload.clone()).map_err(|e| {
                SagaError::Persistence(format!(
                    "undecodable journal record {} v{}: {e}",
                    record.saga_id, record.version
                ))
            })?;
            saga.id = Some(record.saga_id);
            saga.version = record.version;
            saga.apply(event);
        }
        Ok(saga)
    }

    pub fn apply(&mut self, event: SagaEvent) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.user_id = Some(data.user_id);
                self.state = SagaState::Reserving;
            }
            SagaEvent::StockReserved(data) => {
                self.outstanding.insert(
                    data.product_id,
                    Reservation {
                        stock_before: data.stock_before,
                        quantity: data.quantity,
                    },
                );
            }
            SagaEvent::StockRestored(data) => {
                self.outstanding.remove(&data.product_id);
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationFailed(data) => {
                // Reservation stays outstanding for the next attempt.
                self.failure_reason = Some(data.error);
                self.state = SagaState::Compensating;
            }
            SagaEvent::SagaCompleted(data) => {
                self.order_id = Some(data.order_id);
                self.state = SagaState::Completed;
            }
            SagaEvent::SagaFailed(data) => {
                self.outstanding.clear();
                self.failure_reason = Some(data.reason);
                self.state = SagaState::Failed;
            }
        }
    }
}

// Query methods
impl SagaInstance {
    pub fn id(&self) -> Option<SagaId> {
        self.id
    }

    /// Version of the last replayed record.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Reservations not yet handed back, ascending by product.
    pub fn outstanding(&self) -> &BTreeMap<ProductId, Reservation> {
        &self.outstanding
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}
