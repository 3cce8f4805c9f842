//! Saga journal events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Progress records of one fulfillment saga run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Written before the first stock write.
    SagaStarted(SagaStartedData),

    /// One product's stock was taken.
    StockReserved(StockReservedData),

    /// A reservation was handed back.
    StockRestored(StockRestoredData),

    /// Handing back a reservation failed; the stock is still held.
    CompensationFailed(CompensationFailedData),

    /// The order was recorded.
    SagaCompleted(SagaCompletedData),

    /// The saga gave up and holds no stock.
    SagaFailed(SagaFailedData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub user_id: UserId,
    /// Aggregated quantity per distinct product.
    pub demand: Vec<DemandLine>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReservedData {
    pub product_id: ProductId,
    /// Stock the reservation was taken from.
    pub stock_before: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRestoredData {
    pub product_id: ProductId,
    pub quantity: i64,
    pub stock_after: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationFailedData {
    pub product_id: ProductId,
    pub quantity: i64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub order_id: OrderId,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl SagaEvent {
    /// Journal record type of this event.
    pub fn record_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StockReserved(_) => "StockReserved",
            SagaEvent::StockRestored(_) => "StockRestored",
            SagaEvent::CompensationFailed(_) => "CompensationFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }

    /// Returns true for the events that close a saga.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaEvent::SagaCompleted(_) | SagaEvent::SagaFailed(_))
    }

    pub fn saga_started(user_id: UserId, demand: &BTreeMap<ProductId, i64>) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            user_id,
            demand: demand
                .iter()
                .map(|(product_id, quantity)| DemandLine {
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect(),
            started_at: Utc::now(),
        })
    }

    pub fn stock_reserved(product_id: ProductId, stock_before: i64, quantity: i64) -> Self {
        SagaEvent::StockReserved(StockReservedData {
            product_id,
            stock_before,
            quantity,
        })
    }

    pub fn stock_restored(product_id: ProductId, quantity: i64, stock_after: i64) -> Self {
        SagaEvent::StockRestored(StockRestoredData {
            product_id,
            quantity,
            stock_after,
        })
    }

    pub fn compensation_failed(
        product_id: ProductId,
        quantity: i64,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationFailed(CompensationFailedData {
            product_id,
            quantity,
            error: error.into(),
        })
    }

    pub fn saga_completed(order_id: OrderId) -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            order_id,
            completed_at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}
