//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a fulfillment saga, as reconstructed from its journal.
///
/// State transitions:
/// ```text
/// NotStarted ──► Reserving ──┬──► Completed
///                            ├──► Compensating ──► Failed
///                            └──► Failed
/// ```
///
/// A saga that stops in `Reserving` or `Compensating` was interrupted and is
/// picked up by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    NotStarted,

    /// Stock is being taken, one product at a time.
    Reserving,

    /// Reserved stock is being handed back.
    Compensating,

    /// The order was recorded (terminal state).
    Completed,

    /// Nothing is held any more and no order exists (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns true if the saga may still hold reserved stock.
    pub fn may_hold_stock(&self) -> bool {
        matches!(self, SagaState::Reserving | SagaState::Compensating)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Reserving => "Reserving",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
