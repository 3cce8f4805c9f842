//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed
///           └──► Cancelled
/// ```
///
/// `Cancelled` is terminal. `Completed` can only stay `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Stock is reserved and the order is awaiting fulfillment. The only
    /// legal creation state.
    #[default]
    Pending,

    /// The order has been fulfilled.
    Completed,

    /// The order was cancelled and its stock returned (terminal state).
    Cancelled,
}

/// Non-identity edges of the status graph. Anything not listed here, other
/// than staying in the same status, is rejected.
const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Pending, OrderStatus::Completed),
    (OrderStatus::Pending, OrderStatus::Cancelled),
];

/// Outcome of looking a status change up in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target equals the current status; nothing to do.
    Unchanged(OrderStatus),

    /// A legal move to a different status.
    Advance { from: OrderStatus, to: OrderStatus },
}

impl Transition {
    /// Returns true if this transition cancels a live order, which means its
    /// reserved stock must be handed back.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Transition::Advance {
                to: OrderStatus::Cancelled,
                ..
            }
        )
    }

    /// The status the order ends up in.
    pub fn target(&self) -> OrderStatus {
        match self {
            Transition::Unchanged(status) => *status,
            Transition::Advance { to, .. } => *to,
        }
    }
}

impl OrderStatus {
    /// Every status value, in lifecycle order.
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Validates a move from `self` to `target` against the transition table.
    pub fn transition(self, target: OrderStatus) -> Result<Transition, OrderError> {
        if self == target {
            return Ok(Transition::Unchanged(self));
        }
        if TRANSITIONS.contains(&(self, target)) {
            return Ok(Transition::Advance {
                from: self,
                to: target,
            });
        }
        Err(OrderError::InvalidTransition {
            from: self,
            to: target,
        })
    }

    /// Returns true if no other status can follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use OrderStatus::{Cancelled, Completed, Pending};

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), Pending);
    }

    #[test]
    fn test_pending_can_advance() {
        assert_eq!(
            Pending.transition(Completed).unwrap(),
            Transition::Advance {
                from: Pending,
                to: Completed
            }
        );
        let cancel = Pending.transition(Cancelled).unwrap();
        assert!(cancel.is_cancellation());
        assert_eq!(cancel.target(), Cancelled);
    }

    #[test]
    fn test_identity_transitions_are_unchanged() {
        for status in OrderStatus::ALL {
            let t = status.transition(status).unwrap();
            assert_eq!(t, Transition::Unchanged(status));
            assert!(!t.is_cancellation());
        }
    }

    #[test]
    fn test_completed_cannot_be_cancelled() {
        let err = Completed.transition(Cancelled).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: Completed,
                to: Cancelled
            }
        ));
    }

    #[test]
    fn test_edges_outside_table_are_rejected() {
        assert!(Completed.transition(Pending).is_err());
        assert!(Cancelled.transition(Pending).is_err());
        assert!(Cancelled.transition(Completed).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!Pending.is_terminal());
        assert!(!Completed.is_terminal());
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn test_parse() {
        assert_eq!("pending".parse::<OrderStatus>().unwrap(), Pending);
        assert_eq!(" Cancelled ".parse::<OrderStatus>().unwrap(), Cancelled);
        assert_eq!("COMPLETED".parse::<OrderStatus>().unwrap(), Completed);
        assert!(matches!(
            "shipped".parse::<OrderStatus>(),
            Err(OrderError::UnknownStatus(s)) if s == "shipped"
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Pending.to_string(), "pending");
        assert_eq!(Completed.to_string(), "completed");
        assert_eq!(Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let deserialized: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, Cancelled);
    }
}
