use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Raised when a raw integer cannot be used as an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} id: {value} (must be greater than 0)")]
pub struct IdError {
    pub kind: &'static str,
    pub value: i64,
}

macro_rules! positive_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier, rejecting zero and negative values.
            pub fn new(value: i64) -> Result<Self, IdError> {
                if value <= 0 {
                    return Err(IdError { kind: $kind, value });
                }
                Ok(Self(value))
            }

            /// Returns the raw integer value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = IdError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

positive_id!(
    /// Identifier of a persisted order, assigned by the order store.
    OrderId,
    "order"
);

positive_id!(
    /// Identifier of the user who owns an order.
    UserId,
    "user"
);

positive_id!(
    /// Identifier of a product owned by the inventory service.
    ProductId,
    "product"
);

/// Unique identifier for one fulfillment saga run.
///
/// Wraps a UUID so journal records of different runs can never collide,
/// even across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Creates a new random saga ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a saga ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SagaId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_ids_are_accepted() {
        assert_eq!(ProductId::new(7).unwrap().as_i64(), 7);
        assert_eq!(UserId::new(1).unwrap().to_string(), "1");
    }

    #[test]
    fn zero_and_negative_ids_are_rejected() {
        let err = ProductId::new(0).unwrap_err();
        assert_eq!(err.kind, "product");
        assert_eq!(err.to_string(), "invalid product id: 0 (must be greater than 0)");
        assert!(OrderId::new(-3).is_err());
        assert!(UserId::try_from(-1).is_err());
    }

    #[test]
    fn ids_deserialize_through_validation() {
        let id: OrderId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_i64(), 42);
        assert!(serde_json::from_str::<OrderId>("0").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }

    #[test]
    fn saga_id_new_creates_unique_ids() {
        assert_ne!(SagaId::new(), SagaId::new());
    }

    #[test]
    fn saga_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        assert_eq!(SagaId::from_uuid(uuid).as_uuid(), uuid);
    }
}
