//! Identifier and paging types shared by every crate of the order service.

pub mod page;
pub mod types;

pub use page::Page;
pub use types::{IdError, OrderId, ProductId, SagaId, UserId};
