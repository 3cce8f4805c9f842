//! Order domain model.
//!
//! - [`Order`] / [`NewOrder`] records and their [`OrderItem`] lines
//! - [`OrderStatus`] with its transition table
//! - [`CreateOrder`] input validation and per-product demand aggregation

pub mod order;

pub use order::{
    CreateOrder, LineRequest, Money, NewOrder, Order, OrderError, OrderItem, OrderLine,
    OrderStatus, Transition,
};
