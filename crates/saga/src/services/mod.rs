//! Clients for the services the saga talks to.

pub mod http;
pub mod inventory;

pub use http::HttpInventoryGateway;
pub use inventory::{
    InMemoryInventory, InventoryCall, InventoryError, InventoryGateway, ProductSnapshot,
};
