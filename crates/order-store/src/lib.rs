pub mod error;
pub mod journal;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use journal::{JournalRecord, JournalRecordBuilder, SagaJournal, Version};
pub use memory::{InMemoryOrderStore, InMemorySagaJournal};
pub use postgres::{PostgresOrderStore, PostgresSagaJournal, run_migrations};
pub use store::OrderStore;
