use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, SagaId, UserId};
use domain::{NewOrder, Order, OrderStatus};
use tokio::sync::RwLock;

use crate::{
    JournalRecord, Result, SagaJournal, StoreError, Version, journal::validate_records_for_append,
    store::OrderStore,
};

#[derive(Debug, Default)]
struct OrderState {
    orders: BTreeMap<OrderId, Order>,
    last_id: i64,
    fail_on_create: bool,
    fail_on_set_status: bool,
    latency: Option<Duration>,
}

/// In-memory order store for tests and for running without a database.
///
/// Provides the same contract as the PostgreSQL implementation, plus fault
/// injection for exercising the saga's failure paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `create_order` call fail until reset.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes every `set_status` call fail until reset.
    pub async fn set_fail_on_set_status(&self, fail: bool) {
        self.state.write().await.fail_on_set_status = fail;
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().await.latency = latency;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    async fn simulate_latency(&self) {
        let latency = self.state.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;

        if state.fail_on_create {
            return Err(StoreError::Unavailable("create_order rejected".to_string()));
        }

        let id = OrderId::new(state.last_id + 1).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        state.last_id = id.as_i64();

        let order = order.into_order(id, Utc::now());
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.simulate_latency().await;
        self.state
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<Order> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;

        if state.fail_on_set_status {
            return Err(StoreError::Unavailable("set_status rejected".to_string()));
        }

        let order = state.orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if order.status != expected {
            return Err(StoreError::StatusChanged {
                id,
                expected,
                actual: order.status,
            });
        }
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn list_by_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>> {
        self.simulate_latency().await;
        let state = self.state.read().await;

        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();

        // Newest first, ties broken by id like the SQL store.
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Order>> {
        self.simulate_latency().await;
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.saga_id == Some(saga_id))
            .cloned())
    }
}

#[derive(Debug, Default)]
struct JournalState {
    records: Vec<JournalRecord>,
    fail_record_type: Option<String>,
}

/// In-memory saga journal.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaJournal {
    state: Arc<RwLock<JournalState>>,
}

impl InMemorySagaJournal {
    /// Creates a new empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any append batch that contains a record of `record_type`.
    /// `None` clears the fault.
    pub async fn fail_appends_of(&self, record_type: Option<&str>) {
        self.state.write().await.fail_record_type = record_type.map(str::to_string);
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }
}

#[async_trait]
impl SagaJournal for InMemorySagaJournal {
    async fn append(&self, records: Vec<JournalRecord>, expected: Version) -> Result<Version> {
        let saga_id = validate_records_for_append(&records, expected)?;

        let mut state = self.state.write().await;

        if let Some(failing) = &state.fail_record_type
            && records.iter().any(|r| &r.record_type == failing)
        {
            return Err(StoreError::Unavailable(format!(
                "append of {failing} rejected"
            )));
        }

        let actual = state
            .records
            .iter()
            .filter(|r| r.saga_id == saga_id)
            .map(|r| r.version)
            .max()
            .unwrap_or(Version::initial());

        if actual != expected {
            return Err(StoreError::ConcurrencyConflict {
                saga_id,
                expected,
                actual,
            });
        }

        let last = records.last().map(|r| r.version).unwrap_or(expected);
        state.records.extend(records);
        Ok(last)
    }

    async fn load(&self, saga_id: SagaId) -> Result<Vec<JournalRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .records
            .iter()
            .filter(|r| r.saga_id == saga_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    async fn open_sagas(&self, started_before: DateTime<Utc>) -> Result<Vec<SagaId>> {
        let state = self.state.read().await;

        // saga -> (first recorded_at, closed)
        let mut sagas: BTreeMap<SagaId, (DateTime<Utc>, bool)> = BTreeMap::new();
        for record in &state.records {
            let entry = sagas
                .entry(record.saga_id)
                .or_insert((record.recorded_at, false));
            entry.0 = entry.0.min(record.recorded_at);
            entry.1 |= record.terminal;
        }

        let mut open: Vec<_> = sagas
            .into_iter()
            .filter(|(_, (started, closed))| !closed && *started < started_before)
            .map(|(id, (started, _))| (started, id))
            .collect();
        open.sort();
        Ok(open.into_iter().map(|(_, id)| id).collect())
    }
}
