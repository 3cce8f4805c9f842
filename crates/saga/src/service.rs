//! Order operations as exposed to transports.

use std::sync::Arc;

use common::{OrderId, Page, UserId};
use domain::{CreateOrder, LineRequest, Order, OrderStatus};
use order_store::{OrderStore, SagaJournal};

use crate::config::SagaConfig;
use crate::coordinator::OrderFulfillmentSaga;
use crate::error::SagaError;
use crate::lifecycle::OrderLifecycle;
use crate::reconciler::SagaReconciler;
use crate::services::InventoryGateway;

/// Entry point for the four order operations.
///
/// Takes raw caller input, validates it into domain types and dispatches to
/// the saga, the lifecycle or the store. Every failure comes back as a
/// [`SagaError`] with a stable [`kind`](SagaError::kind).
pub struct OrderService<G, S, J> {
    saga: OrderFulfillmentSaga<Arc<G>, Arc<S>, Arc<J>>,
    lifecycle: OrderLifecycle<Arc<G>, Arc<S>>,
    gateway: Arc<G>,
    store: Arc<S>,
    journal: Arc<J>,
    config: SagaConfig,
}

impl<G, S, J> OrderService<G, S, J>
where
    G: InventoryGateway,
    S: OrderStore,
    J: SagaJournal,
{
    pub fn new(gateway: G, store: S, journal: J, config: SagaConfig) -> Self {
        let gateway = Arc::new(gateway);
        let store = Arc::new(store);
        let journal = Arc::new(journal);
        Self {
            saga: OrderFulfillmentSaga::new(
                gateway.clone(),
                store.clone(),
                journal.clone(),
                config.clone(),
            ),
            lifecycle: OrderLifecycle::new(gateway.clone(), store.clone(), config.clone()),
            gateway,
            store,
            journal,
            config,
        }
    }

    pub async fn create_order(
        &self,
        user_id: i64,
        lines: &[LineRequest],
    ) -> Result<Order, SagaError> {
        let command = CreateOrder::parse(user_id, lines)?;
        self.saga.create_order(command).await
    }

    pub async fn get_order(&self, id: i64) -> Result<Order, SagaError> {
        let id = OrderId::new(id)?;
        self.store.get_order(id).await.map_err(SagaError::from_store)
    }

    /// Parses `status` (case-insensitive) and applies it.
    pub async fn update_order_status(&self, id: i64, status: &str) -> Result<Order, SagaError> {
        let id = OrderId::new(id)?;
        let target: OrderStatus = status.parse()?;
        self.lifecycle.transition_status(id, target).await
    }

    /// Orders of a user, newest first. `limit` and `offset` are clamped, never
    /// rejected.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Order>, SagaError> {
        let user_id = UserId::new(user_id)?;
        self.store
            .list_by_user(user_id, Page::new(limit, offset))
            .await
            .map_err(SagaError::from_store)
    }

    /// A reconciler sharing this service's collaborators.
    pub fn reconciler(&self) -> SagaReconciler<Arc<G>, Arc<S>, Arc<J>> {
        SagaReconciler::new(
            self.gateway.clone(),
            self.store.clone(),
            self.journal.clone(),
            self.config.clone(),
        )
    }
}
