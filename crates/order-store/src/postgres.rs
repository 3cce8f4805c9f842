use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, ProductId, SagaId, UserId};
use domain::{Money, NewOrder, Order, OrderItem, OrderStatus};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    JournalRecord, Result, SagaJournal, StoreError, Version, journal::validate_records_for_append,
    store::OrderStore,
};

const ORDER_COLUMNS: &str = "id, user_id, status, saga_id, created_at, updated_at";

/// Runs the database migrations for orders and the saga journal.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn corrupt(what: impl std::fmt::Display) -> StoreError {
        StoreError::Corrupt(what.to_string())
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::new(row.try_get("id")?).map_err(Self::corrupt)?,
            user_id: UserId::new(row.try_get("user_id")?).map_err(Self::corrupt)?,
            items,
            status: status.parse::<OrderStatus>().map_err(Self::corrupt)?,
            saga_id: row
                .try_get::<Option<Uuid>, _>("saga_id")?
                .map(SagaId::from_uuid),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<(i64, OrderItem)> {
        let order_id: i64 = row.try_get("order_id")?;
        let quantity: i64 = row.try_get("quantity")?;
        let item = OrderItem {
            product_id: ProductId::new(row.try_get("product_id")?).map_err(Self::corrupt)?,
            quantity: u32::try_from(quantity)
                .map_err(|_| Self::corrupt(format!("quantity out of range: {quantity}")))?,
            price: Money::from_cents(row.try_get("price_cents")?),
        };
        Ok((order_id, item))
    }

    /// Loads the items of several orders in one round trip.
    async fn load_items(&self, order_ids: &[i64]) -> Result<HashMap<i64, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, id
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let (order_id, item) = Self::row_to_item(row)?;
            items.entry(order_id).or_default().push(item);
        }
        Ok(items)
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|r| r.try_get::<i64, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_items(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(&id).unwrap_or_default()))
            .collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(user_id = %order.user_id, items = order.items.len()))]
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let header = sqlx::query(&format!(
            "INSERT INTO orders (user_id, status, saga_id) VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id.as_i64())
        .bind(order.status.as_str())
        .bind(order.saga_id.map(|s| s.as_uuid()))
        .fetch_one(&mut *tx)
        .await?;

        let order_id: i64 = header.try_get("id")?;
        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id)
            .bind(item.product_id.as_i64())
            .bind(i64::from(item.quantity))
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("orders_created_total").increment(1);

        Self::row_to_order(&header, order.items)
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or(StoreError::NotFound(id))
    }

    #[tracing::instrument(skip(self), fields(order_id = %id, status = %status))]
    async fn set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(expected.as_str())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                    .bind(id.as_i64())
                    .fetch_optional(&self.pool)
                    .await?;
            let actual = actual.ok_or(StoreError::NotFound(id))?;
            return Err(StoreError::StatusChanged {
                id,
                expected,
                actual: actual.parse::<OrderStatus>().map_err(Self::corrupt)?,
            });
        };

        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_by_user(&self, user_id: UserId, page: Page) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id.as_i64())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE saga_id = $1"
        ))
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

/// PostgreSQL-backed saga journal.
#[derive(Clone)]
pub struct PostgresSagaJournal {
    pool: PgPool,
}

impl PostgresSagaJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: PgRow) -> Result<JournalRecord> {
        Ok(JournalRecord {
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            version: Version::new(row.try_get("version")?),
            record_type: row.try_get("record_type")?,
            payload: row.try_get("payload")?,
            terminal: row.try_get("terminal")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

#[async_trait]
impl SagaJournal for PostgresSagaJournal {
    async fn append(&self, records: Vec<JournalRecord>, expected: Version) -> Result<Version> {
        let saga_id = validate_records_for_append(&records, expected)?;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM saga_journal WHERE saga_id = $1")
                .bind(saga_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let actual = Version::new(current.unwrap_or(0));
        if actual != expected {
            return Err(StoreError::ConcurrencyConflict {
                saga_id,
                expected,
                actual,
            });
        }

        let mut last = expected;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO saga_journal (saga_id, version, record_type, payload, terminal, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.saga_id.as_uuid())
            .bind(record.version.as_i64())
            .bind(&record.record_type)
            .bind(&record.payload)
            .bind(record.terminal)
            .bind(record.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer got the same version in first.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_saga_version")
                {
                    return StoreError::ConcurrencyConflict {
                        saga_id,
                        expected,
                        actual: record.version,
                    };
                }
                StoreError::Database(e)
            })?;
            last = record.version;
        }

        tx.commit().await?;
        Ok(last)
    }

    async fn load(&self, saga_id: SagaId) -> Result<Vec<JournalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT saga_id, version, record_type, payload, terminal, recorded_at
            FROM saga_journal
            WHERE saga_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn open_sagas(&self, started_before: DateTime<Utc>) -> Result<Vec<SagaId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT saga_id
            FROM saga_journal
            GROUP BY saga_id
            HAVING NOT bool_or(terminal) AND MIN(recorded_at) < $1
            ORDER BY MIN(recorded_at) ASC
            "#,
        )
        .bind(started_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(SagaId::from_uuid).collect())
    }
}
