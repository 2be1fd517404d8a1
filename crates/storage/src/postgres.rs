//! PostgreSQL-backed storage backend.
//!
//! One `PgPool`, a `run_migrations` helper over `sqlx::migrate!`, and
//! conditional writes that use the affected-row-count as the concurrency
//! check instead of a read-then-compare race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use domain::{Order, OrderItem, OrderStatus, TimelineEvent, TimelineEventType};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};
use crate::idempotency::{
    CreateProcessingOutcome, IdempotencyRecord, IdempotencyRepository, IdempotencyStatus,
};
use crate::order_repo::OrderRepository;
use crate::outbox::{NewOutboxMessage, OutboxMessage, OutboxRepository, OutboxStats, OutboxStatus};
use crate::timeline_repo::TimelineRepository;

#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            qty: row.try_get::<i32, _>("qty")? as u32,
            price_minor: row.try_get("price_minor")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StorageError::Database(sqlx::Error::Decode(e.into())))?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            status,
            currency: row.try_get("currency")?,
            amount_minor: row.try_get("amount_minor")?,
            items,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_items(pool: &PgPool, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT id, sku, qty, price_minor, created_at FROM order_items \
             WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }
}

#[async_trait]
impl OrderRepository for PostgresStorage {
    async fn create(&self, order: Order) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, customer_id, status, currency, amount_minor, version, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.currency)
        .bind(order.amount_minor)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StorageError::AlreadyExists(order.id.to_string());
            }
            StorageError::Database(e)
        })?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, id, sku, qty, price_minor, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id.as_uuid())
            .bind(item.id)
            .bind(&item.sku)
            .bind(item.qty as i32)
            .bind(item.price_minor)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query(
            "SELECT id, customer_id, status, currency, amount_minor, version, created_at, \
             updated_at FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let items = Self::fetch_items(&self.pool, id).await?;
        Self::row_to_order(row, items)
    }

    async fn list_by_customer(&self, customer_id: CustomerId, limit: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, customer_id, status, currency, amount_minor, version, created_at, \
             updated_at FROM orders WHERE customer_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(customer_id.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
            let items = Self::fetch_items(&self.pool, id).await?;
            orders.push(Self::row_to_order(row, items)?);
        }
        Ok(orders)
    }

    async fn save(&self, mut order: Order) -> Result<Order> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, amount_minor = $2, version = version + 1, \
             updated_at = $3 WHERE id = $4 AND version = $5 RETURNING version, updated_at",
        )
        .bind(order.status.as_str())
        .bind(order.amount_minor)
        .bind(Utc::now())
        .bind(order.id.as_uuid())
        .bind(order.version)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => {
                order.version = row.try_get("version")?;
                order.updated_at = row.try_get("updated_at")?;
                Ok(order)
            }
            None => {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                        .bind(order.id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await?;
                match exists {
                    Some(actual) => Err(StorageError::Conflict(format!(
                        "order {} expected version {}, found {}",
                        order.id, order.version, actual
                    ))),
                    None => Err(StorageError::NotFound(order.id.to_string())),
                }
            }
        }
    }
}

#[async_trait]
impl OutboxRepository for PostgresStorage {
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO outbox (aggregate_type, aggregate_id, event_type, payload, status, \
             attempts, created_at) VALUES ($1, $2, $3, $4, 'Pending', 0, $5) RETURNING id",
        )
        .bind(&message.aggregate_type)
        .bind(message.aggregate_id)
        .bind(&message.event_type)
        .bind(&message.payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn pull_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            "SELECT id, aggregate_type, aggregate_id, event_type, payload, status, attempts, \
             created_at FROM outbox WHERE status = 'Pending' ORDER BY id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OutboxMessage {
                    id: row.try_get("id")?,
                    aggregate_type: row.try_get("aggregate_type")?,
                    aggregate_id: row.try_get("aggregate_id")?,
                    event_type: row.try_get("event_type")?,
                    payload: row.try_get("payload")?,
                    status: OutboxStatus::Pending,
                    attempts: row.try_get("attempts")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE outbox SET status = 'Sent' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE outbox SET status = 'Failed', attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pending_count, MIN(created_at) AS oldest_pending_at FROM outbox \
             WHERE status = 'Pending'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OutboxStats {
            pending_count: row.try_get("pending_count")?,
            oldest_pending_at: row.try_get::<Option<DateTime<Utc>>, _>("oldest_pending_at")?,
        })
    }
}

#[async_trait]
impl TimelineRepository for PostgresStorage {
    async fn append(&self, event: TimelineEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO timeline (order_id, event_type, reason, occurred_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event.order_id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(&event.reason)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, order_id: OrderId) -> Result<Vec<TimelineEvent>> {
        let rows = sqlx::query(
            "SELECT event_type, reason, occurred_at FROM timeline WHERE order_id = $1 \
             ORDER BY occurred_at ASC, seq ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let event_type: String = row.try_get("event_type")?;
                let event_type = match event_type.as_str() {
                    "OrderStatusChanged" => TimelineEventType::OrderStatusChanged,
                    "OrderCanceled" => TimelineEventType::OrderCanceled,
                    "OrderRefunded" => TimelineEventType::OrderRefunded,
                    _ => TimelineEventType::OrderSagaFailed,
                };
                Ok(TimelineEvent {
                    order_id,
                    event_type,
                    reason: row.try_get("reason")?,
                    occurred_at: row.try_get("occurred_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl IdempotencyRepository for PostgresStorage {
    async fn create_processing(
        &self,
        key: &str,
        request_hash: &str,
        ttl_at: DateTime<Utc>,
    ) -> Result<CreateProcessingOutcome> {
        let existing = sqlx::query(
            "SELECT request_hash, status, response_body, http_status, ttl_at FROM idempotency \
             WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let stored_hash: String = row.try_get("request_hash")?;
            if stored_hash != request_hash {
                return Ok(CreateProcessingOutcome::HashMismatch);
            }
            let status: String = row.try_get("status")?;
            return Ok(CreateProcessingOutcome::Replayed(IdempotencyRecord {
                key: key.to_string(),
                request_hash: stored_hash,
                status: parse_idempotency_status(&status),
                response_body: row.try_get("response_body")?,
                http_status: row.try_get("http_status")?,
                ttl_at: row.try_get("ttl_at")?,
            }));
        }

        sqlx::query(
            "INSERT INTO idempotency (key, request_hash, status, ttl_at) \
             VALUES ($1, $2, 'Processing', $3)",
        )
        .bind(key)
        .bind(request_hash)
        .bind(ttl_at)
        .execute(&self.pool)
        .await?;

        Ok(CreateProcessingOutcome::Inserted(IdempotencyRecord {
            key: key.to_string(),
            request_hash: request_hash.to_string(),
            status: IdempotencyStatus::Processing,
            response_body: None,
            http_status: None,
            ttl_at,
        }))
    }

    async fn mark_done(&self, key: &str, body: Vec<u8>, http_status: i32) -> Result<()> {
        sqlx::query(
            "UPDATE idempotency SET status = 'Done', response_body = $1, http_status = $2 \
             WHERE key = $3",
        )
        .bind(body)
        .bind(http_status)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, key: &str, body: Vec<u8>, http_status: i32) -> Result<()> {
        sqlx::query(
            "UPDATE idempotency SET status = 'Failed', response_body = $1, http_status = $2 \
             WHERE key = $3",
        )
        .bind(body)
        .bind(http_status)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_expired(&self, before: DateTime<Utc>, limit: i64) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM idempotency WHERE key IN (SELECT key FROM idempotency WHERE ttl_at < $1 \
             LIMIT $2)",
        )
        .bind(before)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as i64)
    }
}

#[async_trait]
impl StorageBackend for PostgresStorage {
    async fn commit_order_transition(
        &self,
        mut order: Order,
        outbox: Vec<NewOutboxMessage>,
        timeline: Vec<TimelineEvent>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE orders SET status = $1, amount_minor = $2, version = version + 1, \
             updated_at = $3 WHERE id = $4 AND version = $5 RETURNING version, updated_at",
        )
        .bind(order.status.as_str())
        .bind(order.amount_minor)
        .bind(Utc::now())
        .bind(order.id.as_uuid())
        .bind(order.version)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match result {
            Some(row) => row,
            None => {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                        .bind(order.id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;
                return match exists {
                    Some(actual) => Err(StorageError::Conflict(format!(
                        "order {} expected version {}, found {}",
                        order.id, order.version, actual
                    ))),
                    None => Err(StorageError::NotFound(order.id.to_string())),
                };
            }
        };

        order.version = row.try_get("version")?;
        order.updated_at = row.try_get("updated_at")?;

        for message in outbox {
            sqlx::query(
                "INSERT INTO outbox (aggregate_type, aggregate_id, event_type, payload, status, \
                 attempts, created_at) VALUES ($1, $2, $3, $4, 'Pending', 0, $5)",
            )
            .bind(&message.aggregate_type)
            .bind(message.aggregate_id)
            .bind(&message.event_type)
            .bind(&message.payload)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        for event in timeline {
            sqlx::query(
                "INSERT INTO timeline (order_id, event_type, reason, occurred_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(event.order_id.as_uuid())
            .bind(event.event_type.as_str())
            .bind(&event.reason)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }
}

fn parse_idempotency_status(s: &str) -> IdempotencyStatus {
    match s {
        "Done" => IdempotencyStatus::Done,
        "Failed" => IdempotencyStatus::Failed,
        _ => IdempotencyStatus::Processing,
    }
}
