//! 订单存储 - 聚合器消费的原子操作接口与 SQLite 适配器
//!
//! 存储层是持久订单记录的唯一所有者；其他组件只读克隆视图。
//! `upsert_items` 是原子性边界：一次提交的所有商品行在单个事务里
//! 生效，要么全部应用要么全不应用，并发读者永远看不到半合并状态。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::order::{Order, OrderItem};
use sqlx::SqlitePool;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic order operations keyed by table identity
///
/// Implementations must guarantee that every method is atomic on its own;
/// cross-call consistency (the one-open-order invariant) is provided by
/// the aggregator's per-table critical section.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// The table's open order with its items, if any
    async fn find_open_order_by_table(&self, table_id: i64) -> StoreResult<Option<Order>>;

    /// Insert a new open order and return its id
    async fn create_order(&self, table_id: i64, party_size: i64) -> StoreResult<i64>;

    /// Apply a batch of quantity deltas in ONE transaction
    ///
    /// Per item: adds `quantity` to the existing line for that product, or
    /// inserts a new line (name/price snapshots taken from the submission).
    async fn upsert_items(&self, order_id: i64, items: &[OrderItem]) -> StoreResult<()>;

    /// Flag the order as sent to the kitchen; false when the order is
    /// missing or already closed
    async fn set_sent_to_kitchen(&self, order_id: i64) -> StoreResult<bool>;

    /// Close the order; false when it is missing or already closed
    async fn set_closed(&self, order_id: i64) -> StoreResult<bool>;

    /// Hard-delete the order and its items; false when it did not exist
    async fn delete_order(&self, order_id: i64) -> StoreResult<bool>;

    /// All lines of an order (open or closed)
    async fn list_items(&self, order_id: i64) -> StoreResult<Vec<OrderItem>>;
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    table_id: i64,
    party_size: i64,
    sent_to_kitchen: bool,
    closed: bool,
    created_at: DateTime<Utc>,
}

/// SQLite-backed [`OrderStore`]
#[derive(Clone)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn find_open_order_by_table(&self, table_id: i64) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, table_id, party_size, sent_to_kitchen, closed, created_at \
             FROM orders WHERE table_id = ? AND closed = 0 LIMIT 1",
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = self.list_items(row.id).await?;
        Ok(Some(Order {
            id: row.id,
            table_id: row.table_id,
            party_size: row.party_size,
            sent_to_kitchen: row.sent_to_kitchen,
            closed: row.closed,
            created_at: row.created_at,
            items,
        }))
    }

    async fn create_order(&self, table_id: i64, party_size: i64) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO orders (table_id, party_size) VALUES (?, ?) RETURNING id",
        )
        .bind(table_id)
        .bind(party_size)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_items(&self, order_id: i64, items: &[OrderItem]) -> StoreResult<()> {
        let mut txn = self.pool.begin().await?;

        for item in items {
            // 已有同商品行则累加数量，否则插入新行 (名称/价格取提交快照)
            let updated = sqlx::query(
                "UPDATE order_item SET quantity = quantity + ? \
                 WHERE order_id = ? AND product_id = ?",
            )
            .bind(item.quantity)
            .bind(order_id)
            .bind(item.product_id)
            .execute(&mut *txn)
            .await?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    "INSERT INTO order_item (order_id, product_id, name, price, quantity) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(order_id)
                .bind(item.product_id)
                .bind(&item.name)
                .bind(item.price)
                .bind(item.quantity)
                .execute(&mut *txn)
                .await?;
            }
        }

        txn.commit().await?;
        Ok(())
    }

    async fn set_sent_to_kitchen(&self, order_id: i64) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE orders SET sent_to_kitchen = 1 WHERE id = ? AND closed = 0")
                .bind(order_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_closed(&self, order_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE orders SET closed = 1 WHERE id = ? AND closed = 0")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_order(&self, order_id: i64) -> StoreResult<bool> {
        let mut txn = self.pool.begin().await?;

        sqlx::query("DELETE FROM order_item WHERE order_id = ?")
            .bind(order_id)
            .execute(&mut *txn)
            .await?;
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(order_id)
            .execute(&mut *txn)
            .await?;

        txn.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_items(&self, order_id: i64) -> StoreResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT product_id, name, price, quantity \
             FROM order_item WHERE order_id = ? ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
