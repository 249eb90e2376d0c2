//! OrderAggregator - 订单合并与状态机驱动
//!
//! # 提交流程
//!
//! ```text
//! submit_order(table_id, party_size, items)
//!     ├─ 1. 校验并归一化提交 (空列表拒绝, 数量钳到 >=1, 同商品预合并)
//!     ├─ 2. 获取桌台锁 (带超时)
//!     ├─ 3. 重读当前未关闭订单 (不缓存, 永远基于已提交状态做合并决策)
//!     ├─ 4. 无则建单; 有则区分新增行/累加行
//!     ├─ 5. 单事务应用全部商品行
//!     ├─ 6. 重读订单快照
//!     ├─ 7. 持锁发布变更事件 (保证同桌事件序 = 提交序)
//!     └─ 8. 返回快照 + 本次新增行
//! ```
//!
//! 每桌一个临界区：不同桌台的操作互不阻塞；同一桌台的操作按抢到锁
//! 的先后串行，这正是"每桌至多一个未关闭订单"和"合并不重复"两条
//! 不变量的执行点。

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use shared::message::{BusMessage, OrderSyncPayload, SyncAction};
use shared::order::{Order, OrderItem};
use tokio::sync::Mutex;

use super::error::{OrderError, OrderResult};
use super::store::OrderStore;
use crate::message::MessageBus;

/// Result of a submit/merge call
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The table's open order after the merge committed
    pub order: Order,
    /// Lines that did not exist in the order when the call began
    /// (every submitted line when the call created the order)
    pub new_items: Vec<OrderItem>,
}

/// Order business logic: merge protocol, state machine, event emission
///
/// Built once at startup; the store and the bus are injected explicitly
/// so there is no hidden initialization order.
pub struct OrderAggregator {
    store: Arc<dyn OrderStore>,
    bus: Arc<MessageBus>,
    /// Per-table critical sections
    table_locks: DashMap<i64, Arc<Mutex<()>>>,
    /// Cap on waiting for a table lock before giving up
    lock_timeout: Duration,
}

impl OrderAggregator {
    pub fn new(store: Arc<dyn OrderStore>, bus: Arc<MessageBus>, lock_timeout: Duration) -> Self {
        Self {
            store,
            bus,
            table_locks: DashMap::new(),
            lock_timeout,
        }
    }

    /// Clone the lock for a table, creating it on first use
    fn table_lock(&self, table_id: i64) -> Arc<Mutex<()>> {
        self.table_locks.entry(table_id).or_default().clone()
    }

    /// Acquire the table lock, bounded by the configured timeout
    async fn lock_table(
        &self,
        table_id: i64,
        op: &str,
    ) -> OrderResult<tokio::sync::OwnedMutexGuard<()>> {
        let lock = self.table_lock(table_id);
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                OrderError::Persistence(format!(
                    "{op}: timed out waiting for table {table_id} lock"
                ))
            })
    }

    /// Merge a submission into the table's open order, creating one when
    /// none exists
    ///
    /// Quantities below 1 are clamped to 1; duplicate product ids within
    /// the submission are pre-merged. The whole batch commits atomically;
    /// a failed call leaves the order untouched.
    pub async fn submit_order(
        &self,
        table_id: i64,
        party_size: i64,
        items: Vec<OrderItem>,
    ) -> OrderResult<SubmitOutcome> {
        if items.is_empty() {
            return Err(OrderError::InvalidSubmission(
                "Submission must contain at least one item".into(),
            ));
        }
        let items = normalize_submission(items);
        let party_size = party_size.max(1);

        let _guard = self.lock_table(table_id, "submit_order").await?;

        let existing = self
            .store
            .find_open_order_by_table(table_id)
            .await
            .map_err(|e| OrderError::Persistence(format!("submit_order: {e}")))?;

        let (order_id, action, new_items) = match existing {
            None => {
                let order_id = self
                    .store
                    .create_order(table_id, party_size)
                    .await
                    .map_err(|e| OrderError::Persistence(format!("submit_order: {e}")))?;
                (order_id, SyncAction::Created, items.clone())
            }
            Some(order) => {
                let new_items: Vec<OrderItem> = items
                    .iter()
                    .filter(|item| order.item(item.product_id).is_none())
                    .cloned()
                    .collect();
                (order.id, SyncAction::Updated, new_items)
            }
        };

        self.store
            .upsert_items(order_id, &items)
            .await
            .map_err(|e| OrderError::Persistence(format!("submit_order: {e}")))?;

        let order = self.reload_open_order(table_id, "submit_order").await?;

        tracing::info!(
            table_id,
            order_id,
            action = %action,
            lines = order.items.len(),
            new_lines = new_items.len(),
            total = order.total(),
            "Order submission merged"
        );

        self.publish_sync(action, table_id, Some(&order), new_items.clone());

        Ok(SubmitOutcome { order, new_items })
    }

    /// The table's open order, straight from the store
    ///
    /// Pure read: no lock, no caching, always the latest committed state.
    pub async fn get_active_order(&self, table_id: i64) -> OrderResult<Option<Order>> {
        self.store
            .find_open_order_by_table(table_id)
            .await
            .map_err(|e| OrderError::Persistence(format!("get_active_order: {e}")))
    }

    /// Close the table's open order, freeing the one-open-order slot
    ///
    /// The closed order becomes immutable to this API; a later submission
    /// for the same table starts a brand-new order.
    pub async fn close_order(&self, table_id: i64) -> OrderResult<Order> {
        let _guard = self.lock_table(table_id, "close_order").await?;

        let Some(mut order) = self
            .store
            .find_open_order_by_table(table_id)
            .await
            .map_err(|e| OrderError::Persistence(format!("close_order: {e}")))?
        else {
            return Err(OrderError::NoActiveOrder(table_id));
        };

        let closed = self
            .store
            .set_closed(order.id)
            .await
            .map_err(|e| OrderError::Persistence(format!("close_order: {e}")))?;
        if !closed {
            return Err(OrderError::NoActiveOrder(table_id));
        }
        order.closed = true;

        tracing::info!(table_id, order_id = order.id, total = order.total(), "Order closed");
        self.publish_sync(SyncAction::Closed, table_id, Some(&order), Vec::new());

        Ok(order)
    }

    /// Hard-delete the table's open order (corrections)
    ///
    /// Returns false, silently, when there is nothing to delete. Distinct
    /// from closing: the order leaves the store entirely.
    pub async fn remove_active_order(&self, table_id: i64) -> OrderResult<bool> {
        let _guard = self.lock_table(table_id, "remove_active_order").await?;

        let Some(order) = self
            .store
            .find_open_order_by_table(table_id)
            .await
            .map_err(|e| OrderError::Persistence(format!("remove_active_order: {e}")))?
        else {
            return Ok(false);
        };

        self.store
            .delete_order(order.id)
            .await
            .map_err(|e| OrderError::Persistence(format!("remove_active_order: {e}")))?;

        tracing::info!(table_id, order_id = order.id, "Active order removed");
        let payload = OrderSyncPayload {
            action: SyncAction::Removed,
            table_id,
            order_id: Some(order.id),
            order: None,
            new_items: Vec::new(),
        };
        self.bus.publish(BusMessage::sync(&payload));

        Ok(true)
    }

    /// Flag the table's open order as sent to the kitchen
    ///
    /// Explicit action, independent of merges; idempotent while the order
    /// stays open.
    pub async fn send_to_kitchen(&self, table_id: i64) -> OrderResult<Order> {
        let _guard = self.lock_table(table_id, "send_to_kitchen").await?;

        let Some(mut order) = self
            .store
            .find_open_order_by_table(table_id)
            .await
            .map_err(|e| OrderError::Persistence(format!("send_to_kitchen: {e}")))?
        else {
            return Err(OrderError::NoActiveOrder(table_id));
        };

        self.store
            .set_sent_to_kitchen(order.id)
            .await
            .map_err(|e| OrderError::Persistence(format!("send_to_kitchen: {e}")))?;
        order.sent_to_kitchen = true;

        tracing::info!(table_id, order_id = order.id, "Order sent to kitchen");
        self.publish_sync(SyncAction::SentToKitchen, table_id, Some(&order), Vec::new());

        Ok(order)
    }

    /// Re-read the open order after a mutation committed
    async fn reload_open_order(&self, table_id: i64, op: &str) -> OrderResult<Order> {
        self.store
            .find_open_order_by_table(table_id)
            .await
            .map_err(|e| OrderError::Persistence(format!("{op}: {e}")))?
            .ok_or_else(|| {
                OrderError::Persistence(format!("{op}: open order for table {table_id} vanished"))
            })
    }

    /// Emit one change event; called while the table lock is held so the
    /// per-table event order matches commit order
    fn publish_sync(
        &self,
        action: SyncAction,
        table_id: i64,
        order: Option<&Order>,
        new_items: Vec<OrderItem>,
    ) {
        let payload = OrderSyncPayload {
            action,
            table_id,
            order_id: order.map(|o| o.id),
            order: order.cloned(),
            new_items,
        };
        self.bus.publish(BusMessage::sync(&payload));
    }
}

/// Clamp quantities to >= 1 and pre-merge duplicate product ids
///
/// First occurrence wins for the name/price snapshot; quantities add up.
fn normalize_submission(items: Vec<OrderItem>) -> Vec<OrderItem> {
    let mut merged: Vec<OrderItem> = Vec::with_capacity(items.len());
    for mut item in items {
        item.quantity = item.quantity.max(1);
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.quantity += item.quantity,
            None => merged.push(item),
        }
    }
    merged
}

#[cfg(test)]
mod tests;
