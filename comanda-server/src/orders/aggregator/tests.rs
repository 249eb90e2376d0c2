use std::sync::Arc;
use std::time::Duration;

use shared::message::{EventType, OrderSyncPayload, SyncAction};
use shared::order::OrderItem;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::*;
use crate::orders::store::SqliteOrderStore;

async fn test_pool() -> SqlitePool {
    // 单连接内存库：连接即数据库，多连接会各开一个空库
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

async fn create_test_aggregator() -> (Arc<OrderAggregator>, Arc<MessageBus>, SqlitePool) {
    let pool = test_pool().await;
    let store = Arc::new(SqliteOrderStore::new(pool.clone()));
    let bus = Arc::new(MessageBus::new());
    let aggregator = Arc::new(OrderAggregator::new(
        store,
        bus.clone(),
        Duration::from_secs(5),
    ));
    (aggregator, bus, pool)
}

fn item(product_id: i64, name: &str, price: f64, quantity: i64) -> OrderItem {
    OrderItem {
        product_id,
        name: name.into(),
        price,
        quantity,
    }
}

async fn open_order_count(pool: &SqlitePool, table_id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE table_id = ? AND closed = 0")
        .bind(table_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_submit_creates_order() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;

    let outcome = aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();

    assert_eq!(outcome.order.table_id, 7);
    assert_eq!(outcome.order.party_size, 2);
    assert!(!outcome.order.closed);
    assert!(!outcome.order.sent_to_kitchen);
    assert_eq!(outcome.order.items.len(), 1);
    assert_eq!(outcome.order.total(), 1.2);
    assert_eq!(outcome.new_items, outcome.order.items);
}

#[tokio::test]
async fn test_resubmit_merges_instead_of_duplicating() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;

    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();
    let outcome = aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 2), item(9, "Tea", 1.0, 1)])
        .await
        .unwrap();

    let order = outcome.order;
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.item(5).unwrap().quantity, 3);
    assert_eq!(order.item(9).unwrap().quantity, 1);
    assert_eq!(order.total(), 4.6);

    // 只有 Tea 是本次新增的行
    assert_eq!(outcome.new_items.len(), 1);
    assert_eq!(outcome.new_items[0].product_id, 9);
}

#[tokio::test]
async fn test_merge_keeps_first_price_snapshot() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;

    aggregator
        .submit_order(7, 1, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();
    // 目录涨价后的提交只累加数量，不改已有行的快照
    let outcome = aggregator
        .submit_order(7, 1, vec![item(5, "Coffee", 1.5, 1)])
        .await
        .unwrap();

    let line = outcome.order.item(5).unwrap();
    assert_eq!(line.price, 1.2);
    assert_eq!(line.quantity, 2);
}

#[tokio::test]
async fn test_empty_submission_is_rejected() {
    let (aggregator, _bus, pool) = create_test_aggregator().await;

    let err = aggregator.submit_order(7, 2, Vec::new()).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidSubmission(_)));
    assert_eq!(open_order_count(&pool, 7).await, 0);
}

#[tokio::test]
async fn test_nonpositive_quantities_are_clamped() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;

    let outcome = aggregator
        .submit_order(7, 0, vec![item(5, "Coffee", 1.2, 0), item(9, "Tea", 1.0, -3)])
        .await
        .unwrap();

    assert_eq!(outcome.order.party_size, 1);
    assert_eq!(outcome.order.item(5).unwrap().quantity, 1);
    assert_eq!(outcome.order.item(9).unwrap().quantity, 1);
}

#[tokio::test]
async fn test_duplicate_products_in_one_call_are_premerged() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;

    let outcome = aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1), item(5, "Coffee", 1.2, 2)])
        .await
        .unwrap();

    assert_eq!(outcome.order.items.len(), 1);
    assert_eq!(outcome.order.item(5).unwrap().quantity, 3);
}

#[tokio::test]
async fn test_at_most_one_open_order_per_table() {
    let (aggregator, _bus, pool) = create_test_aggregator().await;

    for _ in 0..3 {
        aggregator
            .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
            .await
            .unwrap();
    }

    assert_eq!(open_order_count(&pool, 7).await, 1);
}

#[tokio::test]
async fn test_close_then_resubmit_creates_new_order() {
    let (aggregator, _bus, pool) = create_test_aggregator().await;

    let first = aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 2)])
        .await
        .unwrap()
        .order;
    let closed = aggregator.close_order(7).await.unwrap();
    assert_eq!(closed.id, first.id);
    assert!(closed.closed);

    let second = aggregator
        .submit_order(7, 4, vec![item(9, "Tea", 1.0, 1)])
        .await
        .unwrap()
        .order;

    // 新订单，新身份；旧订单不受影响
    assert_ne!(second.id, first.id);
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.item(9).unwrap().quantity, 1);

    let store = SqliteOrderStore::new(pool.clone());
    let old_items = store.list_items(first.id).await.unwrap();
    assert_eq!(old_items.len(), 1);
    assert_eq!(old_items[0].quantity, 2);
}

#[tokio::test]
async fn test_close_without_active_order_fails_without_mutation() {
    let (aggregator, _bus, pool) = create_test_aggregator().await;

    let err = aggregator.close_order(7).await.unwrap_err();
    assert!(matches!(err, OrderError::NoActiveOrder(7)));

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_remove_active_order() {
    let (aggregator, _bus, pool) = create_test_aggregator().await;

    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();

    assert!(aggregator.remove_active_order(7).await.unwrap());
    assert!(aggregator.get_active_order(7).await.unwrap().is_none());
    // 删除是硬删除，行也一起消失
    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_item")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(items, 0);

    // 没有订单时静默返回 false
    assert!(!aggregator.remove_active_order(7).await.unwrap());
}

#[tokio::test]
async fn test_send_to_kitchen_is_explicit_and_sticky() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;

    let submitted = aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap()
        .order;
    assert!(!submitted.sent_to_kitchen);

    let sent = aggregator.send_to_kitchen(7).await.unwrap();
    assert!(sent.sent_to_kitchen);

    // 后续合并不重置标志
    let merged = aggregator
        .submit_order(7, 2, vec![item(9, "Tea", 1.0, 1)])
        .await
        .unwrap()
        .order;
    assert!(merged.sent_to_kitchen);
}

#[tokio::test]
async fn test_send_to_kitchen_requires_active_order() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;
    let err = aggregator.send_to_kitchen(3).await.unwrap_err();
    assert!(matches!(err, OrderError::NoActiveOrder(3)));
}

#[tokio::test]
async fn test_get_active_order_reflects_latest_state() {
    let (aggregator, _bus, _pool) = create_test_aggregator().await;

    assert!(aggregator.get_active_order(7).await.unwrap().is_none());

    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();
    let order = aggregator.get_active_order(7).await.unwrap().unwrap();
    assert_eq!(order.item(5).unwrap().quantity, 1);

    aggregator.close_order(7).await.unwrap();
    assert!(aggregator.get_active_order(7).await.unwrap().is_none());
}

#[tokio::test]
async fn test_events_follow_commit_order_per_table() {
    let (aggregator, bus, _pool) = create_test_aggregator().await;
    let mut rx = bus.subscribe();

    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();
    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 2), item(9, "Tea", 1.0, 1)])
        .await
        .unwrap();
    aggregator.close_order(7).await.unwrap();

    let mut actions = Vec::new();
    for _ in 0..3 {
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event_type, EventType::Sync);
        let payload: OrderSyncPayload = msg.parse_payload().unwrap();
        assert_eq!(payload.table_id, 7);
        actions.push(payload.action);
    }
    assert_eq!(
        actions,
        vec![SyncAction::Created, SyncAction::Updated, SyncAction::Closed]
    );
}

#[tokio::test]
async fn test_update_event_reports_only_new_items() {
    let (aggregator, bus, _pool) = create_test_aggregator().await;
    let mut rx = bus.subscribe();

    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();
    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 2), item(9, "Tea", 1.0, 1)])
        .await
        .unwrap();

    let created: OrderSyncPayload = rx.recv().await.unwrap().parse_payload().unwrap();
    assert_eq!(created.action, SyncAction::Created);
    assert_eq!(created.new_items.len(), 1);

    let updated: OrderSyncPayload = rx.recv().await.unwrap().parse_payload().unwrap();
    assert_eq!(updated.action, SyncAction::Updated);
    assert_eq!(updated.new_items.len(), 1);
    assert_eq!(updated.new_items[0].product_id, 9);
    // 事件自带完整快照，订阅端无需回查
    let order = updated.order.unwrap();
    assert_eq!(order.item(5).unwrap().quantity, 3);
    assert_eq!(order.total(), 4.6);
}

#[tokio::test]
async fn test_subscriber_joining_late_misses_nothing_retroactively() {
    let (aggregator, bus, _pool) = create_test_aggregator().await;

    aggregator
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();

    // 事后订阅者收不到任何历史事件
    let mut late = bus.subscribe();
    assert!(late.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_submissions_to_same_table_serialize() {
    let (aggregator, _bus, pool) = create_test_aggregator().await;

    let a = {
        let agg = aggregator.clone();
        tokio::spawn(async move { agg.submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)]).await })
    };
    let b = {
        let agg = aggregator.clone();
        tokio::spawn(async move { agg.submit_order(7, 2, vec![item(5, "Coffee", 1.2, 2)]).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // 两次提交合并进同一张单、同一行
    assert_eq!(open_order_count(&pool, 7).await, 1);
    let order = aggregator.get_active_order(7).await.unwrap().unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.item(5).unwrap().quantity, 3);
}

#[tokio::test]
async fn test_independent_tables_do_not_share_a_lock() {
    let (aggregator, _bus, pool) = create_test_aggregator().await;

    let a = {
        let agg = aggregator.clone();
        tokio::spawn(async move { agg.submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)]).await })
    };
    let b = {
        let agg = aggregator.clone();
        tokio::spawn(async move { agg.submit_order(8, 3, vec![item(9, "Tea", 1.0, 1)]).await })
    };

    let (ra, rb) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(ra.order.table_id, 7);
    assert_eq!(rb.order.table_id, 8);
    assert_eq!(open_order_count(&pool, 7).await, 1);
    assert_eq!(open_order_count(&pool, 8).await, 1);
}
