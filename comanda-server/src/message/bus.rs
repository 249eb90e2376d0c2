//! 消息总线核心实现
//!
//! 聚合器是唯一的业务事件发布方；任意数量的流式客户端订阅广播。
//! `publish` 发后不理：慢订阅者、断线订阅者都由各自的转发任务处理，
//! 永远不会阻塞或影响发布方。

use std::sync::Arc;

use dashmap::DashMap;
use shared::message::BusMessage;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::transport::{MemoryTransport, Transport};

/// Configuration for the transport layer
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tcp_listen_addr: String,
    /// Capacity of the broadcast channels (default: 1024)
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tcp_listen_addr: "0.0.0.0:4570".to_string(),
            channel_capacity: 1024,
        }
    }
}

/// 消息总线 - 负责事件扇出和客户端管理
///
/// # 职责
///
/// - 事件发布 (publish, 发后不理)
/// - 订阅管理 (subscribe / 客户端注册表)
/// - 入站消息通道 (客户端 -> MessageHandler)
#[derive(Debug, Clone)]
pub struct MessageBus {
    /// 客户端到服务器的消息通道
    client_tx: broadcast::Sender<BusMessage>,
    /// 服务器到客户端的广播通道
    server_tx: broadcast::Sender<BusMessage>,
    /// 传输层配置
    pub(crate) config: TransportConfig,
    /// 关闭信号令牌
    shutdown_token: CancellationToken,
    /// 已连接的客户端 (Client ID -> Transport)
    pub(crate) clients: Arc<DashMap<String, Arc<dyn Transport>>>,
}

impl MessageBus {
    /// 创建默认配置的消息总线
    pub fn new() -> Self {
        Self::from_config(TransportConfig::default())
    }

    /// 从配置创建消息总线
    pub fn from_config(config: TransportConfig) -> Self {
        let capacity = config.channel_capacity;
        let (client_tx, _) = broadcast::channel(capacity);
        let (server_tx, _) = broadcast::channel(capacity);
        Self {
            client_tx,
            server_tx,
            config,
            shutdown_token: CancellationToken::new(),
            clients: Arc::new(DashMap::new()),
        }
    }

    /// 发布事件 (服务器 -> 所有订阅者)
    ///
    /// 发后不理：没有订阅者不是错误；每个订阅者的投递由其转发任务
    /// 独立尝试，失败只影响该订阅者自己。
    pub fn publish(&self, msg: BusMessage) {
        if let Err(e) = self.server_tx.send(msg) {
            tracing::trace!("Event published with no subscribers: {}", e);
        }
    }

    /// 发送消息到服务器 (客户端 -> MessageHandler)
    pub fn send_to_server(&self, msg: BusMessage) {
        if let Err(e) = self.client_tx.send(msg) {
            tracing::debug!("Inbound message dropped, no handler running: {}", e);
        }
    }

    /// 订阅服务器广播 (订阅者专用)
    ///
    /// 返回的接收端只会看到订阅之后发布的事件，历史事件不重放。
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.server_tx.subscribe()
    }

    /// 订阅客户端消息 (MessageHandler 专用)
    pub fn subscribe_to_clients(&self) -> broadcast::Receiver<BusMessage> {
        self.client_tx.subscribe()
    }

    /// 获取内存传输层 (同进程订阅)
    pub fn memory_transport(&self) -> MemoryTransport {
        MemoryTransport::new(&self.server_tx)
    }

    /// 获取客户端内存传输层 (可发送消息到服务器)
    pub fn client_memory_transport(&self) -> MemoryTransport {
        MemoryTransport::with_client_sender(&self.server_tx, &self.client_tx)
    }

    /// 获取广播发送端 (高级用法)
    pub fn sender(&self) -> &broadcast::Sender<BusMessage> {
        &self.server_tx
    }

    /// 获取客户端发送端 (client -> server 通道)
    pub fn sender_to_server(&self) -> &broadcast::Sender<BusMessage> {
        &self.client_tx
    }

    /// 获取关闭令牌 (用于监控关闭信号)
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// 当前在线的流式客户端数量
    ///
    /// 仅用于观测，最终一致地反映连接与断开。
    pub fn subscriber_count(&self) -> usize {
        self.clients.len()
    }

    /// 获取已连接客户端 ID 列表
    pub fn connected_clients(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    /// 关闭总线：通知 TCP 服务器和所有转发任务退出
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::{NotificationPayload, OrderSyncPayload, SyncAction};

    fn sync_event(table_id: i64) -> BusMessage {
        BusMessage::sync(&OrderSyncPayload {
            action: SyncAction::Updated,
            table_id,
            order_id: Some(1),
            order: None,
            new_items: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = MessageBus::new();
        // 不应 panic，也没有可观察的失败
        bus.publish(sync_event(1));
    }

    #[tokio::test]
    async fn test_subscribers_each_get_a_copy() {
        let bus = MessageBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(sync_event(7));

        assert_eq!(a.recv().await.unwrap().event_type, shared::EventType::Sync);
        assert_eq!(b.recv().await.unwrap().event_type, shared::EventType::Sync);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_history() {
        let bus = MessageBus::new();
        let mut early = bus.subscribe();

        bus.publish(sync_event(7));
        assert!(early.recv().await.is_ok());

        // 事后订阅者看不到已发布的事件
        let mut late = bus.subscribe();
        bus.publish(BusMessage::notification(&NotificationPayload::info(
            "ping", "pong",
        )));
        let only = late.recv().await.unwrap();
        assert_eq!(only.event_type, shared::EventType::Notification);
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe();

        for table_id in 1..=5 {
            bus.publish(sync_event(table_id));
        }

        for expected in 1..=5 {
            let msg = rx.recv().await.unwrap();
            let payload: OrderSyncPayload = msg.parse_payload().unwrap();
            assert_eq!(payload.table_id, expected);
        }
    }
}
