//! 消息总线 - 订单变更事件的扇出分发
//!
//! # 架构
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     MessageBus                          │
//! │  ┌───────────────────────────────────────────────────┐  │
//! │  │  broadcast::Sender<BusMessage>                    │  │
//! │  └───────────────────────────────────────────────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//!               ┌──────────┴──────────┐
//!               │    Transport Trait  │  ◄── 可插拔实现
//!               └──────────┬──────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!        TcpTransport           MemoryTransport
//!        (TCP 明文帧)           (同进程通信)
//! ```
//!
//! # 消息流
//!
//! ```text
//! Client ──▶ read loop ─────▶ client_tx ──▶ MessageHandler (转发)
//!                                        │
//! Aggregator ──▶ publish() ─▶ server_tx ─┤
//!                                        ▼
//!                                 Connected Clients
//! ```
//!
//! 投递语义：仅对在线订阅者尽力送达。写失败或积压的订阅者被移除并记录
//! 日志，不影响发布方和其他订阅者；断线期间的事件不会重放。

pub mod bus;
pub mod handler;
pub mod tcp_server;
pub mod transport;

pub use bus::{MessageBus, TransportConfig};
pub use handler::MessageHandler;
pub use transport::{BusError, MemoryTransport, TcpTransport, Transport};

pub use shared::message::{
    BusMessage, EventType, HandshakePayload, ItemReadyPayload, NotificationPayload,
    OrderSyncPayload, ResponsePayload, SyncAction, PROTOCOL_VERSION,
};
