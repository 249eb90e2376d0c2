use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::{Order, OrderItem};

// ==================== Notification Level ====================

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// 普通信息
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ==================== Payloads ====================

/// 握手载荷 (客户端 -> 服务端)
///
/// 包含客户端的协议版本信息，用于服务端进行版本校验。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// 协议版本
    pub version: u16,
    /// 客户端名称/标识 (如 "pos-terminal", "kitchen-display")
    pub client_name: Option<String>,
    /// 客户端唯一标识 (UUID)
    pub client_id: Option<String>,
}

/// 通知载荷 (服务端 -> 客户端)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// 标题
    pub title: String,
    /// 消息内容
    pub message: String,
    /// 通知级别
    pub level: NotificationLevel,
}

impl NotificationPayload {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Info,
        }
    }
}

/// 订单同步的变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// 新开订单
    Created,
    /// 追加/合并了商品
    Updated,
    /// 订单已结账关闭
    Closed,
    /// 订单已发送厨房
    SentToKitchen,
    /// 订单被整单删除
    Removed,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Closed => write!(f, "closed"),
            Self::SentToKitchen => write!(f, "sent_to_kitchen"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// 订单同步信号载荷 (服务端 -> 所有客户端)
///
/// 当某张桌台的订单被接受的变更修改后，服务端广播此信号。
/// 载荷携带完整订单快照，订阅端无需回查即可渲染。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSyncPayload {
    /// 变更类型
    pub action: SyncAction,
    /// 桌台 ID
    pub table_id: i64,
    /// 订单 ID (removed 时为被删除的订单)
    pub order_id: Option<i64>,
    /// 变更后的订单快照 (removed 时为 None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    /// 本次提交新增的商品行 (用于厨房增量显示)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_items: Vec<OrderItem>,
}

/// 出餐通知载荷 (厨房客户端 -> 服务端 -> 所有客户端)
///
/// 厨房把某个商品标记为"已出餐"时通过流式通道发送，
/// 服务端原样转发给所有订阅者。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReadyPayload {
    /// 商品 ID
    pub product_id: i64,
    /// 商品名称 (快照)
    pub name: String,
    /// 数量
    pub quantity: i64,
    /// 桌台展示编号
    pub table_number: i64,
}

/// 通用响应载荷 (服务端 -> 客户端)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// 是否成功
    pub success: bool,
    /// 人类可读的消息
    pub message: String,
}

impl ResponsePayload {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
