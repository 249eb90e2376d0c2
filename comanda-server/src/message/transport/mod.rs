//! Transport 传输层抽象
//!
//! 所有传输实现必须实现 [`Transport`] 特征，支持消息的读写和连接管理。

mod memory;
mod tcp;

pub use memory::MemoryTransport;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use shared::message::{BusMessage, EventType};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// 单条消息载荷上限 (1 MiB)
const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// 传输层错误
#[derive(Debug, Error)]
pub enum BusError {
    /// 对端正常断开
    #[error("Client disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BusResult<T> = Result<T, BusError>;

/// Transport 传输层特征
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// 从传输层读取一条消息
    async fn read_message(&self) -> BusResult<BusMessage>;

    /// 向传输层写入一条消息
    async fn write_message(&self, msg: &BusMessage) -> BusResult<()>;

    /// 关闭传输连接
    async fn close(&self) -> BusResult<()>;

    /// 获取对端地址
    fn peer_addr(&self) -> Option<String> {
        None
    }
}

// ========== 帧编解码 ==========
//
// | event type | request id | correlation id | payload len | payload |
// |  1 byte    |  16 bytes  |   16 bytes     |  4 bytes LE |  JSON   |
//
// correlation id 为全零表示 None。

/// 从异步流中读取一条 BusMessage
pub(crate) async fn read_from_stream<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> BusResult<BusMessage> {
    // 事件类型 (1 字节)
    let mut type_buf = [0u8; 1];
    match reader.read_exact(&mut type_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(BusError::Disconnected);
        }
        Err(e) => return Err(BusError::Io(format!("Read type failed: {e}"))),
    }

    let event_type = EventType::try_from(type_buf[0])
        .map_err(|_| BusError::Protocol(format!("Invalid event type: {}", type_buf[0])))?;

    // Request ID (16 字节)
    let mut uuid_buf = [0u8; 16];
    reader
        .read_exact(&mut uuid_buf)
        .await
        .map_err(|e| BusError::Io(format!("Read request id failed: {e}")))?;
    let request_id = Uuid::from_bytes(uuid_buf);

    // Correlation ID (16 字节)
    let mut correlation_buf = [0u8; 16];
    reader
        .read_exact(&mut correlation_buf)
        .await
        .map_err(|e| BusError::Io(format!("Read correlation id failed: {e}")))?;
    let correlation_id_raw = Uuid::from_bytes(correlation_buf);
    let correlation_id = if correlation_id_raw.is_nil() {
        None
    } else {
        Some(correlation_id_raw)
    };

    // 载荷长度 (4 字节)
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| BusError::Io(format!("Read len failed: {e}")))?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_PAYLOAD_SIZE {
        return Err(BusError::Protocol(format!(
            "Payload too large: {len} bytes (max {MAX_PAYLOAD_SIZE})"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| BusError::Io(format!("Read payload failed: {e}")))?;

    Ok(BusMessage {
        request_id,
        event_type,
        source: None,
        correlation_id,
        target: None,
        payload,
    })
}

/// 向异步流写入一条 BusMessage
pub(crate) async fn write_to_stream<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &BusMessage,
) -> BusResult<()> {
    if msg.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(BusError::Protocol(format!(
            "Payload too large: {} bytes (max {MAX_PAYLOAD_SIZE})",
            msg.payload.len()
        )));
    }

    let mut frame = Vec::with_capacity(1 + 16 + 16 + 4 + msg.payload.len());
    frame.push(msg.event_type as u8);
    frame.extend_from_slice(msg.request_id.as_bytes());
    frame.extend_from_slice(msg.correlation_id.unwrap_or(Uuid::nil()).as_bytes());
    frame.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&msg.payload);

    writer
        .write_all(&frame)
        .await
        .map_err(|e| BusError::Io(format!("Write failed: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| BusError::Io(format!("Flush failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::ResponsePayload;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let msg = BusMessage::response(&ResponsePayload::success("ok"))
            .with_correlation_id(Uuid::new_v4());

        let mut buf = Vec::new();
        write_to_stream(&mut buf, &msg).await.unwrap();

        let decoded = read_from_stream(&mut buf.as_slice()).await.unwrap();
        assert_eq!(decoded.event_type, msg.event_type);
        assert_eq!(decoded.request_id, msg.request_id);
        assert_eq!(decoded.correlation_id, msg.correlation_id);
        assert_eq!(decoded.payload, msg.payload);
    }

    #[tokio::test]
    async fn test_eof_maps_to_disconnected() {
        let mut empty: &[u8] = &[];
        let err = read_from_stream(&mut empty).await.unwrap_err();
        assert!(matches!(err, BusError::Disconnected));
    }

    #[tokio::test]
    async fn test_unknown_event_type_rejected() {
        let buf = [99u8; 64];
        let err = read_from_stream(&mut buf.as_slice()).await.unwrap_err();
        assert!(matches!(err, BusError::Protocol(_)));
    }
}
