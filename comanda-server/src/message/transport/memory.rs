//! Memory 传输层实现 (同进程通信)

use std::sync::Arc;

use async_trait::async_trait;
use shared::message::BusMessage;
use tokio::sync::Mutex;
use tokio::sync::broadcast;

use super::{BusError, BusResult, Transport};

/// In-process memory transport for same-process communication
///
/// Uses tokio broadcast channels internally. 用于测试或内嵌客户端。
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    rx: Arc<Mutex<broadcast::Receiver<BusMessage>>>,
    tx: Option<Arc<broadcast::Sender<BusMessage>>>,
}

impl MemoryTransport {
    /// Create from a bus sender (receive-only subscriber)
    pub fn new(tx: &broadcast::Sender<BusMessage>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(tx.subscribe())),
            tx: None,
        }
    }

    /// Create with a client sender so writes reach the server
    pub fn with_client_sender(
        broadcast_tx: &broadcast::Sender<BusMessage>,
        client_tx: &broadcast::Sender<BusMessage>,
    ) -> Self {
        Self {
            rx: Arc::new(Mutex::new(broadcast_tx.subscribe())),
            tx: Some(Arc::new(client_tx.clone())),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self) -> BusResult<BusMessage> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Ok(msg) => Ok(msg),
            Err(broadcast::error::RecvError::Closed) => Err(BusError::Disconnected),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(BusError::Io(format!(
                "Receiver lagged, {skipped} messages dropped"
            ))),
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> BusResult<()> {
        if let Some(tx) = &self.tx {
            tx.send(msg.clone())
                .map_err(|e| BusError::Io(e.to_string()))?;
        }
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        Ok(())
    }
}
