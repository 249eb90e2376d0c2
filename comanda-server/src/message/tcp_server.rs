//! TCP 服务器实现
//!
//! 负责处理流式客户端连接，包括：
//! - 监听连接
//! - 协议握手验证
//! - 广播转发 (server -> client)
//! - 入站消息上行 (client -> server)
//!
//! 每个连接有一个独立的转发任务。写失败或积压 (Lagged) 意味着该
//! 订阅者不可达或跟不上，直接断开并从注册表移除；其余订阅者不受影响。

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use shared::message::{BusMessage, EventType, HandshakePayload, PROTOCOL_VERSION, ResponsePayload};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::bus::MessageBus;
use super::transport::{BusError, BusResult, TcpTransport, Transport};

impl MessageBus {
    /// Start the TCP server for streaming clients
    ///
    /// 1. Accepts connections
    /// 2. Reads messages from clients and publishes to client_tx
    /// 3. Forwards server broadcast messages to connected clients
    /// 4. Gracefully shuts down on cancellation signal
    pub async fn start_tcp_server(&self) -> BusResult<()> {
        let listener = TcpListener::bind(&self.config.tcp_listen_addr)
            .await
            .map_err(|e| BusError::Io(format!("Failed to bind: {e}")))?;

        tracing::info!(
            "Message bus TCP server listening on {}",
            self.config.tcp_listen_addr
        );

        self.accept_loop(listener).await
    }

    /// Main accept loop
    async fn accept_loop(&self, listener: TcpListener) -> BusResult<()> {
        loop {
            tokio::select! {
                _ = self.shutdown_token().cancelled() => {
                    tracing::info!("Message bus TCP server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::debug!("Client connected: {}", addr);
                            self.spawn_client_handler(stream, addr);
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Spawn a new task to handle a client connection
    fn spawn_client_handler(&self, stream: TcpStream, addr: SocketAddr) {
        let server_tx = self.sender().clone();
        let client_tx = self.sender_to_server().clone();
        let shutdown_token = self.shutdown_token().clone();
        let clients = self.clients.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_client_connection(stream, addr, server_tx, client_tx, shutdown_token, clients)
                    .await
            {
                tracing::debug!("Client {} handler finished: {}", addr, e);
            }
        });
    }
}

/// Handle a single client connection
async fn handle_client_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: broadcast::Sender<BusMessage>,
    client_tx: broadcast::Sender<BusMessage>,
    shutdown_token: CancellationToken,
    clients: Arc<DashMap<String, Arc<dyn Transport>>>,
) -> BusResult<()> {
    let transport: Arc<dyn Transport> = Arc::new(TcpTransport::from_stream(stream));

    // 先订阅再应答握手：客户端收到握手响应后立即发布的事件必须可见
    let broadcast_rx = server_tx.subscribe();

    // Protocol handshake
    let client_id = perform_handshake(&transport, addr).await?;

    // Register client
    clients.insert(client_id.clone(), transport.clone());
    tracing::debug!("Client registered: {}", client_id);

    // 任一方向失败都通过此 token 叫停另一个方向
    let disconnect_token = CancellationToken::new();

    let forward_handle = spawn_server_to_client_forwarder(
        transport.clone(),
        broadcast_rx,
        shutdown_token.clone(),
        client_id.clone(),
        disconnect_token.clone(),
    );

    read_client_messages(
        &transport,
        &client_tx,
        &shutdown_token,
        &client_id,
        disconnect_token,
    )
    .await;

    // Cleanup
    forward_handle.abort();
    let _ = transport.close().await;
    clients.remove(&client_id);
    tracing::debug!(client_id = %client_id, "Client removed from registry");

    Ok(())
}

/// Perform protocol handshake with a client
async fn perform_handshake(
    transport: &Arc<dyn Transport>,
    addr: SocketAddr,
) -> BusResult<String> {
    tracing::debug!("Waiting for handshake from {}", addr);

    let msg = transport.read_message().await.map_err(|e| {
        tracing::warn!("Client {} handshake error: {}", addr, e);
        e
    })?;

    if msg.event_type != EventType::Handshake {
        tracing::warn!(
            "Client {} failed to handshake: expected Handshake, got {}",
            addr,
            msg.event_type
        );
        return Err(BusError::Protocol("Expected Handshake message".into()));
    }

    let payload: HandshakePayload = msg.parse_payload().map_err(|e| {
        tracing::warn!("Client {} sent invalid handshake payload: {}", addr, e);
        BusError::Protocol(format!("Invalid handshake payload: {e}"))
    })?;

    // Version check
    if payload.version != PROTOCOL_VERSION {
        tracing::warn!(
            "Client {} protocol version mismatch: expected {}, got {}",
            addr,
            PROTOCOL_VERSION,
            payload.version
        );

        send_handshake_error(
            transport,
            &msg,
            &format!(
                "Protocol version mismatch: server={}, client={}. Please update your client.",
                PROTOCOL_VERSION, payload.version
            ),
        )
        .await;

        return Err(BusError::Protocol("Protocol version mismatch".into()));
    }

    let client_id = payload
        .client_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::debug!(
        "Client {} handshake success (v{}, client: {:?}, id: {})",
        addr,
        payload.version,
        payload.client_name,
        client_id
    );

    // RPC 响应 (用 correlation_id 关联客户端的 request_id)
    let response_payload = ResponsePayload::success(format!("Connected as client: {client_id}"));
    let response = BusMessage::response(&response_payload).with_correlation_id(msg.request_id);
    if let Err(e) = transport.write_message(&response).await {
        tracing::warn!("Failed to send handshake response: {}", e);
    }

    Ok(client_id)
}

/// Delay before closing the connection after sending an error (allows the
/// client to receive the message)
const HANDSHAKE_ERROR_DELAY_MS: u64 = 100;

/// Send a handshake error to the client
async fn send_handshake_error(transport: &Arc<dyn Transport>, msg: &BusMessage, message: &str) {
    let response_payload = ResponsePayload::error(message);
    let response = BusMessage::response(&response_payload).with_correlation_id(msg.request_id);

    if let Err(e) = transport.write_message(&response).await {
        tracing::error!("Failed to send handshake error: {}", e);
    }

    tokio::time::sleep(tokio::time::Duration::from_millis(HANDSHAKE_ERROR_DELAY_MS)).await;
}

/// Spawn the per-client task that copies server broadcasts to the transport
fn spawn_server_to_client_forwarder(
    transport: Arc<dyn Transport>,
    mut rx: broadcast::Receiver<BusMessage>,
    shutdown_token: CancellationToken,
    client_id: String,
    disconnect_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::debug!("Client {} forwarder shutting down", client_id);
                    break;
                }
                _ = disconnect_token.cancelled() => {
                    tracing::debug!(client_id = %client_id, "Client disconnected, forwarder stopping");
                    break;
                }
                msg_result = rx.recv() => {
                    match msg_result {
                        Ok(msg) => {
                            // Unicast filtering: only send if target matches or no target
                            if msg.target.as_ref().is_some_and(|target| target != &client_id) {
                                continue;
                            }

                            if let Err(e) = transport.write_message(&msg).await {
                                tracing::warn!(client_id = %client_id, "Dropping subscriber, write failed: {}", e);
                                disconnect_token.cancel();
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // 跟不上的订阅者被移除；重连后需调 getActiveOrder 补全状态
                            tracing::warn!(
                                client_id = %client_id,
                                skipped,
                                "Dropping subscriber, lagged behind broadcast"
                            );
                            disconnect_token.cancel();
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Broadcast channel closed, forwarder stopping");
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Read inbound messages from the client until it disconnects
async fn read_client_messages(
    transport: &Arc<dyn Transport>,
    client_tx: &broadcast::Sender<BusMessage>,
    shutdown_token: &CancellationToken,
    client_id: &str,
    disconnect_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => break,
            _ = disconnect_token.cancelled() => break,
            msg_result = transport.read_message() => {
                match msg_result {
                    Ok(mut msg) => {
                        // 重复握手/杂散响应不进入业务通道
                        if matches!(msg.event_type, EventType::Handshake | EventType::Response) {
                            continue;
                        }
                        msg.source = Some(client_id.to_string());
                        if client_tx.send(msg).is_err() {
                            tracing::debug!("No message handler running, inbound message dropped");
                        }
                    }
                    Err(BusError::Disconnected) => {
                        tracing::debug!(client_id = %client_id, "Client disconnected");
                        disconnect_token.cancel();
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(client_id = %client_id, "Client read failed: {}", e);
                        disconnect_token.cancel();
                        break;
                    }
                }
            }
        }
    }
}
