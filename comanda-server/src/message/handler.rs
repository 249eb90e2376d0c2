//! Message Handler for server-side message processing
//!
//! Subscribes to the inbound (client -> server) channel and relays
//! client-originated messages back out to every subscriber. The stream is
//! never an authoritative mutation path: order state only changes through
//! the HTTP submit endpoints. Kitchen "item ready" notices and any other
//! client chatter are re-broadcast verbatim so every connected display
//! sees them.

use shared::message::{BusMessage, EventType, ItemReadyPayload};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Server-side relay for client-originated bus messages
pub struct MessageHandler {
    receiver: broadcast::Receiver<BusMessage>,
    broadcast_tx: broadcast::Sender<BusMessage>,
    shutdown_token: CancellationToken,
}

impl MessageHandler {
    /// Create a new message handler
    pub fn new(
        receiver: broadcast::Receiver<BusMessage>,
        broadcast_tx: broadcast::Sender<BusMessage>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            broadcast_tx,
            shutdown_token,
        }
    }

    /// Start processing messages
    ///
    /// This is a long-running task that should be spawned in the background.
    pub async fn run(mut self) {
        tracing::info!("Message handler started");

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Message handler shutting down");
                    break;
                }

                msg_result = self.receiver.recv() => {
                    match msg_result {
                        Ok(msg) => self.handle_message(msg),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Message handler lagged, skipped {} messages", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Inbound message channel closed");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Message handler stopped");
    }

    /// Handle a single inbound message
    fn handle_message(&self, msg: BusMessage) {
        match msg.event_type {
            // 协议消息不转发
            EventType::Handshake | EventType::Response => {}

            EventType::ItemReady => {
                match msg.parse_payload::<ItemReadyPayload>() {
                    Ok(ready) => {
                        tracing::info!(
                            table = ready.table_number,
                            product = %ready.name,
                            quantity = ready.quantity,
                            "Kitchen marked item ready"
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Malformed item-ready payload, relaying anyway: {}", e);
                    }
                }
                self.rebroadcast(msg);
            }

            // Legacy passthrough: anything else a client says is repeated
            // to every subscriber
            _ => self.rebroadcast(msg),
        }
    }

    fn rebroadcast(&self, msg: BusMessage) {
        if let Err(e) = self.broadcast_tx.send(msg) {
            tracing::trace!("Relay dropped, no subscribers: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBus;
    use shared::message::{HandshakePayload, NotificationPayload, PROTOCOL_VERSION};

    fn spawn_handler(bus: &MessageBus) {
        let handler = MessageHandler::new(
            bus.subscribe_to_clients(),
            bus.sender().clone(),
            bus.shutdown_token().clone(),
        );
        tokio::spawn(handler.run());
    }

    #[tokio::test]
    async fn test_item_ready_is_relayed_to_subscribers() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe();
        spawn_handler(&bus);

        let ready = ItemReadyPayload {
            product_id: 5,
            name: "Coffee".into(),
            quantity: 2,
            table_number: 7,
        };
        bus.send_to_server(BusMessage::item_ready(&ready).with_source("kitchen-1"));

        let relayed = rx.recv().await.unwrap();
        assert_eq!(relayed.event_type, EventType::ItemReady);
        assert_eq!(relayed.parse_payload::<ItemReadyPayload>().unwrap(), ready);
    }

    #[tokio::test]
    async fn test_legacy_messages_pass_through_verbatim() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe();
        spawn_handler(&bus);

        let note = BusMessage::notification(&NotificationPayload::info("hola", "legacy text"));
        bus.send_to_server(note.clone());

        let relayed = rx.recv().await.unwrap();
        assert_eq!(relayed.request_id, note.request_id);
        assert_eq!(relayed.payload, note.payload);
    }

    #[tokio::test]
    async fn test_protocol_messages_are_not_relayed() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe();
        spawn_handler(&bus);

        bus.send_to_server(BusMessage::handshake(&HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: None,
            client_id: None,
        }));
        // 紧随其后的业务消息应是订阅者看到的第一条
        bus.send_to_server(BusMessage::notification(&NotificationPayload::info(
            "after", "handshake",
        )));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type, EventType::Notification);
    }
}
