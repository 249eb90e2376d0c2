//! End-to-end tests for the streaming sync channel: a real TCP subscriber
//! receiving change events produced through the aggregator.

use std::time::Duration;

use comanda_server::message::{
    BusMessage, EventType, HandshakePayload, ItemReadyPayload, OrderSyncPayload, PROTOCOL_VERSION,
    ResponsePayload, SyncAction, TcpTransport, Transport,
};
use comanda_server::{Config, ServerState};
use shared::order::OrderItem;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

async fn start_server() -> (ServerState, String, TempDir) {
    let work_dir = tempfile::tempdir().expect("temp work dir");
    // Random port to avoid conflicts between parallel tests
    let port = 10000 + (rand::random::<u16>() % 20000);
    let config = Config::with_overrides(work_dir.path().to_string_lossy(), 0, port);

    let state = ServerState::initialize(&config).await.expect("state init");
    state.start_background_tasks();

    let bus = state.message_bus().clone();
    tokio::spawn(async move {
        let _ = bus.start_tcp_server().await;
    });

    (state, format!("127.0.0.1:{port}"), work_dir)
}

async fn connect(addr: &str) -> TcpTransport {
    for _ in 0..50 {
        if let Ok(transport) = TcpTransport::connect(addr).await {
            return transport;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("could not connect to {addr}");
}

async fn connect_and_handshake(addr: &str, name: &str) -> TcpTransport {
    let transport = connect(addr).await;

    let handshake = BusMessage::handshake(&HandshakePayload {
        version: PROTOCOL_VERSION,
        client_name: Some(name.into()),
        client_id: None,
    });
    transport.write_message(&handshake).await.expect("send handshake");

    let response = timeout(Duration::from_secs(5), transport.read_message())
        .await
        .expect("handshake response in time")
        .expect("handshake response");
    assert_eq!(response.event_type, EventType::Response);
    assert_eq!(response.correlation_id, Some(handshake.request_id));
    let payload: ResponsePayload = response.parse_payload().unwrap();
    assert!(payload.success, "handshake rejected: {}", payload.message);

    transport
}

async fn read_sync(transport: &TcpTransport) -> OrderSyncPayload {
    let msg = timeout(Duration::from_secs(5), transport.read_message())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(msg.event_type, EventType::Sync);
    msg.parse_payload().unwrap()
}

fn item(product_id: i64, name: &str, price: f64, quantity: i64) -> OrderItem {
    OrderItem {
        product_id,
        name: name.into(),
        price,
        quantity,
    }
}

#[tokio::test]
async fn test_subscriber_sees_submit_close_lifecycle() {
    let (state, addr, _work_dir) = start_server().await;
    let client = connect_and_handshake(&addr, "pos-terminal-1").await;

    state
        .aggregator()
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();

    let created = read_sync(&client).await;
    assert_eq!(created.action, SyncAction::Created);
    assert_eq!(created.table_id, 7);
    let order = created.order.expect("order body");
    assert_eq!(order.total(), 1.2);
    assert_eq!(created.new_items.len(), 1);

    state
        .aggregator()
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 2), item(9, "Tea", 1.0, 1)])
        .await
        .unwrap();

    let updated = read_sync(&client).await;
    assert_eq!(updated.action, SyncAction::Updated);
    let order = updated.order.expect("order body");
    assert_eq!(order.item(5).unwrap().quantity, 3);
    assert_eq!(order.total(), 4.6);
    // Only Tea is new in the second call
    assert_eq!(updated.new_items.len(), 1);
    assert_eq!(updated.new_items[0].product_id, 9);

    state.aggregator().close_order(7).await.unwrap();
    let closed = read_sync(&client).await;
    assert_eq!(closed.action, SyncAction::Closed);
    assert!(closed.order.unwrap().closed);
}

#[tokio::test]
async fn test_item_ready_reaches_every_subscriber_including_origin() {
    let (_state, addr, _work_dir) = start_server().await;
    let waiter = connect_and_handshake(&addr, "pos-terminal-1").await;
    let kitchen = connect_and_handshake(&addr, "kitchen-display").await;

    let ready = ItemReadyPayload {
        product_id: 5,
        name: "Coffee".into(),
        quantity: 2,
        table_number: 7,
    };
    kitchen
        .write_message(&BusMessage::item_ready(&ready))
        .await
        .unwrap();

    for client in [&waiter, &kitchen] {
        let msg = timeout(Duration::from_secs(5), client.read_message())
            .await
            .expect("relay in time")
            .expect("relay");
        assert_eq!(msg.event_type, EventType::ItemReady);
        assert_eq!(msg.parse_payload::<ItemReadyPayload>().unwrap(), ready);
    }
}

#[tokio::test]
async fn test_reconnecting_subscriber_gets_no_replay() {
    let (state, addr, _work_dir) = start_server().await;

    let client = connect_and_handshake(&addr, "front-desk").await;
    state
        .aggregator()
        .submit_order(7, 2, vec![item(5, "Coffee", 1.2, 1)])
        .await
        .unwrap();
    assert_eq!(read_sync(&client).await.action, SyncAction::Created);
    client.close().await.unwrap();

    // Published while disconnected; nobody buffers it for us
    state
        .aggregator()
        .submit_order(7, 2, vec![item(9, "Tea", 1.0, 1)])
        .await
        .unwrap();

    let client = connect_and_handshake(&addr, "front-desk").await;
    let nothing = timeout(Duration::from_millis(300), client.read_message()).await;
    assert!(nothing.is_err(), "reconnect must not replay missed events");

    // Only events published after the reconnect arrive
    state.aggregator().close_order(7).await.unwrap();
    assert_eq!(read_sync(&client).await.action, SyncAction::Closed);
}

#[tokio::test]
async fn test_protocol_version_mismatch_is_rejected() {
    let (_state, addr, _work_dir) = start_server().await;
    let transport = connect(&addr).await;

    let handshake = BusMessage::handshake(&HandshakePayload {
        version: PROTOCOL_VERSION + 1,
        client_name: Some("stale-client".into()),
        client_id: None,
    });
    transport.write_message(&handshake).await.unwrap();

    let response = timeout(Duration::from_secs(5), transport.read_message())
        .await
        .expect("response in time")
        .expect("response");
    let payload: ResponsePayload = response.parse_payload().unwrap();
    assert!(!payload.success);
    assert!(payload.message.contains("version mismatch"));
}
