//! End-to-end tests over real sockets: duplex-channel bootstrap, capability
//! rejection, request/respond routing and connection teardown.

mod common;

use common::port_utils::get_unreachable_address;
use edgelink::{EdgeData, EdgeError, EdgeEvent, EdgeHandle, CLIENT_ID_KEY};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// Build a node advertising `caps` whose callback accepts exactly
/// `accept_caps` and forwards every event to the returned channel.
async fn make_node(caps: &str, accept_caps: &str) -> (EdgeHandle, UnboundedReceiver<EdgeEvent>) {
    let handle = EdgeHandle::new("test-node", "test-topic").unwrap();
    handle.set_info("IP", "127.0.0.1").await.unwrap();
    handle.set_info("PORT", "0").await.unwrap();
    handle.set_info("CAPS", caps).await.unwrap();

    let (tx, rx) = unbounded_channel();
    let accept_caps = accept_caps.to_string();
    handle
        .set_event_callback(move |event| {
            let verdict = match &event {
                EdgeEvent::Capability { caps } if *caps != accept_caps => {
                    Err(EdgeError::connection("incompatible capability"))
                }
                _ => Ok(()),
            };
            let _ = tx.send(event);
            verdict
        })
        .await
        .unwrap();

    (handle, rx)
}

/// Receive the next data event, skipping handshake events.
async fn next_data(rx: &mut UnboundedReceiver<EdgeEvent>) -> EdgeData {
    loop {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if let EdgeEvent::NewDataReceived { data } = event {
            return data;
        }
    }
}

/// Wait until the node has both directions registered for the peer id.
async fn wait_duplex(handle: &EdgeHandle, client_id: i64) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some((true, true)) = handle.connection_info(client_id).await.unwrap() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "duplex channel was not established in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn connect_builds_duplex_channel_on_both_nodes() {
    let (a, _a_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    a.start(true).await.unwrap();
    let a_port = a.port().await.unwrap();

    let (b, _b_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    b.start(false).await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();

    let peer_id = b.client_id().await.unwrap();
    assert!(peer_id > 0);

    // The accept side's reverse dial completes the channel: both nodes end
    // up with an inbound and an outbound connection for the same peer id.
    wait_duplex(&a, peer_id).await;
    wait_duplex(&b, peer_id).await;

    a.release().await.unwrap();
    b.release().await.unwrap();
}

#[tokio::test]
async fn request_and_respond_roundtrip() {
    let (a, mut a_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    a.start(true).await.unwrap();
    let a_port = a.port().await.unwrap();

    let (b, mut b_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    b.start(false).await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();

    let peer_id = b.client_id().await.unwrap();
    wait_duplex(&a, peer_id).await;
    wait_duplex(&b, peer_id).await;

    let mut payload = EdgeData::new();
    payload.add_bytes(patterned(128, 3)).unwrap();
    payload.add_bytes(patterned(256, 101)).unwrap();
    b.request(&payload).await.unwrap();

    let received = next_data(&mut a_events).await;
    assert_eq!(received.count(), 2);
    assert_eq!(received.buffer(0).unwrap(), &patterned(128, 3)[..]);
    assert_eq!(received.buffer(1).unwrap(), &patterned(256, 101)[..]);
    assert_eq!(
        received.info(CLIENT_ID_KEY),
        Some(peer_id.to_string().as_str())
    );

    // Respond using the received data; its peer id metadata routes the
    // frame back to the requester's inbound connection.
    a.respond(&received).await.unwrap();

    let response = next_data(&mut b_events).await;
    assert_eq!(response.count(), 2);
    assert_eq!(response.buffer(0).unwrap(), &patterned(128, 3)[..]);
    assert_eq!(response.buffer(1).unwrap(), &patterned(256, 101)[..]);
    assert_eq!(
        response.info(CLIENT_ID_KEY),
        Some(peer_id.to_string().as_str())
    );

    a.release().await.unwrap();
    b.release().await.unwrap();
}

#[tokio::test]
async fn requests_are_delivered_in_send_order() {
    let (a, mut a_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    a.start(true).await.unwrap();
    let a_port = a.port().await.unwrap();

    let (b, _b_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    b.start(false).await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();

    let peer_id = b.client_id().await.unwrap();
    wait_duplex(&a, peer_id).await;
    wait_duplex(&b, peer_id).await;

    for seed in 0..3u8 {
        let mut payload = EdgeData::new();
        payload.add_bytes(patterned(64, seed)).unwrap();
        b.request(&payload).await.unwrap();
    }

    for seed in 0..3u8 {
        let received = next_data(&mut a_events).await;
        assert_eq!(received.buffer(0).unwrap(), &patterned(64, seed)[..]);
    }

    a.release().await.unwrap();
    b.release().await.unwrap();
}

#[tokio::test]
async fn capability_rejection_registers_no_connection() {
    let (a, _a_events) = make_node("fmt=tensor/v2", "fmt=tensor/v2").await;
    a.start(true).await.unwrap();
    let a_port = a.port().await.unwrap();

    // B only accepts v1, so A's v2 capability is rejected.
    let (b, _b_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    b.start(false).await.unwrap();

    let result = b.connect("127.0.0.1", a_port).await;
    assert!(matches!(result, Err(EdgeError::ConnectionFailure(_))));
    assert!(b.connected_peers().await.unwrap().is_empty());

    // A's accept side saw the error frame instead of host info and must not
    // have committed an entry either.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(a.connected_peers().await.unwrap().is_empty());

    a.release().await.unwrap();
    b.release().await.unwrap();
}

#[tokio::test]
async fn disconnect_unblocks_receiver_and_clears_table() {
    let (a, _a_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    a.start(true).await.unwrap();
    let a_port = a.port().await.unwrap();

    let (b, _b_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    b.start(false).await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();

    let peer_id = b.client_id().await.unwrap();
    wait_duplex(&b, peer_id).await;

    // B's receiver is blocked reading its inbound connection; disconnect
    // must cancel it promptly and leave no dangling entry.
    timeout(WAIT, b.disconnect())
        .await
        .expect("disconnect should not hang on a blocked receiver")
        .unwrap();
    assert!(b.connected_peers().await.unwrap().is_empty());

    a.release().await.unwrap();
    b.release().await.unwrap();
}

#[tokio::test]
async fn peer_loss_fails_request_with_connection_failure() {
    let (a, _a_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    a.start(true).await.unwrap();
    let a_port = a.port().await.unwrap();

    let (b, _b_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    b.start(false).await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();

    let peer_id = b.client_id().await.unwrap();
    wait_duplex(&b, peer_id).await;

    // Abrupt peer loss: the peer closes everything, no reconnection is
    // attempted on our side.
    a.release().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut payload = EdgeData::new();
    payload.add_bytes(vec![1, 2, 3]).unwrap();
    let result = b.request(&payload).await;
    assert!(matches!(result, Err(EdgeError::ConnectionFailure(_))));

    b.release().await.unwrap();
}

#[tokio::test]
async fn connect_to_unreachable_address_fails() {
    let (b, _b_events) = make_node("fmt=tensor/v1", "fmt=tensor/v1").await;
    b.start(false).await.unwrap();

    let (ip, port) = get_unreachable_address();
    let result = b.connect(&ip, port).await;
    assert!(matches!(result, Err(EdgeError::ConnectionFailure(_))));
    assert!(b.connected_peers().await.unwrap().is_empty());

    b.release().await.unwrap();
}
