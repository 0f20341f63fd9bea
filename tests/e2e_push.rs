//! E2E tests for the WebSocket push channel

mod common;

use std::time::Duration;

use common::{MockBackend, ids, next_event, notification, token_for};
use nexus_notify::{ConnectionState, CredentialStore, NotificationEvent};

async fn connected_client() -> (MockBackend, nexus_notify::NotificationClient) {
    let token = token_for("user-1");
    let backend = MockBackend::start(&token).await;
    backend.seed(vec![notification("n1", "follow", false)], 1);

    let client = backend.client(CredentialStore::with_token(token));
    client.fetch_unread_count().await.unwrap();
    client.fetch_notifications().await.unwrap();
    client.connect().await.unwrap();
    backend.wait_for_connections(1).await;

    (backend, client)
}

fn is_received(event: &NotificationEvent, id: &str) -> bool {
    matches!(event, NotificationEvent::Received(n) if n.id == id)
}

#[tokio::test]
async fn test_push_address_uses_token_subject() {
    let (backend, client) = connected_client().await;

    assert_eq!(backend.push_users(), vec!["user-1"]);
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    client.disconnect().await;
}

#[tokio::test]
async fn test_push_is_prepended_and_counted() {
    let (backend, client) = connected_client().await;
    let mut events = client.subscribe();

    backend.push(notification("n2", "like", false));
    next_event(&mut events, |event| is_received(event, "n2")).await;

    assert_eq!(ids(&client.notifications().await), vec!["n2", "n1"]);
    assert_eq!(client.unread_count().await, 2);

    client.disconnect().await;
}

#[tokio::test]
async fn test_redelivered_push_is_ignored() {
    let (backend, client) = connected_client().await;
    let mut events = client.subscribe();

    backend.push(notification("n2", "like", false));
    backend.push(notification("n2", "like", false));
    backend.push(notification("n1", "follow", false));
    backend.push(notification("n3", "comment", false));
    next_event(&mut events, |event| is_received(event, "n3")).await;

    assert_eq!(ids(&client.notifications().await), vec!["n3", "n2", "n1"]);
    assert_eq!(client.unread_count().await, 3);

    client.disconnect().await;
}

#[tokio::test]
async fn test_push_duplicate_keeps_local_read_state() {
    let (backend, client) = connected_client().await;
    let mut events = client.subscribe();

    client.mark_read("n1").await.unwrap();
    backend.push(notification("n1", "follow", false));
    backend.push(notification("n2", "like", false));
    next_event(&mut events, |event| is_received(event, "n2")).await;

    let notifications = client.notifications().await;
    assert!(notifications.iter().find(|n| n.id == "n1").unwrap().read);
    assert_eq!(client.unread_count().await, 1);

    client.disconnect().await;
}

#[tokio::test]
async fn test_malformed_push_is_dropped_without_disconnecting() {
    let (backend, client) = connected_client().await;
    let mut events = client.subscribe();

    backend.push_raw("definitely not json");
    backend.push_raw(r#"{"id": "missing-fields"}"#);
    backend.push(notification("n2", "mystery-kind", false));
    let event = next_event(&mut events, |event| is_received(event, "n2")).await;

    let NotificationEvent::Received(received) = event else {
        unreachable!()
    };
    assert_eq!(received.kind, nexus_notify::NotificationKind::Other);
    assert_eq!(ids(&client.notifications().await), vec!["n2", "n1"]);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert_eq!(backend.connections(), 1);

    client.disconnect().await;
}

#[tokio::test]
async fn test_reconnects_after_server_closes_channel() {
    let (backend, client) = connected_client().await;
    let mut events = client.subscribe();

    backend.close_push_channels();
    next_event(&mut events, |event| {
        *event == NotificationEvent::ConnectionStateChanged(ConnectionState::Closed)
    })
    .await;
    backend.wait_for_connections(2).await;
    next_event(&mut events, |event| {
        *event == NotificationEvent::ConnectionStateChanged(ConnectionState::Connected)
    })
    .await;

    backend.push(notification("n2", "story", false));
    next_event(&mut events, |event| is_received(event, "n2")).await;
    assert_eq!(client.unread_count().await, 2);

    client.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_stops_reconnecting() {
    let (backend, client) = connected_client().await;

    client.disconnect().await;
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(backend.connections(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_rejected_handshake_requests_authentication_and_retries() {
    let token = token_for("user-1");
    let backend = MockBackend::start(&token).await;
    backend.fail_handshake(Some(401));

    let client = backend.client(CredentialStore::with_token(token));
    let mut events = client.subscribe();
    client.connect().await.unwrap();

    next_event(&mut events, |event| {
        *event == NotificationEvent::AuthenticationRequired
    })
    .await;

    backend.fail_handshake(None);
    backend.wait_for_connections(1).await;
    next_event(&mut events, |event| {
        *event == NotificationEvent::ConnectionStateChanged(ConnectionState::Connected)
    })
    .await;

    client.disconnect().await;
}

#[tokio::test]
async fn test_initialize_loads_state_and_connects() {
    let token = token_for("42");
    let backend = MockBackend::start(&token).await;
    backend.seed(
        vec![
            notification("n2", "comment", false),
            notification("n1", "like", true),
        ],
        1,
    );

    let client = backend.client(CredentialStore::with_token(token));
    client.initialize().await;
    backend.wait_for_connections(1).await;

    assert_eq!(ids(&client.notifications().await), vec!["n2", "n1"]);
    assert_eq!(client.unread_count().await, 1);
    assert_eq!(backend.push_users(), vec!["42"]);

    client.disconnect().await;
}

#[tokio::test]
async fn test_initialize_connects_even_when_fetch_fails() {
    let token = token_for("user-1");
    let backend = MockBackend::start(&token).await;
    backend.fail_list(500);

    let client = backend.client(CredentialStore::with_token(token));
    client.initialize().await;
    backend.wait_for_connections(1).await;

    assert!(client.notifications().await.is_empty());
    assert!(client.connection_state().is_active());

    client.disconnect().await;
}
