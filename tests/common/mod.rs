//! Common test utilities for E2E tests
//!
//! `MockBackend` is an in-process axum server speaking the notification
//! REST endpoints and the push WebSocket under `/api`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use nexus_notify::api::NotificationApi;
use nexus_notify::push::ReconnectPolicy;
use nexus_notify::{CredentialStore, NotificationClient, NotificationEvent};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// How a mutating endpoint should fail
#[derive(Debug, Clone)]
pub enum Failure {
    /// Respond with this status code
    Status(u16),
    /// Respond 200 with `{"success": false, "error": ...}`
    Rejected(String),
}

#[derive(Default)]
struct Failures {
    list: Option<u16>,
    mark_read: Option<Failure>,
    mark_all_read: Option<Failure>,
    handshake: Option<u16>,
}

struct BackendState {
    token: String,
    notifications: Mutex<Vec<Value>>,
    unread_count: Mutex<u64>,
    failures: Mutex<Failures>,
    requests: Mutex<Vec<String>>,
    push_users: Mutex<Vec<String>>,
    push_tx: broadcast::Sender<String>,
    kick_tx: broadcast::Sender<()>,
    connections: AtomicUsize,
    no_content_acks: AtomicBool,
}

/// Mock notification backend
pub struct MockBackend {
    pub addr: String,
    state: Arc<BackendState>,
}

impl MockBackend {
    /// Start a backend accepting `token` as the only valid credential
    pub async fn start(token: &str) -> Self {
        let (push_tx, _) = broadcast::channel(64);
        let (kick_tx, _) = broadcast::channel(4);
        let state = Arc::new(BackendState {
            token: token.to_string(),
            notifications: Mutex::new(Vec::new()),
            unread_count: Mutex::new(0),
            failures: Mutex::new(Failures::default()),
            requests: Mutex::new(Vec::new()),
            push_users: Mutex::new(Vec::new()),
            push_tx,
            kick_tx,
            connections: AtomicUsize::new(0),
            no_content_acks: AtomicBool::new(false),
        });

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = build_test_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
        }
    }

    /// API base URL (with the `/api` prefix)
    pub fn api_url(&self) -> url::Url {
        url::Url::parse(&format!("{}/api", self.addr)).unwrap()
    }

    /// Client against this backend with a short fixed reconnect delay
    pub fn client(&self, credentials: CredentialStore) -> NotificationClient {
        let api = NotificationApi::with_client(reqwest::Client::new(), self.api_url(), 20);
        NotificationClient::builder(api, credentials)
            .reconnect_policy(ReconnectPolicy::fixed(Duration::from_millis(200)))
            .build()
    }

    /// Replace the stored list (newest first) and the unread counter
    pub fn seed(&self, notifications: Vec<Value>, unread_count: u64) {
        *self.state.notifications.lock().unwrap() = notifications;
        *self.state.unread_count.lock().unwrap() = unread_count;
    }

    pub fn fail_list(&self, status: u16) {
        self.state.failures.lock().unwrap().list = Some(status);
    }

    pub fn fail_mark_read(&self, failure: Failure) {
        self.state.failures.lock().unwrap().mark_read = Some(failure);
    }

    pub fn fail_mark_all_read(&self, failure: Failure) {
        self.state.failures.lock().unwrap().mark_all_read = Some(failure);
    }

    /// Answer successful `PUT`s with `204 No Content` instead of a JSON body
    pub fn acknowledge_without_body(&self, enabled: bool) {
        self.state.no_content_acks.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_handshake(&self, status: Option<u16>) {
        self.state.failures.lock().unwrap().handshake = status;
    }

    /// `METHOD path?query` of every REST request received
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Whether the backend considers `id` read
    pub fn is_read(&self, id: &str) -> bool {
        self.state
            .notifications
            .lock()
            .unwrap()
            .iter()
            .any(|item| item["id"] == id && item["read"] == true)
    }

    /// User ids the push channel was opened for, in order
    pub fn push_users(&self) -> Vec<String> {
        self.state.push_users.lock().unwrap().clone()
    }

    /// Push channels opened so far
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` push channels have been opened
    pub async fn wait_for_connections(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.connections() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("push channel was not opened in time");
    }

    /// Send one raw text frame to every open push channel
    pub fn push_raw(&self, payload: impl Into<String>) {
        self.state.push_tx.send(payload.into()).unwrap();
    }

    /// Send one notification to every open push channel
    pub fn push(&self, notification: Value) {
        self.push_raw(notification.to_string());
    }

    /// Close every open push channel from the server side
    pub fn close_push_channels(&self) {
        let _ = self.state.kick_tx.send(());
    }
}

/// Notification JSON as the backend sends it
pub fn notification(id: &str, kind: &str, read: bool) -> Value {
    json!({
        "_id": format!("oid-{}", id),
        "id": id,
        "recipient_id": "user-1",
        "sender_id": "user-2",
        "type": kind,
        "content": format!("{} notification {}", kind, id),
        "link": format!("/posts/{}", id),
        "read": read,
        "created_at": "2026-10-19T08:00:00Z"
    })
}

/// Unsigned token carrying `sub`
pub fn token_for(sub: &str) -> String {
    use base64::{Engine as _, engine::general_purpose};

    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(json!({ "sub": sub }).to_string());
    format!("{}.{}.test-signature", header, payload)
}

/// Wait for the next event matching `predicate`
pub async fn next_event<F>(
    events: &mut broadcast::Receiver<NotificationEvent>,
    predicate: F,
) -> NotificationEvent
where
    F: Fn(&NotificationEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

/// Ids of `notifications` in order
pub fn ids(notifications: &[nexus_notify::Notification]) -> Vec<String> {
    notifications.iter().map(|n| n.id.clone()).collect()
}

/// Build router for testing
fn build_test_router(state: Arc<BackendState>) -> Router {
    let api = Router::new()
        .route("/notifications/", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/:id/read", put(mark_read))
        .route("/notifications/ws/:user_id", get(push_channel));

    Router::new().nest("/api", api).with_state(state)
}

fn authorized(state: &BackendState, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {}", state.token))
}

fn record(state: &BackendState, line: String) {
    state.requests.lock().unwrap().push(line);
}

fn failure_response(failure: Failure) -> Response {
    match failure {
        Failure::Status(code) => StatusCode::from_u16(code).unwrap().into_response(),
        Failure::Rejected(error) => {
            axum::Json(json!({ "success": false, "error": error })).into_response()
        }
    }
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_notifications(
    State(state): State<Arc<BackendState>>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response {
    record(
        &state,
        format!("GET /notifications/?limit={}", query.limit.unwrap_or(0)),
    );
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(code) = state.failures.lock().unwrap().list {
        return StatusCode::from_u16(code).unwrap().into_response();
    }

    let limit = query.limit.unwrap_or(20);
    let items: Vec<Value> = state
        .notifications
        .lock()
        .unwrap()
        .iter()
        .take(limit)
        .cloned()
        .collect();
    axum::Json(items).into_response()
}

async fn unread_count(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    record(&state, "GET /notifications/unread-count".to_string());
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let count = *state.unread_count.lock().unwrap();
    axum::Json(json!({ "count": count })).into_response()
}

async fn mark_read(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    record(&state, format!("PUT /notifications/{}/read", id));
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(failure) = state.failures.lock().unwrap().mark_read.clone() {
        return failure_response(failure);
    }

    let mut notifications = state.notifications.lock().unwrap();
    let Some(item) = notifications.iter_mut().find(|item| item["id"] == id) else {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "detail": "Notification not found" })),
        )
            .into_response();
    };
    if item["read"] == false {
        item["read"] = json!(true);
        let mut unread = state.unread_count.lock().unwrap();
        *unread = unread.saturating_sub(1);
    }

    acknowledge(&state, json!({ "success": true }))
}

async fn mark_all_read(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    record(&state, "PUT /notifications/read-all".to_string());
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(failure) = state.failures.lock().unwrap().mark_all_read.clone() {
        return failure_response(failure);
    }

    let mut count = 0;
    for item in state.notifications.lock().unwrap().iter_mut() {
        if item["read"] == false {
            item["read"] = json!(true);
            count += 1;
        }
    }
    *state.unread_count.lock().unwrap() = 0;

    acknowledge(&state, json!({ "success": true, "count": count }))
}

fn acknowledge(state: &BackendState, body: Value) -> Response {
    if state.no_content_acks.load(Ordering::SeqCst) {
        return StatusCode::NO_CONTENT.into_response();
    }
    axum::Json(body).into_response()
}

async fn push_channel(
    State(state): State<Arc<BackendState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(code) = state.failures.lock().unwrap().handshake {
        return StatusCode::from_u16(code).unwrap().into_response();
    }
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| serve_push(socket, state, user_id))
}

async fn serve_push(mut socket: WebSocket, state: Arc<BackendState>, user_id: String) {
    let mut pushes = state.push_tx.subscribe();
    let mut kicks = state.kick_tx.subscribe();
    state.push_users.lock().unwrap().push(user_id);
    state.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            push = pushes.recv() => match push {
                Ok(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = kicks.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
