//! Notification client
//!
//! Combines the REST list (source of truth at fetch time) with the live push
//! channel, keeps read state, and reconnects on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::JoinHandle;

use super::alerts::{AlertPermission, AlertSink, DesktopAlert, NoAlerts};
use crate::api::NotificationApi;
use crate::auth::{BearerToken, CredentialStore};
use crate::config::AppConfig;
use crate::data::{Notification, NotificationStore, PendingChange, PushOutcome};
use crate::error::NotifyError;
use crate::push::{ConnectionState, PushConnector, ReconnectPolicy, WebSocketConnector, push_url};

const EVENT_CAPACITY: usize = 256;

/// Something subscribers may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// A new notification arrived over the push channel
    Received(Notification),
    /// The unread counter changed
    UnreadCountChanged(u64),
    /// The push connection moved to a new state
    ConnectionStateChanged(ConnectionState),
    /// An optimistic mark-read was rolled back after the backend refused it
    ReadStateReverted { ids: Vec<String> },
    /// The backend rejected the credential on the push handshake
    AuthenticationRequired,
}

/// Real-time notification client
///
/// Cheap to clone; clones share the same state and connection.
#[derive(Clone)]
pub struct NotificationClient {
    inner: Arc<Inner>,
}

struct Inner {
    api: NotificationApi,
    credentials: CredentialStore,
    store: RwLock<NotificationStore>,
    connector: Arc<dyn PushConnector>,
    alerts: Arc<dyn AlertSink>,
    policy: ReconnectPolicy,
    push_enabled: bool,
    events: broadcast::Sender<NotificationEvent>,
    state: watch::Sender<ConnectionState>,
    /// Bumped by every connect/disconnect; stale supervisors stop publishing
    generation: AtomicU64,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for `NotificationClient`
pub struct NotificationClientBuilder {
    api: NotificationApi,
    credentials: CredentialStore,
    connector: Option<Arc<dyn PushConnector>>,
    alerts: Option<Arc<dyn AlertSink>>,
    policy: ReconnectPolicy,
    push_enabled: bool,
}

impl NotificationClientBuilder {
    /// Replace the push connector (defaults to WebSocket)
    pub fn connector(mut self, connector: Arc<dyn PushConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the alert sink (defaults to no alerts)
    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn push_enabled(mut self, enabled: bool) -> Self {
        self.push_enabled = enabled;
        self
    }

    pub fn build(self) -> NotificationClient {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let connector: Arc<dyn PushConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector::new()),
        };
        let alerts: Arc<dyn AlertSink> = match self.alerts {
            Some(alerts) => alerts,
            None => Arc::new(NoAlerts),
        };

        NotificationClient {
            inner: Arc::new(Inner {
                api: self.api,
                credentials: self.credentials,
                store: RwLock::new(NotificationStore::new()),
                connector,
                alerts,
                policy: self.policy,
                push_enabled: self.push_enabled,
                events,
                state,
                generation: AtomicU64::new(0),
                supervisor: Mutex::new(None),
            }),
        }
    }
}

impl NotificationClient {
    pub fn builder(api: NotificationApi, credentials: CredentialStore) -> NotificationClientBuilder {
        NotificationClientBuilder {
            api,
            credentials,
            connector: None,
            alerts: None,
            policy: ReconnectPolicy::default(),
            push_enabled: true,
        }
    }

    /// Build a client from loaded configuration
    ///
    /// # Errors
    /// Returns error if the API base URL or HTTP client is invalid
    pub fn from_config(
        config: &AppConfig,
        credentials: CredentialStore,
    ) -> Result<NotificationClientBuilder, NotifyError> {
        let api = NotificationApi::from_config(config)?;

        Ok(Self::builder(api, credentials)
            .reconnect_policy(ReconnectPolicy::from(&config.push.reconnect))
            .push_enabled(config.push.enabled))
    }

    /// Load the initial state, then open the push channel
    ///
    /// Fetch failures are logged and do not prevent the push connection.
    pub async fn initialize(&self) {
        let (count, list) = tokio::join!(self.fetch_unread_count(), self.fetch_notifications());

        if let Err(error) = count {
            tracing::warn!(%error, kind = error.kind(), "Initial unread count unavailable");
        }
        if let Err(error) = list {
            tracing::warn!(%error, kind = error.kind(), "Initial notification list unavailable");
        }

        if self.inner.alerts.permission() == AlertPermission::Default {
            let permission = self.inner.alerts.request_permission();
            tracing::debug!(?permission, "Alert permission requested");
        }

        if let Err(error) = self.connect().await {
            tracing::warn!(%error, kind = error.kind(), "Push channel disabled");
        }
    }

    /// Fetch the notification list and merge it into local state
    ///
    /// # Returns
    /// The merged list, newest first
    ///
    /// # Errors
    /// `Unauthenticated` without a network call when no credential is stored
    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>, NotifyError> {
        let token = self.inner.credentials.require()?;

        let batch = self.inner.api.list(&token).await.inspect_err(|error| {
            tracing::warn!(%error, kind = error.kind(), "Failed to fetch notifications");
        })?;

        let fetched = batch.len();
        let mut store = self.inner.store.write().await;
        let inserted = store.merge_fetched(batch);

        tracing::debug!(
            fetched,
            inserted,
            total = store.len(),
            local_unread = store.local_unread(),
            "Notifications merged"
        );
        Ok(store.items().to_vec())
    }

    /// Fetch the server-authoritative unread counter and adopt it
    pub async fn fetch_unread_count(&self) -> Result<u64, NotifyError> {
        let token = self.inner.credentials.require()?;

        let count = self.inner.api.unread_count(&token).await.inspect_err(|error| {
            tracing::warn!(%error, kind = error.kind(), "Failed to fetch unread count");
        })?;

        self.inner.store.write().await.set_unread_count(count);
        self.inner.announce_unread(count);
        Ok(count)
    }

    /// Open the push channel
    ///
    /// No-op while a connection is open, being opened, or waiting to
    /// reconnect.
    ///
    /// # Errors
    /// `Unauthenticated` without a credential; `InvalidCredential` when the
    /// token carries no decodable user id. Push stays disabled in both cases.
    pub async fn connect(&self) -> Result<(), NotifyError> {
        if !self.inner.push_enabled {
            tracing::debug!("Push channel disabled by configuration");
            return Ok(());
        }

        let mut slot = self.inner.supervisor.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("Push channel already active");
            return Ok(());
        }

        let target = self.inner.push_target().inspect_err(|error| {
            tracing::warn!(%error, kind = error.kind(), "Push channel unavailable");
        })?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .publish_state(generation, ConnectionState::Connecting);

        tracing::info!(url = %target.0, "Starting push channel");
        let handle = tokio::spawn(supervise(Arc::downgrade(&self.inner), generation));
        *slot = Some(handle);

        Ok(())
    }

    /// Close the push channel and cancel any scheduled reconnect
    pub async fn disconnect(&self) {
        let mut slot = self.inner.supervisor.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        drop(slot);

        self.inner.force_state(ConnectionState::Disconnected);
        tracing::info!("Push channel disconnected");
    }

    /// Mark one notification read (optimistic, rolled back on failure)
    pub async fn mark_read(&self, id: &str) -> Result<(), NotifyError> {
        let token = self.inner.credentials.require()?;

        let change = {
            let mut store = self.inner.store.write().await;
            let change = store.begin_mark_read(id);
            if change.is_some() {
                self.inner.announce_unread(store.unread_count());
            }
            change
        };

        let result = self.inner.api.mark_read(&token, id).await;
        self.inner.settle("mark_read", change, result).await
    }

    /// Mark every notification read (optimistic, rolled back on failure)
    pub async fn mark_all_read(&self) -> Result<(), NotifyError> {
        let token = self.inner.credentials.require()?;

        let change = {
            let mut store = self.inner.store.write().await;
            let change = store.begin_mark_all_read();
            self.inner.announce_unread(store.unread_count());
            change
        };

        let result = self.inner.api.mark_all_read(&token).await.map(|updated| {
            tracing::debug!(?updated, "Backend marked notifications read");
        });
        self.inner.settle("mark_all_read", Some(change), result).await
    }

    /// Activate a notification: mark it read and return where it points
    ///
    /// Marking failures are logged; navigation still proceeds.
    pub async fn open(&self, id: &str) -> Option<String> {
        let link = self
            .inner
            .store
            .read()
            .await
            .get(id)
            .and_then(|notification| notification.link.clone());

        if let Err(error) = self.mark_read(id).await {
            tracing::debug!(%error, id, "Opening notification without read confirmation");
        }

        link
    }

    /// End the session: close the push channel and forget the credential
    /// and every notification held locally
    pub async fn sign_out(&self) {
        self.disconnect().await;
        self.inner.credentials.clear();
        self.inner.store.write().await.clear();
        self.inner.announce_unread(0);
        tracing::info!("Notification session cleared");
    }

    /// Current list, newest first
    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.store.read().await.items().to_vec()
    }

    pub async fn unread_count(&self) -> u64 {
        self.inner.store.read().await.unread_count()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Receive every event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.events.subscribe()
    }

    /// Events as a stream; lagging subscribers skip what they missed
    pub fn events(&self) -> impl Stream<Item = NotificationEvent> + Send + 'static {
        use tokio_stream::wrappers::BroadcastStream;

        BroadcastStream::new(self.subscribe()).filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(error) => {
                    tracing::warn!(%error, "Notification event subscriber lagged");
                    None
                }
            }
        })
    }
}

impl Inner {
    /// Push address and credential for the next attempt
    fn push_target(&self) -> Result<(url::Url, BearerToken), NotifyError> {
        let token = self.credentials.require()?;
        let user_id = token.subject()?;
        let url = push_url(self.api.base_url(), &user_id)?;
        Ok((url, token))
    }

    /// Publish `state` on behalf of supervisor `generation`
    ///
    /// Returns false when that supervisor has been superseded.
    fn publish_state(&self, generation: u64, state: ConnectionState) -> bool {
        let mut current = false;
        let changed = self.state.send_if_modified(|slot| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            current = true;
            if *slot == state {
                return false;
            }
            *slot = state;
            true
        });

        if changed {
            self.emit(NotificationEvent::ConnectionStateChanged(state));
        }
        current
    }

    fn force_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|slot| {
            if *slot == state {
                return false;
            }
            *slot = state;
            true
        });

        if changed {
            self.emit(NotificationEvent::ConnectionStateChanged(state));
        }
    }

    fn emit(&self, event: NotificationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn announce_unread(&self, count: u64) {
        crate::metrics::UNREAD_NOTIFICATIONS.set(i64::try_from(count).unwrap_or(i64::MAX));
        self.emit(NotificationEvent::UnreadCountChanged(count));
    }

    /// Apply one push payload
    async fn handle_push(&self, payload: &str) {
        use crate::metrics::PUSH_MESSAGES_TOTAL;

        let notification = match serde_json::from_str::<Notification>(payload) {
            Ok(notification) => notification,
            Err(error) => {
                let error = NotifyError::MalformedPushPayload(error.to_string());
                PUSH_MESSAGES_TOTAL.with_label_values(&["malformed"]).inc();
                tracing::warn!(%error, bytes = payload.len(), "Dropping push message");
                return;
            }
        };

        let (outcome, unread) = {
            let mut store = self.store.write().await;
            let outcome = store.apply_push(notification.clone());
            (outcome, store.unread_count())
        };

        match outcome {
            PushOutcome::Duplicate => {
                PUSH_MESSAGES_TOTAL.with_label_values(&["duplicate"]).inc();
                tracing::debug!(id = %notification.id, "Ignoring redelivered notification");
            }
            PushOutcome::Inserted => {
                PUSH_MESSAGES_TOTAL.with_label_values(&["accepted"]).inc();
                tracing::debug!(
                    id = %notification.id,
                    kind = notification.kind.as_str(),
                    unread,
                    "Notification received"
                );
                self.show_alert(&notification);
                self.emit(NotificationEvent::Received(notification));
                self.announce_unread(unread);
            }
        }
    }

    fn show_alert(&self, notification: &Notification) {
        if self.alerts.permission() != AlertPermission::Granted {
            return;
        }

        if let Err(error) = self.alerts.show(&DesktopAlert::for_notification(notification)) {
            tracing::debug!(%error, "Alert not shown");
        }
    }

    /// Confirm or roll back an optimistic change once the backend answered
    async fn settle(
        &self,
        operation: &'static str,
        change: Option<PendingChange>,
        result: Result<(), NotifyError>,
    ) -> Result<(), NotifyError> {
        let Some(change) = change else {
            if let Err(error) = &result {
                tracing::warn!(%error, kind = error.kind(), operation, "Read-state update failed");
            }
            return result;
        };

        let mut store = self.store.write().await;
        match &result {
            Ok(()) => store.commit(&change),
            Err(error) => {
                let ids = store.revert(&change);
                let unread = store.unread_count();
                drop(store);

                crate::metrics::OPTIMISTIC_REVERTS_TOTAL
                    .with_label_values(&[operation])
                    .inc();
                tracing::warn!(
                    %error,
                    kind = error.kind(),
                    retryable = error.is_retryable(),
                    operation,
                    reverted = ids.len(),
                    "Read-state update failed; reverted"
                );

                self.emit(NotificationEvent::ReadStateReverted { ids });
                self.announce_unread(unread);
            }
        }

        result
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.get_mut().take() {
            handle.abort();
        }
    }
}

/// Connection loop for one `connect()` call
///
/// Holds only a weak reference between events so a dropped client stops it.
async fn supervise(inner: Weak<Inner>, generation: u64) {
    use crate::metrics::{PUSH_CONNECTIONS_TOTAL, PUSH_RECONNECTS_SCHEDULED};

    let mut failures: u32 = 0;

    loop {
        let Some(client) = inner.upgrade() else { return };
        if !client.publish_state(generation, ConnectionState::Connecting) {
            return;
        }

        let (url, token) = match client.push_target() {
            Ok(target) => target,
            Err(error) => {
                tracing::warn!(%error, kind = error.kind(), "Push channel stopped");
                client.publish_state(generation, ConnectionState::Disconnected);
                return;
            }
        };
        let connector = client.connector.clone();
        drop(client);

        match connector.connect(&url, &token).await {
            Ok(mut stream) => {
                failures = 0;
                PUSH_CONNECTIONS_TOTAL.with_label_values(&["connected"]).inc();

                {
                    let Some(client) = inner.upgrade() else { return };
                    if !client.publish_state(generation, ConnectionState::Connected) {
                        return;
                    }
                }
                tracing::info!("Push channel connected");

                while let Some(frame) = stream.next().await {
                    let Some(client) = inner.upgrade() else { return };
                    match frame {
                        Ok(payload) => client.handle_push(&payload).await,
                        Err(error) => {
                            // Closure, not errors, drives reconnection.
                            tracing::warn!(%error, kind = error.kind(), "Push channel error");
                        }
                    }
                }

                tracing::info!("Push channel closed");
            }
            Err(error) => {
                failures = failures.saturating_add(1);
                PUSH_CONNECTIONS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::warn!(%error, kind = error.kind(), failures, "Push connection attempt failed");

                if error.is_auth_failure() {
                    if let Some(client) = inner.upgrade() {
                        client.emit(NotificationEvent::AuthenticationRequired);
                    }
                }
            }
        }

        let Some(client) = inner.upgrade() else { return };
        let Some(delay) = client.policy.next_delay(failures) else {
            tracing::error!(failures, "Push channel giving up after repeated failures");
            client.publish_state(generation, ConnectionState::Disconnected);
            return;
        };

        if !client.publish_state(generation, ConnectionState::Closed) {
            return;
        }
        drop(client);

        PUSH_RECONNECTS_SCHEDULED.inc();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Push reconnect scheduled");
        tokio::time::sleep(delay).await;
    }
}
