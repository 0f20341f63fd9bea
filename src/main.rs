//! nexus-notify binary entry point
//!
//! Terminal notification feed: prints the current list, then every live
//! event until Ctrl-C.

use futures::StreamExt;
use nexus_notify::config::{self, LoggingConfig};
use nexus_notify::display;
use nexus_notify::push::WebSocketConnector;
use nexus_notify::service::LogAlerts;
use nexus_notify::{CredentialStore, NotificationClient, NotificationEvent};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize metrics
/// 4. Build the notification client
/// 5. Load state and open the push channel
/// 6. Print events until Ctrl-C
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    tracing::info!(api_url = %config.backend.api_url, "Starting nexus-notify...");

    // 3. Initialize metrics
    nexus_notify::metrics::init_metrics();

    // 4. Build the client
    let credentials = match config.auth.resolve_token()? {
        Some(token) => CredentialStore::with_token(token),
        None => {
            tracing::warn!("No credential configured; requests will be rejected locally");
            CredentialStore::new()
        }
    };

    let client = NotificationClient::from_config(&config, credentials)?
        .connector(Arc::new(WebSocketConnector::new()))
        .alerts(Arc::new(LogAlerts))
        .build();

    // 5. Load state and open the push channel
    let mut events = Box::pin(client.events());
    client.initialize().await;

    let now = chrono::Utc::now();
    let unread = client.unread_count().await;
    println!(
        "Notifications (unread: {})",
        display::badge_label(unread).unwrap_or_else(|| "0".to_string())
    );
    for notification in client.notifications().await {
        println!("{}", display::summary_line(&notification, now));
    }

    // 6. Print events until Ctrl-C
    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                print_event(&event);
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    tracing::error!(%error, "Failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    client.disconnect().await;
    match nexus_notify::metrics::render() {
        Ok(metrics) => tracing::debug!(%metrics, "Final metrics"),
        Err(error) => tracing::debug!(%error, "Metrics unavailable"),
    }
    tracing::info!("Stopped");

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("nexus_notify={}", logging.level).into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

fn print_event(event: &NotificationEvent) {
    match event {
        NotificationEvent::Received(notification) => {
            println!("{}", display::summary_line(notification, chrono::Utc::now()));
        }
        NotificationEvent::UnreadCountChanged(count) => {
            if let Some(label) = display::badge_label(*count) {
                println!("  unread: {}", label);
            }
        }
        NotificationEvent::ConnectionStateChanged(state) => {
            tracing::info!(?state, "Push channel state changed");
        }
        NotificationEvent::ReadStateReverted { ids } => {
            println!("  could not mark {} notification(s) read", ids.len());
        }
        NotificationEvent::AuthenticationRequired => {
            println!("  session expired; sign in again");
        }
    }
}
