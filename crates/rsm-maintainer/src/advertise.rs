//! Advertise the maintainer to a service-discovery registry.
//!
//! The registry learns about a service from an open WebSocket on its
//! `/provide` endpoint. The connection is held for as long as the
//! maintainer runs and re-opened when it drops.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Provider URL for `service` on `port` at `endpoint`.
///
/// `ws://` is assumed when no scheme is given and `/provide` is appended
/// when missing.
pub fn provider_url(endpoint: &str, service: &str, port: u16) -> String {
    let mut url = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    if !url.contains("/provide") {
        url = format!("{}/provide", url.trim_end_matches('/'));
    }
    format!("{url}?service={service}&port={port}")
}

/// Start advertising in the background. Fire and forget: failures are
/// logged and retried, never reported to the caller.
pub fn advertise(endpoint: &str, service: &str, port: u16) -> JoinHandle<()> {
    let url = provider_url(endpoint, service, port);
    tracing::info!(url = %url, port, "Advertising to service registry");
    tokio::spawn(provide_loop(url))
}

async fn provide_loop(url: String) {
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((mut ws, _)) => {
                tracing::debug!(url = %url, "Connected to service registry");
                while let Some(msg) = ws.next().await {
                    if let Err(e) = msg {
                        tracing::warn!(url = %url, error = %e, "Service registry connection error");
                        break;
                    }
                }
                tracing::warn!(url = %url, "Lost connection to service registry");
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Failed to connect to service registry");
            }
        }
        tokio::time::sleep(RETRY_DELAY).await;
    }
}
