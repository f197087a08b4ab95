//! WebSocket endpoint agents register through.
//!
//! Every session gets a writer task fed by an unbounded channel, so the
//! eviction sweep can push removal notices without touching the socket.
//! Frames from the agent are handled in order on the session's reader.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use rsm_protocol::{parse_command, Command, Reply, ERR_INVALID_ADD, ERR_NO_CMD, ERR_UNKNOWN_CMD};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::{ClientId, ConnectionRegistry, Reconciler, SessionMessage};

#[derive(Clone)]
pub struct ServerState {
    pub reconciler: Arc<Reconciler>,
    pub clients: ConnectionRegistry,
}

/// Router accepting WebSocket upgrades on any path.
pub fn router(state: ServerState) -> Router {
    Router::new().fallback(ws_upgrade).with_state(state)
}

/// Serve agent sessions on an already bound listener until `shutdown`
/// resolves.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session_loop(socket, peer, state))
}

enum Flow {
    Continue,
    Close,
}

async fn session_loop(socket: WebSocket, peer: SocketAddr, state: ServerState) {
    let id = ClientId::new();
    tracing::debug!(peer = %peer, client = %id, "New ws connection");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SessionMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                SessionMessage::Frame(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                SessionMessage::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::error!(peer = %peer, "Received non-utf8 frame");
                    let _ = tx.send(SessionMessage::Close);
                    break;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(peer = %peer, error = %e, "Error from ws");
                break;
            }
        };
        tracing::debug!(peer = %peer, message = %text, "New ws message");
        if let Flow::Close = handle_frame(&text, peer, id, &tx, &state).await {
            let _ = tx.send(SessionMessage::Close);
            break;
        }
    }

    tracing::debug!(peer = %peer, client = %id, "Close from ws");
    state.clients.remove(id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_frame(
    text: &str,
    peer: SocketAddr,
    id: ClientId,
    tx: &mpsc::UnboundedSender<SessionMessage>,
    state: &ServerState,
) -> Flow {
    let reply = |r: Reply| {
        let _ = tx.send(SessionMessage::Frame(r.to_text()));
    };

    let registration = match parse_command(text) {
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "Received invalid json");
            return Flow::Close;
        }
        Ok(Command::Missing) => {
            tracing::error!(peer = %peer, "Received message without cmd");
            reply(Reply::failed(ERR_NO_CMD));
            return Flow::Continue;
        }
        Ok(Command::Unknown(cmd)) => {
            tracing::error!(peer = %peer, command = %cmd, "Unknown command received");
            reply(Reply::failed(ERR_UNKNOWN_CMD));
            return Flow::Continue;
        }
        Ok(Command::Invalid(e)) => {
            tracing::error!(peer = %peer, error = %e, "Invalid add command");
            reply(Reply::failed(ERR_INVALID_ADD));
            return Flow::Continue;
        }
        Ok(Command::Add(registration)) => registration,
    };

    let host = registration.host.clone().unwrap_or_else(|| {
        let ip = peer.ip().to_canonical();
        tracing::debug!(ip = %ip, "Assuming host from sender");
        ip.to_string()
    });

    match state
        .reconciler
        .reconcile(&host, registration.hidden, registration.priority, registration.votes)
        .await
    {
        Ok(done) => {
            tracing::info!(host = %done.host, peer = %peer, changed = done.changed(), "Added replica member");
            // Only sessions that can still hear the answer are tracked.
            if tx.send(SessionMessage::Frame(Reply::added(&done.host).to_text())).is_ok() {
                state.clients.add(id, tx.clone()).await;
            }
        }
        Err(e) => {
            tracing::error!(peer = %peer, host = %host, error = %e, "Failed to add replica member");
            reply(Reply::failed(e.reply_reason()));
        }
    }
    Flow::Continue
}
