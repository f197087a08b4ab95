//! Sessions of agents whose registration was accepted.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

/// Identifies one agent session for the lifetime of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a session's writer task should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    Frame(String),
    Close,
}

struct Client {
    id: ClientId,
    tx: mpsc::UnboundedSender<SessionMessage>,
}

/// Ordered set of open, registered sessions.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    clients: Arc<RwLock<Vec<Client>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session. Returns false if it was already tracked.
    pub async fn add(&self, id: ClientId, tx: mpsc::UnboundedSender<SessionMessage>) -> bool {
        let mut clients = self.clients.write().await;
        if clients.iter().any(|c| c.id == id) {
            return false;
        }
        clients.push(Client { id, tx });
        true
    }

    pub async fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|c| c.id != id);
        clients.len() != before
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.iter().any(|c| c.id == id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Send `frame` to every session. A session that cannot be reached is
    /// dropped; the others still receive the frame. Returns the number of
    /// sessions reached.
    pub async fn broadcast(&self, frame: &str) -> usize {
        let mut clients = self.clients.write().await;
        clients.retain(|c| match c.tx.send(SessionMessage::Frame(frame.to_string())) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(client = %c.id, "Error broadcasting to session, dropping it");
                false
            }
        });
        clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_idempotent_per_session() {
        let reg = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = ClientId::new();
        assert!(reg.add(id, tx.clone()).await);
        assert!(!reg.add(id, tx).await);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_drops_dead_sessions_and_continues() {
        let reg = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        let dead = ClientId::new();
        reg.add(ClientId::new(), tx1).await;
        reg.add(dead, tx2).await;
        reg.add(ClientId::new(), tx3).await;
        drop(rx2);

        assert_eq!(reg.broadcast("hello").await, 2);
        assert!(!reg.contains(dead).await);
        assert_eq!(rx1.recv().await, Some(SessionMessage::Frame("hello".into())));
        assert_eq!(rx3.recv().await, Some(SessionMessage::Frame("hello".into())));
    }

    #[tokio::test]
    async fn test_remove() {
        let reg = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = ClientId::new();
        reg.add(id, tx).await;
        assert!(reg.remove(id).await);
        assert!(!reg.remove(id).await);
        assert!(reg.is_empty().await);
    }
}
