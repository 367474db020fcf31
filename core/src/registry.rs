use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use runcell_protocol::ClientOp;
use runcell_protocol::ConnectionId;
use runcell_protocol::SessionEventMsg;

use crate::config::ExecConfig;
use crate::session::SessionHandle;

/// Concurrency-safe map from connection id to its session.
///
/// This is the only structure touched by more than one task: the transport's
/// dispatch and the disconnect handler. Everything inside a session mutates
/// from that session's own task.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    config: ExecConfig,
    sessions: Mutex<HashMap<ConnectionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.inner.config
    }

    /// Registers a new connection and spawns its session task. Outbound
    /// events for that connection arrive on `events_tx`.
    pub async fn connect(&self, events_tx: mpsc::Sender<SessionEventMsg>) -> ConnectionId {
        let id = ConnectionId::new();
        let handle = SessionHandle::spawn(id, self.inner.config.clone(), events_tx);
        self.inner.sessions.lock().await.insert(id, handle);
        tracing::debug!(%id, "session registered");
        id
    }

    /// Routes one inbound operation; `false` when the connection is unknown
    /// or its session task has already gone away.
    pub async fn dispatch(&self, id: ConnectionId, op: ClientOp) -> bool {
        let ops_tx = {
            let sessions = self.inner.sessions.lock().await;
            match sessions.get(&id) {
                Some(handle) => handle.ops_tx.clone(),
                None => return false,
            }
        };
        ops_tx.send(op).await.is_ok()
    }

    /// Removes the connection's session. Dropping the handle closes the op
    /// channel, which drives the task through process termination and
    /// artifact removal even when a run is still active.
    pub async fn disconnect(&self, id: ConnectionId) {
        let removed = self.inner.sessions.lock().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(%id, "session removed");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }
}
