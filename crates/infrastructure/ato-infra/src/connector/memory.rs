use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{Connection, Connector};
use crate::error::TransportError;

/// In-process connector; every `connect` hands a fresh peer to the paired [`MemoryListener`].
///
/// Used when host and client share a process, and by tests acting as the backend.
#[derive(Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
}

pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Host side of one in-memory connection. Dropping it looks like a lost connection to the client.
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryConnector {
    pub fn pair() -> (MemoryConnector, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (MemoryConnector { accept_tx }, MemoryListener { accept_rx })
    }
}

impl MemoryListener {
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }
}

impl MemoryPeer {
    /// Next frame the client sent, parsed as JSON. `None` once the client side hung up.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let raw = self.from_client.recv().await?;
            if let Ok(v) = serde_json::from_str(&raw) {
                return Some(v);
            }
        }
    }

    pub fn send_raw(&self, raw: impl Into<String>) -> bool {
        self.to_client.send(raw.into()).is_ok()
    }

    pub fn send(&self, value: &Value) -> bool {
        self.send_raw(value.to_string())
    }

    pub fn respond(&self, id: &str, result: Value) -> bool {
        self.send(&json!({"id": id, "result": result, "error": null}))
    }

    pub fn respond_error(&self, id: &str, error: &str) -> bool {
        self.send(&json!({"id": id, "result": null, "error": error}))
    }

    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.send(&json!({"event": event, "data": data}))
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        self.accept_tx
            .send(MemoryPeer {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::Connect("memory listener dropped".into()))?;
        Ok(Connection { outgoing, incoming })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
