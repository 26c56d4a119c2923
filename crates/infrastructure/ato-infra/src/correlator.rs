use std::collections::HashMap;
use std::sync::Mutex;

use ato_core::CorrelationId;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::TransportError;

type Reply = Result<Value, TransportError>;

/// Matches asynchronous replies to outstanding requests.
///
/// The pending map is owned here; nothing else writes to it.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<Reply>>>,
}

/// Receiving half handed back from [`Correlator::register`].
pub struct PendingResponse {
    rx: oneshot::Receiver<Reply>,
}

impl PendingResponse {
    pub async fn wait(self) -> Reply {
        match self.rx.await {
            Ok(reply) => reply,
            // Sender dropped without a reply: the entry was forgotten or the correlator went away.
            Err(_) => Err(TransportError::ConnectionLost),
        }
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: CorrelationId) -> Result<PendingResponse, TransportError> {
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(&id) {
            return Err(TransportError::DuplicateCorrelationId(id));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(PendingResponse { rx })
    }

    /// Returns `false` when no entry was waiting (duplicate or late reply).
    pub fn resolve(&self, id: &str, result: Value) -> bool {
        self.complete(id, Ok(result))
    }

    /// Returns `false` when no entry was waiting.
    pub fn reject(&self, id: &str, error: TransportError) -> bool {
        self.complete(id, Err(error))
    }

    /// Rejects every pending entry with `error`; returns how many were waiting.
    pub fn reject_all(&self, error: TransportError) -> usize {
        let drained: Vec<_> = self.pending.lock().unwrap().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    /// Drops an entry without replying, e.g. after a local timeout fired.
    pub fn forget(&self, id: &str) {
        self.pending.lock().unwrap().remove(id);
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().unwrap().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn complete(&self, id: &str, reply: Reply) -> bool {
        let tx = self.pending.lock().unwrap().remove(id);
        match tx {
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }
}
