mod memory;
mod tcp;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use tcp::TcpLineConnector;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// One established message pipe. Each item is one complete JSON frame.
///
/// The pipe is considered lost once `incoming` yields `None`.
pub struct Connection {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Connection, TransportError>;

    /// Human-readable endpoint for logs.
    fn describe(&self) -> String;
}
