use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use super::{Connection, Connector};
use crate::error::TransportError;

/// Newline-delimited JSON over TCP, the bridge the host process exposes.
#[derive(Debug, Clone)]
pub struct TcpLineConnector {
    addr: String,
}

impl TcpLineConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpLineConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {e}", self.addr)))?;
        let _ = stream.set_nodelay(true);

        let (mut sink, mut lines) = Framed::new(stream, LinesCodec::new()).split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        let addr = self.addr.clone();
        tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if let Err(e) = sink.send(line).await {
                    warn!("write to {} failed: {}", addr, e);
                    break;
                }
            }
        });

        let addr = self.addr.clone();
        tokio::spawn(async move {
            while let Some(next) = lines.next().await {
                match next {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => {
                        if in_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("read from {} failed: {}", addr, e);
                        break;
                    }
                }
            }
            debug!("reader for {} finished", addr);
        });

        Ok(Connection {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}
