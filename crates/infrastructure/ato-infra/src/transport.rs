use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ato_core::{CorrelationId, Event, InboundFrame, OutboundFrame, RequestEnvelope};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connector::{Connection, Connector};
use crate::correlator::Correlator;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not opened yet; requests and actions queue.
    Connecting,
    Open,
    /// Dropped after having been open; actions queue, requests fail fast.
    Lost,
    Closed,
}

/// Inbound traffic routed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Event(Event),
    Hydrate(Value),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub request_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub broadcast_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(ato_config::DEFAULT_REQUEST_TIMEOUT_MS),
            reconnect_base_delay: Duration::from_millis(ato_config::RECONNECT_BASE_DELAY_MS),
            reconnect_max_delay: Duration::from_millis(ato_config::RECONNECT_MAX_DELAY_MS),
            broadcast_capacity: ato_config::BROADCAST_CAPACITY,
        }
    }
}

struct Queued {
    request_id: Option<CorrelationId>,
    line: String,
}

struct Link {
    state: ConnectionState,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    queue: VecDeque<Queued>,
}

struct Inner {
    config: TransportConfig,
    correlator: Correlator,
    link: Mutex<Link>,
    inbound: broadcast::Sender<InboundFrame>,
    notifications: mpsc::UnboundedSender<Notification>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Client end of the message pipe to the host process.
///
/// Cheap to clone; all clones share one link, queue and correlator.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (notifications, rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let inner = Inner {
            config,
            correlator: Correlator::new(),
            link: Mutex::new(Link {
                state: ConnectionState::Connecting,
                outgoing: None,
                queue: VecDeque::new(),
            }),
            inbound,
            notifications,
            state_tx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.lock().unwrap().state
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Every decoded inbound frame, for passive listeners.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundFrame> {
        self.inner.inbound.subscribe()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub fn queued_frames(&self) -> usize {
        self.inner.link.lock().unwrap().queue.len()
    }

    /// Fire-and-forget. Queued in order while the link is down; dropped once closed.
    pub fn send(&self, frame: OutboundFrame) {
        let line = match frame.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!("dropping unencodable frame: {e}");
                return;
            }
        };
        let request_id = frame.request_id().map(str::to_owned);

        let mut link = self.inner.link.lock().unwrap();
        let state = link.state;
        match state {
            ConnectionState::Closed => warn!("transport closed, dropping outbound frame"),
            ConnectionState::Open => link.transmit(Queued { request_id, line }),
            ConnectionState::Connecting | ConnectionState::Lost => {
                link.queue.push_back(Queued { request_id, line })
            }
        }
    }

    pub fn send_action(&self, action: impl Into<String>, payload: Map<String, Value>) {
        self.send(OutboundFrame::action(action, payload));
    }

    /// Sends a request and waits for the correlated response.
    pub async fn send_with_response(
        &self,
        action: &str,
        params: Map<String, Value>,
    ) -> Result<Value, TransportError> {
        let id: CorrelationId = uuid::Uuid::new_v4().to_string();
        let frame = OutboundFrame::Request(RequestEnvelope {
            id: id.clone(),
            action: action.to_string(),
            params,
        });
        let line = frame
            .encode()
            .map_err(|e| TransportError::Codec(e.to_string()))?;

        let pending = self.inner.correlator.register(id.clone())?;
        {
            let mut link = self.inner.link.lock().unwrap();
            let state = link.state;
            let refused = match state {
                ConnectionState::Closed => Some(TransportError::Closed),
                ConnectionState::Lost => Some(TransportError::ConnectionLost),
                ConnectionState::Open => {
                    link.transmit(Queued {
                        request_id: Some(id.clone()),
                        line,
                    });
                    None
                }
                ConnectionState::Connecting => {
                    link.queue.push_back(Queued {
                        request_id: Some(id.clone()),
                        line,
                    });
                    None
                }
            };
            if let Some(err) = refused {
                drop(link);
                self.inner.correlator.forget(&id);
                return Err(err);
            }
        }

        let timeout = self.inner.config.request_timeout;
        match tokio::time::timeout(timeout, pending.wait()).await {
            Ok(reply) => reply,
            Err(_) => {
                self.inner.correlator.forget(&id);
                self.inner.link.lock().unwrap().purge_request(&id);
                Err(TransportError::Timeout {
                    action: action.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Connects, pumps inbound frames and reconnects with backoff until `shutdown` fires.
    pub async fn run<C>(&self, connector: Arc<C>, shutdown: CancellationToken)
    where
        C: Connector + ?Sized,
    {
        let base = self.inner.config.reconnect_base_delay;
        let max = self.inner.config.reconnect_max_delay;
        let mut delay = base;

        loop {
            let attempt = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = connector.connect() => res,
            };

            match attempt {
                Ok(conn) => {
                    info!("connected to {}", connector.describe());
                    delay = base;
                    let incoming = self.open(conn);
                    self.pump(incoming, &shutdown).await;
                    if shutdown.is_cancelled() {
                        break;
                    }
                    self.connection_lost();
                }
                Err(e) => warn!("connect to {} failed: {}", connector.describe(), e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(max);
        }

        self.close();
    }

    /// Moves the transport to `Closed` and fails everything still waiting.
    pub fn close(&self) {
        {
            let mut link = self.inner.link.lock().unwrap();
            if link.state == ConnectionState::Closed {
                return;
            }
            link.state = ConnectionState::Closed;
            link.outgoing = None;
            link.queue.clear();
        }
        self.inner.state_tx.send_replace(ConnectionState::Closed);
        self.inner.correlator.reject_all(TransportError::Closed);
    }

    fn open(&self, conn: Connection) -> mpsc::UnboundedReceiver<String> {
        let Connection { outgoing, incoming } = conn;
        {
            let mut link = self.inner.link.lock().unwrap();
            link.state = ConnectionState::Open;
            link.outgoing = Some(outgoing);
            let queued = std::mem::take(&mut link.queue);
            if !queued.is_empty() {
                debug!("flushing {} queued frames", queued.len());
            }
            for item in queued {
                link.transmit(item);
            }
        }
        self.inner.state_tx.send_replace(ConnectionState::Open);
        incoming
    }

    async fn pump(&self, mut incoming: mpsc::UnboundedReceiver<String>, shutdown: &CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                next = incoming.recv() => match next {
                    Some(raw) => self.handle_inbound(&raw),
                    None => return,
                },
            }
        }
    }

    fn connection_lost(&self) {
        {
            let mut link = self.inner.link.lock().unwrap();
            link.state = ConnectionState::Lost;
            link.outgoing = None;
            link.queue.retain(|q| q.request_id.is_none());
        }
        self.inner.state_tx.send_replace(ConnectionState::Lost);
        let rejected = self
            .inner
            .correlator
            .reject_all(TransportError::ConnectionLost);
        warn!("connection lost, rejected {} pending requests", rejected);
    }

    /// Routes one raw inbound frame. Exposed so embedders can feed frames they received themselves.
    pub fn handle_inbound(&self, raw: &str) {
        let frame = match InboundFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping undecodable frame: {e}");
                return;
            }
        };

        let _ = self.inner.inbound.send(frame.clone());

        match frame {
            InboundFrame::Response(resp) => {
                let known = match resp.error {
                    Some(err) => self
                        .inner
                        .correlator
                        .reject(&resp.id, TransportError::Backend(err)),
                    None => self
                        .inner
                        .correlator
                        .resolve(&resp.id, resp.result.unwrap_or(Value::Null)),
                };
                if !known {
                    debug!("ignoring response for unknown or expired id {}", resp.id);
                }
            }
            InboundFrame::Event(ev) => {
                let _ = self.inner.notifications.send(Notification::Event(ev));
            }
            InboundFrame::State(snapshot) => {
                let _ = self.inner.notifications.send(Notification::Hydrate(snapshot));
            }
        }
    }
}

impl Link {
    /// Sends while open; a dead pipe pushes the frame back so it survives the reconnect.
    fn transmit(&mut self, item: Queued) {
        let Some(tx) = &self.outgoing else {
            self.queue.push_back(item);
            return;
        };
        if let Err(mpsc::error::SendError(line)) = tx.send(item.line) {
            self.queue.push_back(Queued {
                request_id: item.request_id,
                line,
            });
        }
    }

    fn purge_request(&mut self, id: &str) {
        self.queue.retain(|q| q.request_id.as_deref() != Some(id));
    }
}
