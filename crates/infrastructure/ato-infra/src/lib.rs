pub mod connector;
pub mod correlator;
pub mod error;
pub mod transport;

pub use connector::{Connection, Connector};
pub use correlator::{Correlator, PendingResponse};
pub use error::TransportError;
pub use transport::{ConnectionState, Notification, Transport, TransportConfig};
