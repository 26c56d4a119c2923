pub mod commands;
pub mod settings;

use std::sync::Arc;

use ato_app_core::{ClientKernel, ClientSettings};
use ato_infra::connector::TcpLineConnector;

/// Starts a kernel talking to the backend at `settings.backend_addr`.
pub fn connect(settings: &ClientSettings) -> ClientKernel {
    let connector = TcpLineConnector::new(settings.backend_addr.clone());
    ClientKernel::start(settings, Arc::new(connector))
}
