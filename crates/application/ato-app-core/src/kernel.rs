use std::sync::Arc;
use std::time::Duration;

use ato_infra::{ConnectionState, Connector, Transport, TransportConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app_core::AppStore;
use crate::dashboard::ReviewDashboard;
use crate::dispatcher::EventDispatcher;
use crate::domain::{AppState, ClientSettings};
use crate::rpc::RpcBackend;
use crate::wizard::ManufacturingWizard;

/// Wires transport, dispatcher, store and the UI flows for one backend connection.
pub struct ClientKernel {
    pub store: AppStore,
    transport: Transport,
    backend: Arc<RpcBackend>,
    dispatcher: EventDispatcher<RpcBackend>,
    wizard: ManufacturingWizard<RpcBackend, RpcBackend>,
    dashboard: ReviewDashboard,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientKernel {
    /// Starts the connection and event loops. Must be called inside a tokio runtime.
    pub fn start<C>(settings: &ClientSettings, connector: Arc<C>) -> Self
    where
        C: Connector,
    {
        let config = TransportConfig {
            request_timeout: Duration::from_millis(ato_config::clamp_request_timeout(
                settings.request_timeout_ms,
            )),
            ..TransportConfig::default()
        };
        let (transport, notifications) = Transport::new(config);

        let mut initial = AppState::default();
        initial.selection.developer_mode = settings.developer_mode;
        let store = AppStore::new(initial);

        let backend = Arc::new(RpcBackend::new(transport.clone()));
        let dispatcher = EventDispatcher::new(store.clone(), backend.clone());
        let wizard = ManufacturingWizard::with_export_directory(
            store.clone(),
            backend.clone(),
            backend.clone(),
            settings.export_directory.clone(),
        );
        let dashboard = ReviewDashboard::new(store.clone());
        let shutdown = CancellationToken::new();

        let mut tasks = Vec::new();
        {
            let transport = transport.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                transport.run(connector, shutdown).await
            }));
        }
        tasks.push(tokio::spawn(
            dispatcher.clone().run(notifications, shutdown.clone()),
        ));
        tasks.push(tokio::spawn(resync_on_reconnect(
            transport.clone(),
            dispatcher.clone(),
            shutdown.clone(),
        )));

        Self {
            store,
            transport,
            backend,
            dispatcher,
            wizard,
            dashboard,
            shutdown,
            tasks,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn backend(&self) -> &RpcBackend {
        &self.backend
    }

    pub fn dispatcher(&self) -> &EventDispatcher<RpcBackend> {
        &self.dispatcher
    }

    pub fn wizard(&self) -> &ManufacturingWizard<RpcBackend, RpcBackend> {
        &self.wizard
    }

    pub fn dashboard(&self) -> &ReviewDashboard {
        &self.dashboard
    }

    /// Fetches every global slice once.
    pub async fn initial_load(&self) {
        self.dispatcher.refresh_all().await;
    }

    pub async fn shutdown(self) {
        info!("shutting down client");
        self.wizard.close();
        self.shutdown.cancel();
        self.transport.close();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Events sent while the link was down are gone; refetch everything once it is back.
async fn resync_on_reconnect(
    transport: Transport,
    dispatcher: EventDispatcher<RpcBackend>,
    shutdown: CancellationToken,
) {
    let mut state = transport.watch_state();
    let mut was_lost = false;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let current = *state.borrow_and_update();
        match current {
            ConnectionState::Lost => was_lost = true,
            ConnectionState::Open if was_lost => {
                was_lost = false;
                debug!("reconnected, refreshing all slices");
                dispatcher.refresh_all().await;
            }
            ConnectionState::Closed => return,
            _ => {}
        }
    }
}
