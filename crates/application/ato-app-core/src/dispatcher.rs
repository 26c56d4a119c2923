use std::future::Future;
use std::sync::Arc;

use ato_core::{AtopileConfigPatch, Event, EventType};
use ato_infra::Notification;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app_core::AppStore;
use crate::domain::{AppState, OpenKind, OpenRequest, SliceKind};
use crate::ports::QueryPort;

/// Maps backend events onto store mutations.
///
/// Each known event is either a refetch, a payload patch, or an inline-error
/// short-circuit. Unknown events never touch the store.
pub struct EventDispatcher<Q> {
    store: AppStore,
    queries: Arc<Q>,
    observers: broadcast::Sender<Event>,
}

impl<Q> Clone for EventDispatcher<Q> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            queries: self.queries.clone(),
            observers: self.observers.clone(),
        }
    }
}

impl<Q: QueryPort> EventDispatcher<Q> {
    pub fn new(store: AppStore, queries: Arc<Q>) -> Self {
        let (observers, _) = broadcast::channel(ato_config::BROADCAST_CAPACITY);
        Self {
            store,
            queries,
            observers,
        }
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    /// Every handled event, name and data as received.
    pub fn observe(&self) -> broadcast::Receiver<Event> {
        self.observers.subscribe()
    }

    pub async fn handle(&self, event: Event) {
        if !event.event.is_known() {
            debug!("ignoring unknown event {}", event.event);
            return;
        }
        let _ = self.observers.send(event.clone());

        match &event.event {
            EventType::ProjectsChanged => self.refresh_projects().await,
            EventType::BuildsChanged => {
                if !self.short_circuit(&event, SliceKind::Builds) {
                    self.refresh_builds().await;
                }
            }
            EventType::PackagesChanged => {
                if !self.short_circuit(&event, SliceKind::Packages) {
                    self.refresh_packages().await;
                }
            }
            EventType::StdlibChanged => self.refresh_stdlib().await,
            EventType::ProblemsChanged => self.refresh_problems().await,
            EventType::BomChanged => {
                let Some(key) = self.store.read(AppState::selected_target) else {
                    return;
                };
                if !self.short_circuit(&event, SliceKind::Bom(key.clone())) {
                    let queries = self.queries.clone();
                    let k = key.clone();
                    self.refetch(
                        SliceKind::Bom(key.clone()),
                        async move { queries.bom(&k).await },
                        |store, bom| store.set_bom(key, bom),
                    )
                    .await;
                }
            }
            EventType::VariablesChanged => {
                let Some(key) = self.store.read(AppState::selected_target) else {
                    return;
                };
                if !self.short_circuit(&event, SliceKind::Variables(key.clone())) {
                    let queries = self.queries.clone();
                    let k = key.clone();
                    self.refetch(
                        SliceKind::Variables(key.clone()),
                        async move { queries.variables(&k).await },
                        |store, vars| store.set_variables(key, vars),
                    )
                    .await;
                }
            }
            EventType::ProjectFilesChanged => {
                if let Some(root) = self.project_root_for(&event) {
                    let queries = self.queries.clone();
                    let r = root.clone();
                    self.refetch(
                        SliceKind::ProjectFiles(root.clone()),
                        async move { queries.files(&r).await },
                        |store, files| store.set_project_files(root, files),
                    )
                    .await;
                }
            }
            EventType::ProjectModulesChanged => {
                if let Some(root) = self.project_root_for(&event) {
                    let queries = self.queries.clone();
                    let r = root.clone();
                    self.refetch(
                        SliceKind::ProjectModules(root.clone()),
                        async move { queries.modules(&r).await },
                        |store, modules| store.set_project_modules(root, modules),
                    )
                    .await;
                }
            }
            EventType::ProjectDependenciesChanged => {
                if let Some(root) = self.project_root_for(&event) {
                    let queries = self.queries.clone();
                    let r = root.clone();
                    self.refetch(
                        SliceKind::ProjectDependencies(root.clone()),
                        async move { queries.dependencies(&r).await },
                        |store, deps| store.set_project_dependencies(root, deps),
                    )
                    .await;
                }
            }
            EventType::AtopileConfigChanged => {
                let Some(data) = &event.data else {
                    return;
                };
                match AtopileConfigPatch::from_map(data) {
                    Ok(patch) if patch.is_empty() => {}
                    Ok(patch) => self.store.patch_atopile_config(patch),
                    Err(e) => warn!("malformed atopile_config_changed payload: {}", e),
                }
            }
            EventType::LogViewCurrentIdChanged => match event.field("buildId") {
                None => {}
                Some(Value::String(id)) => self.store.set_log_view_current_id(Some(id.clone())),
                Some(_) => self.store.set_log_view_current_id(None),
            },
            EventType::OpenLayout => self.request_open(OpenKind::Layout, &event),
            EventType::OpenKicad => self.request_open(OpenKind::Kicad, &event),
            EventType::Open3d => self.request_open(OpenKind::ThreeD, &event),
            EventType::Unknown(_) => {}
        }
    }

    /// Handles notifications until the channel closes or `shutdown` fires.
    ///
    /// Every event runs as its own task so a slow refetch never blocks another slice.
    pub async fn run(
        self,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
        shutdown: CancellationToken,
    ) {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = notifications.recv() => next,
            };
            match next {
                Some(Notification::Event(event)) => {
                    let this = self.clone();
                    tokio::spawn(async move { this.handle(event).await });
                }
                Some(Notification::Hydrate(snapshot)) => self.hydrate(snapshot),
                None => break,
            }
        }
    }

    pub fn hydrate(&self, snapshot: Value) {
        match AppState::from_snapshot(snapshot) {
            Ok(state) => self.store.hydrate(state),
            Err(e) => warn!("ignoring malformed state snapshot: {}", e),
        }
    }

    /// Refreshes every global slice concurrently. Used on startup and after reconnects.
    pub async fn refresh_all(&self) {
        tokio::join!(
            self.refresh_projects(),
            self.refresh_builds(),
            self.refresh_packages(),
            self.refresh_stdlib(),
            self.refresh_problems(),
        );
    }

    pub async fn refresh_projects(&self) {
        let queries = self.queries.clone();
        self.refetch(
            SliceKind::Projects,
            async move { queries.projects().await },
            |store, list| store.set_projects(list),
        )
        .await;
    }

    pub async fn refresh_builds(&self) {
        let queries = self.queries.clone();
        self.refetch(
            SliceKind::Builds,
            async move { tokio::try_join!(queries.builds_history(), queries.builds_active()) },
            |store, (history, queued)| store.set_builds(history, queued),
        )
        .await;
    }

    pub async fn refresh_packages(&self) {
        let queries = self.queries.clone();
        self.refetch(
            SliceKind::Packages,
            async move { queries.packages().await },
            |store, list| store.set_packages(list),
        )
        .await;
    }

    pub async fn refresh_stdlib(&self) {
        let queries = self.queries.clone();
        self.refetch(
            SliceKind::Stdlib,
            async move { queries.stdlib().await },
            |store, list| store.set_stdlib(list),
        )
        .await;
    }

    pub async fn refresh_problems(&self) {
        let developer_mode = self.store.read(|s| s.selection.developer_mode);
        let queries = self.queries.clone();
        self.refetch(
            SliceKind::Problems,
            async move { queries.problems(developer_mode).await },
            |store, list| store.set_problems(list),
        )
        .await;
    }

    /// Loading on, await, then either the data setter or the error setter. Both clear loading.
    async fn refetch<T, F>(&self, kind: SliceKind, fetch: F, write: impl FnOnce(&AppStore, T))
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.store.set_loading(kind.clone(), true);
        match fetch.await {
            Ok(data) => write(&self.store, data),
            Err(e) => {
                warn!("refresh of {:?} failed: {:#}", kind, e);
                self.store.set_error(kind, Some(e.to_string()));
            }
        }
    }

    /// Writes an inline payload error into the slice. Returns whether the refetch is skipped.
    fn short_circuit(&self, event: &Event, kind: SliceKind) -> bool {
        match event.inline_error() {
            Some(error) => {
                self.store.set_error(kind, Some(error.to_string()));
                true
            }
            None => false,
        }
    }

    fn project_root_for(&self, event: &Event) -> Option<String> {
        event
            .str_field("projectRoot")
            .map(str::to_owned)
            .or_else(|| self.store.read(|s| s.selection.project_root.clone()))
    }

    fn request_open(&self, kind: OpenKind, event: &Event) {
        self.store.request_open(OpenRequest {
            kind,
            path: event.str_field("path").map(str::to_owned),
        });
    }
}
