use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use ato_core::{
    AtopileConfigPatch, BomData, Build, DependencyInfo, FileTreeNode, ModuleDefinition,
    PackageInfo, Problem, Project, StdLibItem, TargetKey, VariablesData,
};
use tokio::sync::{mpsc, watch};

use crate::domain::{AppState, BuildsData, DashboardState, OpenRequest, ProjectRoot, SliceKind, WizardState};

use super::{events::DomainEvent, reducer::reduce};

pub type SubscriptionId = u64;

/// Receiving end of a targeted builds subscription.
pub struct BuildSubscription {
    pub id: SubscriptionId,
    /// Each message holds the queued then the history entries matching the subscribed keys.
    pub updates: mpsc::UnboundedReceiver<Vec<Build>>,
}

struct Subscriber {
    keys: HashSet<TargetKey>,
    tx: mpsc::UnboundedSender<Vec<Build>>,
}

#[derive(Default)]
struct Subscriptions {
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl Subscriptions {
    fn notify(&mut self, builds: &BuildsData) {
        self.subscribers.retain(|_, sub| {
            let matching: Vec<Build> = builds
                .queued
                .iter()
                .chain(&builds.history)
                .filter(|b| {
                    b.project_root.as_ref().is_some_and(|root| {
                        sub.keys
                            .contains(&TargetKey::new(root.clone(), b.target_name()))
                    })
                })
                .cloned()
                .collect();
            if matching.is_empty() {
                return !sub.tx.is_closed();
            }
            sub.tx.send(matching).is_ok()
        });
    }
}

/// The single client state tree. Cheap to clone; every clone shares one tree.
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<Mutex<AppState>>,
    revision: Arc<watch::Sender<u64>>,
    subscriptions: Arc<Mutex<Subscriptions>>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

impl AppStore {
    pub fn new(state: AppState) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(state)),
            revision: Arc::new(revision),
            subscriptions: Arc::new(Mutex::new(Subscriptions::default())),
        }
    }

    pub fn state(&self) -> AppState {
        self.inner.lock().unwrap().clone()
    }

    /// Read a projection without cloning the whole tree.
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.inner.lock().unwrap())
    }

    /// Bumped after every mutation.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn apply(&self, ev: DomainEvent) {
        let notify = ev.touches_builds();
        {
            let mut guard = self.inner.lock().unwrap();
            reduce(&mut guard, ev);
            // Delivered under the state lock so subscribers observe writes in order.
            if notify {
                self.subscriptions
                    .lock()
                    .unwrap()
                    .notify(&guard.builds.data);
            }
        }
        self.bump();
    }

    pub(crate) fn with_state_mut<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let out = {
            let mut guard = self.inner.lock().unwrap();
            f(&mut guard)
        };
        self.bump();
        out
    }

    /// Runs `f` against the open wizard; `None` when the wizard is closed.
    pub fn with_wizard_mut<R>(&self, f: impl FnOnce(&mut WizardState) -> R) -> Option<R> {
        self.with_state_mut(|s| s.manufacturing.as_mut().map(f))
    }

    pub fn with_dashboard_mut<R>(&self, f: impl FnOnce(&mut DashboardState) -> R) -> Option<R> {
        self.with_state_mut(|s| s.dashboard.as_mut().map(f))
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    // --- Named setters ---

    /// Full-state hydration; the only wholesale replacement of the tree.
    pub fn hydrate(&self, state: AppState) {
        self.apply(DomainEvent::Hydrated(Box::new(state)));
    }

    pub fn set_projects(&self, list: Vec<Project>) {
        self.apply(DomainEvent::ProjectsLoaded(list));
    }

    pub fn set_builds(&self, history: Vec<Build>, queued: Vec<Build>) {
        self.apply(DomainEvent::BuildsLoaded { history, queued });
    }

    pub fn set_queued_builds(&self, queued: Vec<Build>) {
        self.apply(DomainEvent::QueuedBuildsLoaded(queued));
    }

    pub fn set_packages(&self, list: Vec<PackageInfo>) {
        self.apply(DomainEvent::PackagesLoaded(list));
    }

    pub fn set_problems(&self, list: Vec<Problem>) {
        self.apply(DomainEvent::ProblemsLoaded(list));
    }

    pub fn set_stdlib(&self, list: Vec<StdLibItem>) {
        self.apply(DomainEvent::StdlibLoaded(list));
    }

    pub fn set_project_files(&self, root: ProjectRoot, files: Vec<FileTreeNode>) {
        self.apply(DomainEvent::ProjectFilesLoaded { root, files });
    }

    pub fn set_project_modules(&self, root: ProjectRoot, modules: Vec<ModuleDefinition>) {
        self.apply(DomainEvent::ProjectModulesLoaded { root, modules });
    }

    pub fn set_project_dependencies(&self, root: ProjectRoot, dependencies: Vec<DependencyInfo>) {
        self.apply(DomainEvent::ProjectDependenciesLoaded { root, dependencies });
    }

    pub fn set_bom(&self, key: TargetKey, bom: Option<BomData>) {
        self.apply(DomainEvent::BomLoaded { key, bom });
    }

    pub fn set_variables(&self, key: TargetKey, variables: Option<VariablesData>) {
        self.apply(DomainEvent::VariablesLoaded { key, variables });
    }

    pub fn set_loading(&self, kind: SliceKind, loading: bool) {
        self.apply(DomainEvent::SliceLoading { kind, loading });
    }

    /// Sets or clears a slice's error. Always clears its loading flag.
    pub fn set_error(&self, kind: SliceKind, message: Option<String>) {
        self.apply(DomainEvent::SliceError { kind, message });
    }

    pub fn patch_atopile_config(&self, patch: AtopileConfigPatch) {
        self.apply(DomainEvent::AtopileConfigPatched(patch));
    }

    pub fn set_log_view_current_id(&self, id: Option<String>) {
        self.apply(DomainEvent::LogViewCurrentIdChanged(id));
    }

    pub fn request_open(&self, req: OpenRequest) {
        self.apply(DomainEvent::OpenRequested(req));
    }

    /// Takes the pending open request, if any. Each request is seen once.
    pub fn take_open_request(&self) -> Option<OpenRequest> {
        let req = self.read(|s| s.open_request.clone())?;
        self.apply(DomainEvent::OpenRequestTaken);
        Some(req)
    }

    pub fn select_project(&self, root: Option<ProjectRoot>) {
        self.apply(DomainEvent::ProjectSelected(root));
    }

    pub fn select_targets(&self, names: Vec<String>) {
        self.apply(DomainEvent::TargetsSelected(names));
    }

    pub fn set_developer_mode(&self, on: bool) {
        self.apply(DomainEvent::DeveloperModeChanged(on));
    }

    // --- Build subscriptions ---

    pub fn subscribe_builds(&self, keys: impl IntoIterator<Item = TargetKey>) -> BuildSubscription {
        let (tx, updates) = mpsc::unbounded_channel();
        let mut subs = self.subscriptions.lock().unwrap();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.subscribers.insert(
            id,
            Subscriber {
                keys: keys.into_iter().collect(),
                tx,
            },
        );
        BuildSubscription { id, updates }
    }

    pub fn update_subscription(&self, id: SubscriptionId, keys: impl IntoIterator<Item = TargetKey>) {
        if let Some(sub) = self.subscriptions.lock().unwrap().subscribers.get_mut(&id) {
            sub.keys = keys.into_iter().collect();
        }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.lock().unwrap().subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().unwrap().subscribers.len()
    }
}
