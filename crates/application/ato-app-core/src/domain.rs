use std::collections::HashMap;

use ato_core::manufacturing::{BuildOutputs, CostEstimate, ExportResult, GitStatus};
use ato_core::{
    AtopileConfig, BomData, Build, DependencyInfo, FileTreeNode, ModuleDefinition, PackageInfo,
    Problem, Project, StdLibItem, TargetKey, VariablesData,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type ProjectRoot = String;

/// One logical domain of the store plus its own loading/error flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T: Default> Default for Slice<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Slice<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            loading: false,
            error: None,
        }
    }

    pub(crate) fn replace(&mut self, data: T) {
        self.data = data;
        self.loading = false;
        self.error = None;
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildsData {
    /// Completed builds.
    pub history: Vec<Build>,
    /// Active and queued builds.
    pub queued: Vec<Build>,
}

/// Addresses one slice for the generic loading/error setters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SliceKind {
    Projects,
    Builds,
    Packages,
    Problems,
    Stdlib,
    ProjectFiles(ProjectRoot),
    ProjectModules(ProjectRoot),
    ProjectDependencies(ProjectRoot),
    Bom(TargetKey),
    Variables(TargetKey),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub project_root: Option<ProjectRoot>,
    pub target_names: Vec<String>,
    pub developer_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    Layout,
    Kicad,
    ThreeD,
}

/// A one-shot request from the backend to open a viewer; consumed by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub kind: OpenKind,
    pub path: Option<String>,
}

// --- Manufacturing wizard ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    SelectBuilds = 1,
    BuildAndReview = 2,
    Export = 3,
}

impl WizardStep {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(WizardStep::SelectBuilds),
            2 => Some(WizardStep::BuildAndReview),
            3 => Some(WizardStep::Export),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManufacturingBuildStatus {
    #[default]
    Pending,
    Building,
    Ready,
    Failed,
    Confirmed,
}

impl ManufacturingBuildStatus {
    /// Position in the forward-only lifecycle. `Ready` and `Failed` share a rank.
    pub fn rank(self) -> u8 {
        match self {
            ManufacturingBuildStatus::Pending => 0,
            ManufacturingBuildStatus::Building => 1,
            ManufacturingBuildStatus::Ready | ManufacturingBuildStatus::Failed => 2,
            ManufacturingBuildStatus::Confirmed => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManufacturingBuild {
    pub target: String,
    pub status: ManufacturingBuildStatus,
    pub build_id: Option<String>,
    pub error: Option<String>,
    /// Build ids superseded by a retry; updates carrying them are ignored.
    pub stale_build_ids: Vec<String>,
    pub outputs: Option<BuildOutputs>,
    pub outputs_error: Option<String>,
}

impl ManufacturingBuild {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WizardState {
    pub project_root: ProjectRoot,
    pub step: WizardStep,
    pub builds: Vec<ManufacturingBuild>,

    pub git_status: Option<GitStatus>,
    pub git_status_loading: bool,
    pub git_warning_dismissed: bool,

    pub export_directory: String,
    pub export_file_types: Vec<String>,
    pub quantity: u32,

    pub cost_estimate: Option<CostEstimate>,
    pub cost_loading: bool,
    pub cost_error: Option<String>,

    pub exporting: bool,
    pub export_error: Option<String>,
    pub export_result: Option<ExportResult>,
}

impl WizardState {
    pub fn new(project_root: impl Into<ProjectRoot>, export_directory: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            step: WizardStep::SelectBuilds,
            builds: Vec::new(),
            git_status: None,
            git_status_loading: false,
            git_warning_dismissed: false,
            export_directory: export_directory.into(),
            export_file_types: ato_config::DEFAULT_EXPORT_FILE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            quantity: ato_config::DEFAULT_MANUFACTURING_QUANTITY,
            cost_estimate: None,
            cost_loading: false,
            cost_error: None,
            exporting: false,
            export_error: None,
            export_result: None,
        }
    }

    pub fn build(&self, target: &str) -> Option<&ManufacturingBuild> {
        self.builds.iter().find(|b| b.target == target)
    }

    pub fn build_mut(&mut self, target: &str) -> Option<&mut ManufacturingBuild> {
        self.builds.iter_mut().find(|b| b.target == target)
    }

    pub fn confirmed_targets(&self) -> Vec<String> {
        self.builds
            .iter()
            .filter(|b| b.status == ManufacturingBuildStatus::Confirmed)
            .map(|b| b.target.clone())
            .collect()
    }

    pub fn all_confirmed(&self) -> bool {
        !self.builds.is_empty()
            && self
                .builds
                .iter()
                .all(|b| b.status == ManufacturingBuildStatus::Confirmed)
    }

    pub fn target_keys(&self) -> Vec<TargetKey> {
        self.builds
            .iter()
            .map(|b| TargetKey::new(self.project_root.clone(), b.target.clone()))
            .collect()
    }

    /// The dirty-tree warning is shown until dismissed.
    pub fn shows_git_warning(&self) -> bool {
        !self.git_warning_dismissed
            && self
                .git_status
                .as_ref()
                .is_some_and(|g| g.has_uncommitted_changes)
    }
}

// --- Review dashboard ---

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewComment {
    pub id: uuid::Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub project_root: ProjectRoot,
    pub target: String,
    pub active_page: Option<String>,
    pub reviewed: HashMap<String, bool>,
    pub comments: HashMap<String, Vec<ReviewComment>>,
}

impl DashboardState {
    pub fn new(project_root: impl Into<ProjectRoot>, target: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            target: target.into(),
            active_page: None,
            reviewed: HashMap::new(),
            comments: HashMap::new(),
        }
    }
}

// --- Settings ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub backend_addr: String,
    pub request_timeout_ms: u64,
    pub developer_mode: bool,
    pub export_directory: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_addr: ato_config::DEFAULT_BACKEND_ADDR.to_string(),
            request_timeout_ms: ato_config::DEFAULT_REQUEST_TIMEOUT_MS,
            developer_mode: false,
            export_directory: String::new(),
        }
    }
}

// --- The tree ---

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub projects: Slice<Vec<Project>>,
    pub builds: Slice<BuildsData>,
    pub packages: Slice<Vec<PackageInfo>>,
    pub problems: Slice<Vec<Problem>>,
    pub stdlib: Slice<Vec<StdLibItem>>,

    pub project_files: HashMap<ProjectRoot, Slice<Vec<FileTreeNode>>>,
    pub project_modules: HashMap<ProjectRoot, Slice<Vec<ModuleDefinition>>>,
    pub project_dependencies: HashMap<ProjectRoot, Slice<Vec<DependencyInfo>>>,

    pub bom: HashMap<TargetKey, Slice<Option<BomData>>>,
    pub variables: HashMap<TargetKey, Slice<Option<VariablesData>>>,

    pub atopile: AtopileConfig,
    pub selection: Selection,
    pub log_view_current_id: Option<String>,
    pub open_request: Option<OpenRequest>,

    pub manufacturing: Option<WizardState>,
    pub dashboard: Option<DashboardState>,
}

impl AppState {
    /// Selected project plus the first selected target name, when both exist.
    pub fn selected_target(&self) -> Option<TargetKey> {
        let root = self.selection.project_root.as_ref()?;
        let target = self.selection.target_names.first()?;
        Some(TargetKey::new(root.clone(), target.clone()))
    }

    /// Builds an initial tree from a backend `state` snapshot.
    ///
    /// Keys the snapshot does not carry start empty; wizard and dashboard never hydrate.
    pub fn from_snapshot(snapshot: Value) -> Result<Self, serde_json::Error> {
        let snap: Snapshot = serde_json::from_value(snapshot)?;

        let mut state = AppState {
            projects: Slice::new(snap.projects),
            builds: Slice::new(BuildsData {
                history: snap.builds,
                queued: snap.queued_builds,
            }),
            packages: Slice::new(snap.packages),
            problems: Slice::new(snap.problems),
            stdlib: Slice::new(snap.stdlib_items),
            atopile: snap.atopile,
            selection: Selection {
                project_root: snap.selected_project_root,
                target_names: snap.selected_target_names,
                developer_mode: snap.developer_mode,
            },
            log_view_current_id: snap.log_view_current_id,
            ..AppState::default()
        };
        state.packages.error = snap.packages_error;

        state.project_files = snap
            .project_files
            .into_iter()
            .map(|(root, files)| (root, Slice::new(files)))
            .collect();
        state.project_modules = snap
            .project_modules
            .into_iter()
            .map(|(root, modules)| (root, Slice::new(modules)))
            .collect();

        if let Some(key) = state.selected_target() {
            if snap.bom_data.is_some() {
                state.bom.insert(key.clone(), Slice::new(snap.bom_data));
            }
            if snap.current_variables_data.is_some() {
                state
                    .variables
                    .insert(key, Slice::new(snap.current_variables_data));
            }
        }
        Ok(state)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snapshot {
    projects: Vec<Project>,
    selected_project_root: Option<String>,
    selected_target_names: Vec<String>,
    builds: Vec<Build>,
    queued_builds: Vec<Build>,
    packages: Vec<PackageInfo>,
    packages_error: Option<String>,
    stdlib_items: Vec<StdLibItem>,
    problems: Vec<Problem>,
    developer_mode: bool,
    atopile: AtopileConfig,
    project_files: HashMap<String, Vec<FileTreeNode>>,
    project_modules: HashMap<String, Vec<ModuleDefinition>>,
    bom_data: Option<BomData>,
    current_variables_data: Option<VariablesData>,
    log_view_current_id: Option<String>,
}
