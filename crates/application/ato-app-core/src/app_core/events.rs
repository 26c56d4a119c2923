use ato_core::{
    AtopileConfigPatch, BomData, Build, DependencyInfo, FileTreeNode, ModuleDefinition,
    PackageInfo, Problem, Project, StdLibItem, TargetKey, VariablesData,
};

use crate::domain::{AppState, OpenRequest, ProjectRoot, SliceKind};

#[derive(Debug, Clone)]
pub enum DomainEvent {
    // Wholesale replacement
    Hydrated(Box<AppState>),

    // Fetched snapshots
    ProjectsLoaded(Vec<Project>),
    BuildsLoaded {
        history: Vec<Build>,
        queued: Vec<Build>,
    },
    QueuedBuildsLoaded(Vec<Build>),
    PackagesLoaded(Vec<PackageInfo>),
    ProblemsLoaded(Vec<Problem>),
    StdlibLoaded(Vec<StdLibItem>),
    ProjectFilesLoaded {
        root: ProjectRoot,
        files: Vec<FileTreeNode>,
    },
    ProjectModulesLoaded {
        root: ProjectRoot,
        modules: Vec<ModuleDefinition>,
    },
    ProjectDependenciesLoaded {
        root: ProjectRoot,
        dependencies: Vec<DependencyInfo>,
    },
    BomLoaded {
        key: TargetKey,
        bom: Option<BomData>,
    },
    VariablesLoaded {
        key: TargetKey,
        variables: Option<VariablesData>,
    },

    // Per-slice flags
    SliceLoading {
        kind: SliceKind,
        loading: bool,
    },
    SliceError {
        kind: SliceKind,
        message: Option<String>,
    },

    // Patches
    AtopileConfigPatched(AtopileConfigPatch),
    LogViewCurrentIdChanged(Option<String>),
    OpenRequested(OpenRequest),
    OpenRequestTaken,

    // Selection
    ProjectSelected(Option<ProjectRoot>),
    TargetsSelected(Vec<String>),
    DeveloperModeChanged(bool),
}

impl DomainEvent {
    /// Whether build subscribers must see the builds slice after this event.
    pub(crate) fn touches_builds(&self) -> bool {
        matches!(
            self,
            DomainEvent::BuildsLoaded { .. }
                | DomainEvent::QueuedBuildsLoaded(_)
                | DomainEvent::Hydrated(_)
        )
    }
}
