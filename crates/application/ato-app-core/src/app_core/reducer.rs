use crate::domain::{AppState, Slice, SliceKind};

use super::events::DomainEvent;

pub fn reduce(state: &mut AppState, ev: DomainEvent) {
    match ev {
        DomainEvent::Hydrated(next) => {
            // Ephemeral UI flows survive a replay; everything else is replaced.
            let manufacturing = state.manufacturing.take();
            let dashboard = state.dashboard.take();
            *state = *next;
            state.manufacturing = manufacturing;
            state.dashboard = dashboard;
        }

        DomainEvent::ProjectsLoaded(list) => state.projects.replace(list),
        DomainEvent::BuildsLoaded { history, queued } => {
            state.builds.data.history = history;
            state.builds.data.queued = queued;
            state.builds.loading = false;
            state.builds.error = None;
        }
        DomainEvent::QueuedBuildsLoaded(queued) => {
            state.builds.data.queued = queued;
            state.builds.loading = false;
            state.builds.error = None;
        }
        DomainEvent::PackagesLoaded(list) => state.packages.replace(list),
        DomainEvent::ProblemsLoaded(list) => state.problems.replace(list),
        DomainEvent::StdlibLoaded(list) => state.stdlib.replace(list),
        DomainEvent::ProjectFilesLoaded { root, files } => {
            state.project_files.entry(root).or_default().replace(files)
        }
        DomainEvent::ProjectModulesLoaded { root, modules } => {
            state.project_modules.entry(root).or_default().replace(modules)
        }
        DomainEvent::ProjectDependenciesLoaded { root, dependencies } => state
            .project_dependencies
            .entry(root)
            .or_default()
            .replace(dependencies),
        DomainEvent::BomLoaded { key, bom } => state.bom.entry(key).or_default().replace(bom),
        DomainEvent::VariablesLoaded { key, variables } => {
            state.variables.entry(key).or_default().replace(variables)
        }

        DomainEvent::SliceLoading { kind, loading } => {
            with_flags(state, kind, |loading_flag, _| *loading_flag = loading)
        }
        DomainEvent::SliceError { kind, message } => with_flags(state, kind, |loading, error| {
            *error = message;
            *loading = false;
        }),

        DomainEvent::AtopileConfigPatched(patch) => patch.apply_to(&mut state.atopile),
        DomainEvent::LogViewCurrentIdChanged(id) => state.log_view_current_id = id,
        DomainEvent::OpenRequested(req) => state.open_request = Some(req),
        DomainEvent::OpenRequestTaken => state.open_request = None,

        DomainEvent::ProjectSelected(root) => {
            if state.selection.project_root != root {
                state.selection.target_names.clear();
            }
            state.selection.project_root = root;
        }
        DomainEvent::TargetsSelected(names) => state.selection.target_names = names,
        DomainEvent::DeveloperModeChanged(on) => state.selection.developer_mode = on,
    }
}

fn with_flags(state: &mut AppState, kind: SliceKind, f: impl FnOnce(&mut bool, &mut Option<String>)) {
    fn flags<T>(slice: &mut Slice<T>) -> (&mut bool, &mut Option<String>) {
        (&mut slice.loading, &mut slice.error)
    }

    let (loading, error) = match kind {
        SliceKind::Projects => flags(&mut state.projects),
        SliceKind::Builds => flags(&mut state.builds),
        SliceKind::Packages => flags(&mut state.packages),
        SliceKind::Problems => flags(&mut state.problems),
        SliceKind::Stdlib => flags(&mut state.stdlib),
        SliceKind::ProjectFiles(root) => flags(state.project_files.entry(root).or_default()),
        SliceKind::ProjectModules(root) => flags(state.project_modules.entry(root).or_default()),
        SliceKind::ProjectDependencies(root) => {
            flags(state.project_dependencies.entry(root).or_default())
        }
        SliceKind::Bom(key) => flags(state.bom.entry(key).or_default()),
        SliceKind::Variables(key) => flags(state.variables.entry(key).or_default()),
    };
    f(loading, error);
}
