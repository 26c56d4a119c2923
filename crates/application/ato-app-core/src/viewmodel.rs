use ato_core::manufacturing::CostEstimate;

use crate::domain::{AppState, ManufacturingBuildStatus, Slice, WizardState, WizardStep};

fn format_cost(amount: f64, currency: &str) -> String {
    let currency = if currency.is_empty() { "USD" } else { currency };
    format!("{amount:.2} {currency}")
}

fn status_label(status: ManufacturingBuildStatus) -> &'static str {
    match status {
        ManufacturingBuildStatus::Pending => "Pending",
        ManufacturingBuildStatus::Building => "Building",
        ManufacturingBuildStatus::Ready => "Ready for review",
        ManufacturingBuildStatus::Failed => "Failed",
        ManufacturingBuildStatus::Confirmed => "Confirmed",
    }
}

fn step_title(step: WizardStep) -> &'static str {
    match step {
        WizardStep::SelectBuilds => "Select builds",
        WizardStep::BuildAndReview => "Build & review",
        WizardStep::Export => "Export",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceSummaryVm {
    pub name: String,
    pub status: String,
}

fn summarize<T>(name: impl Into<String>, slice: &Slice<T>, count: usize) -> SliceSummaryVm {
    let status = if slice.loading {
        "loading".to_string()
    } else if let Some(err) = &slice.error {
        format!("error: {err} ({count} cached)")
    } else {
        format!("{count} item(s)")
    };
    SliceSummaryVm {
        name: name.into(),
        status,
    }
}

/// One line per slice, keyed slices included, in a stable order.
pub fn slice_summaries(state: &AppState) -> Vec<SliceSummaryVm> {
    let mut out = vec![
        summarize("projects", &state.projects, state.projects.data.len()),
        summarize(
            "builds",
            &state.builds,
            state.builds.data.history.len() + state.builds.data.queued.len(),
        ),
        summarize("packages", &state.packages, state.packages.data.len()),
        summarize("problems", &state.problems, state.problems.data.len()),
        summarize("stdlib", &state.stdlib, state.stdlib.data.len()),
    ];

    let mut keyed = Vec::new();
    for (root, s) in &state.project_files {
        keyed.push(summarize(format!("files {root}"), s, s.data.len()));
    }
    for (root, s) in &state.project_modules {
        keyed.push(summarize(format!("modules {root}"), s, s.data.len()));
    }
    for (root, s) in &state.project_dependencies {
        keyed.push(summarize(format!("dependencies {root}"), s, s.data.len()));
    }
    for (key, s) in &state.bom {
        let count = s.data.as_ref().map_or(0, |b| b.components.len());
        keyed.push(summarize(
            format!("bom {}:{}", key.project_root, key.target),
            s,
            count,
        ));
    }
    for (key, s) in &state.variables {
        let count = s.data.as_ref().map_or(0, |v| v.nodes.len());
        keyed.push(summarize(
            format!("variables {}:{}", key.project_root, key.target),
            s,
            count,
        ));
    }
    keyed.sort_by(|a, b| a.name.cmp(&b.name));
    out.extend(keyed);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildRowVm {
    pub target: String,
    pub status: &'static str,
    pub detail: Option<String>,
    pub can_confirm: bool,
    pub can_retry: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WizardVm {
    pub step: u8,
    pub step_title: &'static str,
    pub builds: Vec<BuildRowVm>,
    pub can_advance: bool,
    pub show_git_warning: bool,
    pub changed_files: Vec<String>,
    pub cost_summary: Option<String>,
    pub cost_error: Option<String>,
    pub export_error: Option<String>,
    pub exported_files: Vec<String>,
}

fn cost_summary(estimate: &CostEstimate) -> String {
    format!(
        "{} for {} board(s)",
        format_cost(estimate.total_cost, &estimate.currency),
        estimate.quantity
    )
}

impl WizardVm {
    pub fn from_state(w: &WizardState) -> Self {
        let can_advance = match w.step {
            WizardStep::SelectBuilds => !w.builds.is_empty(),
            WizardStep::BuildAndReview => w.all_confirmed(),
            WizardStep::Export => false,
        };
        Self {
            step: w.step.number(),
            step_title: step_title(w.step),
            builds: w
                .builds
                .iter()
                .map(|b| BuildRowVm {
                    target: b.target.clone(),
                    status: status_label(b.status),
                    detail: b.error.clone().or_else(|| b.outputs_error.clone()),
                    can_confirm: b.status == ManufacturingBuildStatus::Ready,
                    can_retry: b.status == ManufacturingBuildStatus::Failed,
                })
                .collect(),
            can_advance,
            show_git_warning: w.shows_git_warning(),
            changed_files: w
                .git_status
                .as_ref()
                .map(|g| g.changed_files.clone())
                .unwrap_or_default(),
            cost_summary: w.cost_estimate.as_ref().map(cost_summary),
            cost_error: w.cost_error.clone(),
            export_error: w.export_error.clone(),
            exported_files: w
                .export_result
                .as_ref()
                .map(|r| r.files.clone())
                .unwrap_or_default(),
        }
    }
}

pub fn wizard_vm(state: &AppState) -> Option<WizardVm> {
    state.manufacturing.as_ref().map(WizardVm::from_state)
}
