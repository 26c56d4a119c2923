use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use ato_app_core::app_core::AppStore;
use ato_app_core::domain::{AppState, BuildsData, ManufacturingBuildStatus, WizardState};
use ato_app_core::{slice_summaries, wizard_vm, ClientKernel, CommandPort};
use ato_core::{BuildStatus, TargetKey};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// One `name: status` line per slice.
pub fn render_state(state: &AppState) -> String {
    let mut out = String::new();
    for row in slice_summaries(state) {
        out.push_str(&format!("{:<32} {}\n", row.name, row.status));
    }
    if !state.atopile.current_version.is_empty() {
        out.push_str(&format!("{:<32} {}\n", "atopile", state.atopile.current_version));
    }
    out
}

pub async fn cmd_state(kernel: &ClientKernel) -> Result<()> {
    kernel.initial_load().await;
    print!("{}", render_state(&kernel.store.state()));
    Ok(())
}

/// Prints events as they arrive and every slice whose summary changed, until Ctrl-C.
pub async fn cmd_watch(kernel: &ClientKernel) -> Result<()> {
    let mut events = kernel.dispatcher().observe();
    let mut changes = kernel.store.changes();

    kernel.initial_load().await;
    let mut last: HashMap<String, String> = HashMap::new();
    print_changed(&kernel.store, &mut last);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!(":: event {}", event.event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    debug!("watch fell behind by {} events", n);
                }
                Err(_) => break,
            },
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                print_changed(&kernel.store, &mut last);
            }
        }
    }
    Ok(())
}

fn print_changed(store: &AppStore, last: &mut HashMap<String, String>) {
    for row in store.read(slice_summaries) {
        if last.get(&row.name) != Some(&row.status) {
            println!("   {:<32} {}", row.name, row.status);
            last.insert(row.name, row.status);
        }
    }
}

/// Parses `--params` as a JSON object. Absent means no params.
pub fn parse_params(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).context("params are not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("params must be a JSON object, got {other}"),
    }
}

pub async fn cmd_request(kernel: &ClientKernel, action: &str, params: Option<&str>) -> Result<Value> {
    let params = parse_params(params)?;
    kernel.backend().call(action, params).await
}

/// Queues a build and follows its queue and history entries until every target finished.
pub async fn cmd_build(
    kernel: &ClientKernel,
    project_root: &str,
    targets: &[String],
    timeout: Duration,
) -> Result<HashMap<String, BuildStatus>> {
    let keys: Vec<TargetKey> = targets
        .iter()
        .map(|t| TargetKey::new(project_root, t.as_str()))
        .collect();
    let mut subscription = kernel.store.subscribe_builds(keys);
    // Entries already known belong to earlier builds.
    let earlier = kernel.store.read(|s| known_build_ids(&s.builds.data));
    println!(":: Building {} target(s) in {}", targets.len(), project_root);
    kernel.backend().build(project_root, targets);

    let mut finished: HashMap<String, BuildStatus> = HashMap::new();
    let result = tokio::time::timeout(timeout, async {
        while let Some(entries) = subscription.updates.recv().await {
            for entry in entries {
                if entry.build_id.as_ref().is_some_and(|id| earlier.contains(id)) {
                    continue;
                }
                let target = entry.target_name().to_string();
                if entry.status.is_terminal() && !finished.contains_key(&target) {
                    println!("   {:<24} {:?}", target, entry.status);
                    finished.insert(target, entry.status);
                }
            }
            if targets.iter().all(|t| finished.contains_key(t)) {
                return;
            }
        }
    })
    .await;
    kernel.store.unsubscribe(subscription.id);

    if result.is_err() {
        bail!(
            "timed out after {}s waiting for {} of {} build(s)",
            timeout.as_secs(),
            targets.len() - finished.len(),
            targets.len()
        );
    }
    Ok(finished)
}

fn known_build_ids(builds: &BuildsData) -> HashSet<String> {
    builds
        .queued
        .iter()
        .chain(&builds.history)
        .filter_map(|b| b.build_id.clone())
        .collect()
}

#[derive(Debug, Clone)]
pub struct ManufactureOptions {
    pub project_root: String,
    pub targets: Vec<String>,
    pub directory: Option<String>,
    /// Replaces the default file type selection when set.
    pub file_types: Option<Vec<String>>,
    pub quantity: u32,
    pub allow_dirty: bool,
    pub timeout: Duration,
}

/// Drives the manufacturing wizard end to end: build, confirm every ready target, estimate, export.
pub async fn cmd_manufacture(kernel: &ClientKernel, opts: ManufactureOptions) -> Result<Vec<String>> {
    let wizard = kernel.wizard();
    wizard.open(&opts.project_root);
    let result = run_manufacture(kernel, &opts).await;
    wizard.close();
    result
}

async fn run_manufacture(kernel: &ClientKernel, opts: &ManufactureOptions) -> Result<Vec<String>> {
    let wizard = kernel.wizard();
    wizard.select_targets(&opts.targets);
    if let Some(dir) = &opts.directory {
        wizard.set_export_directory(dir.as_str());
    }
    if let Some(wanted) = &opts.file_types {
        let current = wizard.state().map(|w| w.export_file_types).unwrap_or_default();
        for t in current.iter().filter(|t| !wanted.contains(t)) {
            wizard.toggle_file_type(t);
        }
        for t in wanted.iter().filter(|t| !current.contains(t)) {
            wizard.toggle_file_type(t);
        }
    }
    wizard.set_quantity(opts.quantity);

    let git = wait_for_wizard(&kernel.store, opts.timeout, |w| !w.git_status_loading)
        .await
        .context("git status check did not finish")?;
    if git.shows_git_warning() {
        let files = git
            .git_status
            .map(|g| g.changed_files.join(", "))
            .unwrap_or_default();
        if !opts.allow_dirty {
            bail!("project has uncommitted changes: {files}");
        }
        println!(":: Warning: uncommitted changes in {files}");
        wizard.dismiss_git_warning();
    }

    if !wizard.next_step().await {
        bail!("no build targets selected");
    }

    let pb = ProgressBar::new(opts.targets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30}] {pos}/{len} {msg}")
            .map_err(|e| anyhow!("{e}"))?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let state = loop {
        let w = match wait_for_wizard(&kernel.store, opts.timeout, needs_attention).await {
            Ok(w) => w,
            Err(e) => {
                pb.abandon_with_message("timed out");
                return Err(e.context("builds did not finish"));
            }
        };
        if let Some(failed) = w
            .builds
            .iter()
            .find(|b| b.status == ManufacturingBuildStatus::Failed)
        {
            pb.abandon_with_message(format!("{} failed", failed.target));
            bail!(
                "build for {} failed: {}",
                failed.target,
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
        for b in w
            .builds
            .iter()
            .filter(|b| b.status == ManufacturingBuildStatus::Ready)
        {
            if wizard.confirm(&b.target) {
                info!("confirmed {}", b.target);
                pb.inc(1);
                pb.set_message(b.target.clone());
            }
        }
        let Some(w) = wizard.state() else {
            bail!("wizard closed");
        };
        if w.all_confirmed() {
            break w;
        }
    };
    pb.finish_with_message("all builds confirmed");
    debug!("{} build(s) confirmed", state.builds.len());

    if !wizard.next_step().await {
        bail!("could not enter the export step");
    }
    if let Some(vm) = kernel.store.read(wizard_vm) {
        match (vm.cost_summary, vm.cost_error) {
            (Some(cost), _) => println!(":: Estimated cost: {cost}"),
            (None, Some(err)) => println!(":: Cost estimate unavailable: {err}"),
            (None, None) => {}
        }
    }

    if !wizard.export().await {
        let err = wizard
            .state()
            .and_then(|w| w.export_error)
            .unwrap_or_else(|| "export failed".to_string());
        bail!("{err}");
    }
    let files = wizard
        .state()
        .and_then(|w| w.export_result)
        .map(|r| r.files)
        .unwrap_or_default();
    Ok(files)
}

fn needs_attention(w: &WizardState) -> bool {
    w.all_confirmed()
        || w.builds.iter().any(|b| {
            matches!(
                b.status,
                ManufacturingBuildStatus::Ready | ManufacturingBuildStatus::Failed
            )
        })
}

/// Resolves with the wizard state once `pred` holds.
fn wait_for_wizard(
    store: &AppStore,
    timeout: Duration,
    pred: impl Fn(&WizardState) -> bool + Send + Sync + 'static,
) -> impl std::future::Future<Output = Result<WizardState>> + Send + 'static {
    let store = store.clone();
    async move {
        let mut changes = store.changes();
        let wait = async {
            loop {
                match store.read(|s| s.manufacturing.clone()) {
                    None => bail!("wizard closed"),
                    Some(w) if pred(&w) => return Ok(w),
                    Some(_) => {}
                }
                changes
                    .changed()
                    .await
                    .map_err(|_| anyhow!("store dropped"))?;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| anyhow!("timed out after {}s", timeout.as_secs()))?
    }
}
