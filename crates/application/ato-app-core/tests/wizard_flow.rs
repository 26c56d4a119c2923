use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ato_app_core::app_core::AppStore;
use ato_app_core::domain::{AppState, ManufacturingBuildStatus, WizardStep};
use ato_app_core::ports::{CommandPort, ManufacturingPort};
use ato_app_core::ManufacturingWizard;
use ato_core::manufacturing::{
    BuildOutputs, CostEstimate, ExportRequest, ExportResult, GitStatus,
};
use ato_core::{BomData, Build, BuildStatus, TargetKey};
use tokio::sync::Notify;

#[derive(Default)]
struct DummyManufacturing {
    dirty: bool,
    estimate_calls: AtomicUsize,
    outputs_calls: Mutex<Vec<String>>,
    bom_calls: Mutex<Vec<String>>,
    export_requests: Mutex<Vec<ExportRequest>>,
    export_error: Option<String>,
    /// When set, cost estimates wait for a notification before answering.
    estimate_gate: Option<Arc<Notify>>,
    bom_gate: Option<Arc<Notify>>,
    bom_answered: AtomicUsize,
}

#[async_trait]
impl ManufacturingPort for DummyManufacturing {
    async fn git_status(&self, _project_root: &str) -> anyhow::Result<GitStatus> {
        Ok(GitStatus {
            has_uncommitted_changes: self.dirty,
            changed_files: if self.dirty {
                vec!["main.ato".into()]
            } else {
                vec![]
            },
        })
    }

    async fn build_outputs(&self, key: &TargetKey) -> anyhow::Result<BuildOutputs> {
        self.outputs_calls.lock().unwrap().push(key.target.clone());
        Ok(BuildOutputs {
            gerbers: Some(format!("{}/gerbers.zip", key.target)),
            ..Default::default()
        })
    }

    async fn refresh_bom(&self, key: &TargetKey) -> anyhow::Result<Option<BomData>> {
        self.bom_calls.lock().unwrap().push(key.target.clone());
        if let Some(gate) = &self.bom_gate {
            gate.notified().await;
        }
        self.bom_answered.fetch_add(1, Ordering::SeqCst);
        Ok(Some(BomData {
            version: "1".into(),
            components: vec![],
        }))
    }

    async fn estimate_cost(
        &self,
        _project_root: &str,
        targets: &[String],
        quantity: u32,
    ) -> anyhow::Result<CostEstimate> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.estimate_gate {
            gate.notified().await;
        }
        Ok(CostEstimate {
            total_cost: 10.0 * targets.len() as f64,
            currency: "USD".into(),
            quantity,
            ..Default::default()
        })
    }

    async fn export_files(&self, request: &ExportRequest) -> anyhow::Result<ExportResult> {
        self.export_requests.lock().unwrap().push(request.clone());
        match &self.export_error {
            Some(e) => anyhow::bail!("{e}"),
            None => Ok(ExportResult {
                files: vec![format!("{}/gerbers.zip", request.directory)],
                errors: None,
            }),
        }
    }
}

#[derive(Default)]
struct DummyCommands {
    builds: Mutex<Vec<(String, Vec<String>)>>,
}

impl DummyCommands {
    fn builds(&self) -> Vec<(String, Vec<String>)> {
        self.builds.lock().unwrap().clone()
    }
}

impl CommandPort for DummyCommands {
    fn build(&self, project_root: &str, targets: &[String]) {
        self.builds
            .lock()
            .unwrap()
            .push((project_root.to_string(), targets.to_vec()));
    }
}

type Wizard = ManufacturingWizard<DummyManufacturing, DummyCommands>;

fn setup(manufacturing: DummyManufacturing) -> (AppStore, Wizard, Arc<DummyManufacturing>, Arc<DummyCommands>) {
    let store = AppStore::default();
    let manufacturing = Arc::new(manufacturing);
    let commands = Arc::new(DummyCommands::default());
    let wizard = ManufacturingWizard::new(store.clone(), manufacturing.clone(), commands.clone());
    (store, wizard, manufacturing, commands)
}

fn queued(target: &str, id: &str, status: BuildStatus) -> Build {
    Build {
        name: target.into(),
        display_name: target.into(),
        target: Some(target.into()),
        project_root: Some("/p".into()),
        build_id: Some(id.into()),
        status,
        ..Default::default()
    }
}

async fn wait_until(store: &AppStore, what: &str, pred: impl Fn(&AppState) -> bool) {
    let mut changes = store.changes();
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if store.read(|s| pred(s)) {
                return;
            }
            changes.changed().await.unwrap();
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

fn status_of(store: &AppStore, target: &str) -> ManufacturingBuildStatus {
    store.read(|s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build(target))
            .map(|b| b.status)
            .unwrap()
    })
}

/// Opens the wizard on `/p`, selects `targets` and enters step 2.
async fn in_build_step(wizard: &Wizard, targets: &[&str]) {
    wizard.open("/p");
    for t in targets {
        wizard.toggle_target(t);
    }
    assert!(wizard.next_step().await);
}

#[tokio::test]
async fn entering_step_two_builds_all_pending_and_reconciles_per_target() {
    let (store, wizard, manufacturing, commands) = setup(DummyManufacturing::default());
    in_build_step(&wizard, &["a", "b"]).await;

    assert_eq!(
        commands.builds(),
        vec![("/p".to_string(), vec!["a".to_string(), "b".to_string()])]
    );
    assert_eq!(status_of(&store, "a"), ManufacturingBuildStatus::Building);
    assert_eq!(status_of(&store, "b"), ManufacturingBuildStatus::Building);

    store.set_queued_builds(vec![
        queued("a", "a-1", BuildStatus::Success),
        queued("b", "b-1", BuildStatus::Building),
    ]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;
    assert_eq!(status_of(&store, "b"), ManufacturingBuildStatus::Building);

    wait_until(&store, "outputs for a", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.outputs.is_some())
    })
    .await;
    wait_until(&store, "bom for a", |s| {
        s.bom.contains_key(&TargetKey::new("/p", "a"))
    })
    .await;
    assert_eq!(*manufacturing.outputs_calls.lock().unwrap(), vec!["a".to_string()]);
    assert_eq!(*manufacturing.bom_calls.lock().unwrap(), vec!["a".to_string()]);

    // Still only the one build command: b was in flight the whole time.
    assert_eq!(commands.builds().len(), 1);
}

#[tokio::test]
async fn late_building_update_never_regresses_a_ready_build() {
    let (store, wizard, _, _) = setup(DummyManufacturing::default());
    in_build_step(&wizard, &["a", "b"]).await;

    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Success)]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;

    // Out-of-order stale entry for a, followed by a marker update for b.
    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Building)]);
    store.set_queued_builds(vec![queued("b", "b-1", BuildStatus::Failed)]);
    wait_until(&store, "b failed", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("b"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Failed)
    })
    .await;

    assert_eq!(status_of(&store, "a"), ManufacturingBuildStatus::Ready);
}

#[tokio::test]
async fn step_gates_and_backward_moves_keep_confirmations() {
    let (store, wizard, _, _) = setup(DummyManufacturing::default());
    wizard.open("/p");

    assert!(!wizard.next_step().await, "step 2 needs a selected build");
    wizard.toggle_target("a");
    assert!(wizard.next_step().await);

    assert!(!wizard.confirm("a"), "only ready builds can be confirmed");
    assert!(!wizard.next_step().await, "step 3 needs every build confirmed");

    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Warning)]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;
    assert!(wizard.confirm("a"));
    assert!(wizard.next_step().await);
    assert_eq!(wizard.state().unwrap().step, WizardStep::Export);

    assert!(wizard.go_to_step(WizardStep::SelectBuilds).await);
    assert_eq!(status_of(&store, "a"), ManufacturingBuildStatus::Confirmed);
    assert!(wizard.go_to_step(WizardStep::Export).await);
}

#[tokio::test]
async fn zero_confirmed_targets_clear_the_estimate_without_a_call() {
    let (store, wizard, manufacturing, _) = setup(DummyManufacturing::default());
    wizard.open("/p");
    wizard.toggle_target("a");
    store.with_wizard_mut(|w| {
        w.cost_estimate = Some(CostEstimate::default());
        w.cost_error = Some("old".into());
    });

    wizard.refresh_cost_estimate().await;

    let w = wizard.state().unwrap();
    assert_eq!(w.cost_estimate, None);
    assert_eq!(w.cost_error, None);
    assert!(!w.cost_loading);
    assert_eq!(manufacturing.estimate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn entering_export_estimates_cost_for_confirmed_targets() {
    let (store, wizard, manufacturing, _) = setup(DummyManufacturing::default());
    in_build_step(&wizard, &["a"]).await;
    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Success)]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;
    wizard.confirm("a");
    wizard.set_quantity(0);

    assert!(wizard.next_step().await);

    let w = wizard.state().unwrap();
    assert_eq!(manufacturing.estimate_calls.load(Ordering::SeqCst), 1);
    let estimate = w.cost_estimate.unwrap();
    assert_eq!(estimate.total_cost, 10.0);
    assert_eq!(estimate.quantity, ato_config::MIN_MANUFACTURING_QUANTITY);
}

#[tokio::test]
async fn export_failure_is_reported_and_wizard_stays_open() {
    let (store, wizard, manufacturing, _) = setup(DummyManufacturing {
        export_error: Some("disk full".into()),
        ..Default::default()
    });
    in_build_step(&wizard, &["a"]).await;
    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Success)]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;
    wizard.confirm("a");
    wizard.set_export_directory("/out");
    wizard.toggle_file_type("step");

    assert!(!wizard.export().await);

    assert!(wizard.is_open());
    let w = wizard.state().unwrap();
    assert_eq!(w.export_error.as_deref(), Some("disk full"));
    assert!(!w.exporting);

    let requests = manufacturing.export_requests.lock().unwrap();
    assert_eq!(requests[0].directory, "/out");
    assert_eq!(requests[0].targets, vec!["a".to_string()]);
    assert!(requests[0].file_types.contains(&"step".to_string()));
}

#[tokio::test]
async fn retry_marks_the_old_build_stale_and_rebuilds() {
    let (store, wizard, _, commands) = setup(DummyManufacturing::default());
    in_build_step(&wizard, &["a"]).await;

    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Failed)]);
    wait_until(&store, "a failed", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Failed)
    })
    .await;
    assert!(!wizard.retry("missing"));
    assert!(wizard.retry("a"));

    assert_eq!(commands.builds().len(), 2);
    assert_eq!(status_of(&store, "a"), ManufacturingBuildStatus::Building);

    // The failed run is still in the queue; it must not fail the retried build.
    store.set_queued_builds(vec![
        queued("a", "a-1", BuildStatus::Failed),
        queued("a", "a-2", BuildStatus::Success),
    ]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;
    let w = wizard.state().unwrap();
    assert_eq!(w.build("a").unwrap().build_id.as_deref(), Some("a-2"));
}

#[tokio::test]
async fn dirty_tree_warning_until_dismissed() {
    let (store, wizard, _, _) = setup(DummyManufacturing {
        dirty: true,
        ..Default::default()
    });
    wizard.open("/p");
    wait_until(&store, "git status", |s| {
        s.manufacturing
            .as_ref()
            .is_some_and(|w| !w.git_status_loading)
    })
    .await;

    assert!(wizard.state().unwrap().shows_git_warning());
    wizard.dismiss_git_warning();
    assert!(!wizard.state().unwrap().shows_git_warning());
}

#[tokio::test]
async fn results_after_close_are_dropped() {
    let gate = Arc::new(Notify::new());
    let (store, wizard, manufacturing, _) = setup(DummyManufacturing {
        estimate_gate: Some(gate.clone()),
        ..Default::default()
    });
    in_build_step(&wizard, &["a"]).await;
    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Success)]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;
    wizard.confirm("a");

    let w = wizard.clone();
    let pending = tokio::spawn(async move { w.refresh_cost_estimate().await });
    while manufacturing.estimate_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    wizard.close();
    assert!(wizard.state().is_none());
    assert_eq!(store.subscriber_count(), 0);

    // A new session must not receive the old session's result either.
    wizard.open("/p");
    gate.notify_one();
    pending.await.unwrap();

    let fresh = wizard.state().unwrap();
    assert_eq!(fresh.cost_estimate, None);
    assert!(!fresh.cost_loading);
}

#[tokio::test]
async fn reselecting_targets_keeps_existing_status_and_updates_subscription() {
    let (store, wizard, _, _) = setup(DummyManufacturing::default());
    in_build_step(&wizard, &["a"]).await;

    wizard.select_targets(&["b".to_string(), "a".to_string()]);
    let w = wizard.state().unwrap();
    assert_eq!(w.builds[0].target, "b");
    assert_eq!(w.builds[0].status, ManufacturingBuildStatus::Pending);
    assert_eq!(w.builds[1].status, ManufacturingBuildStatus::Building);

    // b is now subscribed to; an update for it reaches the wizard.
    store.set_queued_builds(vec![queued("b", "b-1", BuildStatus::Queued)]);
    wait_until(&store, "b building", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("b"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Building)
    })
    .await;
}

#[tokio::test]
async fn build_finishing_into_history_makes_the_target_ready() {
    let (store, wizard, _, _) = setup(DummyManufacturing::default());
    in_build_step(&wizard, &["a"]).await;

    store.set_builds(vec![], vec![queued("a", "a-1", BuildStatus::Building)]);
    wait_until(&store, "a pinned", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.build_id.as_deref() == Some("a-1"))
    })
    .await;

    // The backend drops finished builds from the queue and lists them in history.
    store.set_builds(vec![queued("a", "a-1", BuildStatus::Success)], vec![]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;
}

#[tokio::test]
async fn earlier_history_entries_do_not_complete_a_new_build() {
    let (store, wizard, _, _) = setup(DummyManufacturing::default());
    store.set_builds(vec![queued("a", "a-0", BuildStatus::Success)], vec![]);
    in_build_step(&wizard, &["a"]).await;

    store.set_builds(vec![queued("a", "a-0", BuildStatus::Success)], vec![]);
    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Building)]);
    wait_until(&store, "a pinned", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.build_id.as_deref() == Some("a-1"))
    })
    .await;

    assert_eq!(status_of(&store, "a"), ManufacturingBuildStatus::Building);
}

#[tokio::test]
async fn adding_a_target_on_step_two_builds_it() {
    let (store, wizard, _, commands) = setup(DummyManufacturing::default());
    in_build_step(&wizard, &["a"]).await;
    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Success)]);
    wait_until(&store, "a ready", |s| {
        s.manufacturing
            .as_ref()
            .and_then(|w| w.build("a"))
            .is_some_and(|b| b.status == ManufacturingBuildStatus::Ready)
    })
    .await;

    wizard.toggle_target("b");

    assert_eq!(
        commands.builds(),
        vec![
            ("/p".to_string(), vec!["a".to_string()]),
            ("/p".to_string(), vec!["b".to_string()]),
        ]
    );
    assert_eq!(status_of(&store, "b"), ManufacturingBuildStatus::Building);

    // c waits for b's build to finish.
    wizard.select_targets(&["a".to_string(), "b".to_string(), "c".to_string()]);
    assert_eq!(commands.builds().len(), 2);
    assert_eq!(status_of(&store, "c"), ManufacturingBuildStatus::Pending);
}

#[tokio::test]
async fn bom_landing_after_close_is_dropped() {
    let gate = Arc::new(Notify::new());
    let (store, wizard, manufacturing, _) = setup(DummyManufacturing {
        bom_gate: Some(gate.clone()),
        ..Default::default()
    });
    in_build_step(&wizard, &["a"]).await;
    store.set_queued_builds(vec![queued("a", "a-1", BuildStatus::Success)]);
    while manufacturing.bom_calls.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    wizard.close();
    wizard.open("/p");
    gate.notify_one();
    while manufacturing.bom_answered.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let key = TargetKey::new("/p", "a");
    assert!(store.read(|s| !s.bom.contains_key(&key)));
}
