//! Manufacturing export wizard: select targets, build and review them, export.
//!
//! Step 2 completion is driven by the backend builds slice. The wizard holds a
//! targeted build subscription and reconciles each matching queued or history
//! entry into its per-target status. Every write from an async tail is made under the
//! store lock after checking the session's liveness token, so results that land
//! after `close` are dropped.

use std::sync::{Arc, Mutex};

use ato_core::manufacturing::ExportRequest;
use ato_core::{Build, BuildStatus, TargetKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app_core::{reduce, AppStore, BuildSubscription, DomainEvent, SubscriptionId};
use crate::domain::{
    ManufacturingBuild, ManufacturingBuildStatus, SliceKind, WizardState, WizardStep,
};
use crate::ports::{CommandPort, ManufacturingPort};

struct Session {
    token: CancellationToken,
    subscription: SubscriptionId,
}

struct Inner<M, C> {
    store: AppStore,
    manufacturing: Arc<M>,
    commands: Arc<C>,
    default_export_directory: String,
    session: Mutex<Option<Session>>,
}

pub struct ManufacturingWizard<M, C> {
    inner: Arc<Inner<M, C>>,
}

impl<M, C> Clone for ManufacturingWizard<M, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M, C> ManufacturingWizard<M, C>
where
    M: ManufacturingPort,
    C: CommandPort,
{
    pub fn new(store: AppStore, manufacturing: Arc<M>, commands: Arc<C>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                manufacturing,
                commands,
                default_export_directory: String::new(),
                session: Mutex::new(None),
            }),
        }
    }

    /// Export directory used when a wizard opens. Empty means `<project>/manufacturing`.
    pub fn with_export_directory(
        store: AppStore,
        manufacturing: Arc<M>,
        commands: Arc<C>,
        directory: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                manufacturing,
                commands,
                default_export_directory: directory.into(),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.session.lock().unwrap().is_some()
    }

    pub fn state(&self) -> Option<WizardState> {
        self.inner.store.read(|s| s.manufacturing.clone())
    }

    // --- Lifecycle ---

    /// Opens a fresh wizard for `project_root`, replacing any open one.
    pub fn open(&self, project_root: &str) {
        self.close();

        let token = CancellationToken::new();
        let subscription = self.inner.store.subscribe_builds(Vec::new());
        let directory = if self.inner.default_export_directory.is_empty() {
            format!("{}/manufacturing", project_root.trim_end_matches('/'))
        } else {
            self.inner.default_export_directory.clone()
        };

        self.inner.store.with_state_mut(|s| {
            let mut wizard = WizardState::new(project_root, directory);
            wizard.git_status_loading = true;
            s.manufacturing = Some(wizard);
        });
        *self.inner.session.lock().unwrap() = Some(Session {
            token: token.clone(),
            subscription: subscription.id,
        });

        self.spawn_reconciler(token.clone(), subscription);
        self.spawn_git_check(token, project_root.to_string());
    }

    /// Discards all wizard state. Late async results are dropped from here on.
    pub fn close(&self) {
        let Some(session) = self.inner.session.lock().unwrap().take() else {
            return;
        };
        self.inner.store.with_state_mut(|s| {
            session.token.cancel();
            s.manufacturing = None;
        });
        self.inner.store.unsubscribe(session.subscription);
    }

    // --- Step 1 ---

    pub fn toggle_target(&self, target: &str) {
        self.mutate(|w| {
            if let Some(ix) = w.builds.iter().position(|b| b.target == target) {
                w.builds.remove(ix);
            } else {
                w.builds.push(ManufacturingBuild::new(target));
            }
        });
        self.sync_subscription();
        self.auto_build();
    }

    /// Replaces the selection. Builds kept across the change keep their status.
    pub fn select_targets(&self, targets: &[String]) {
        self.mutate(|w| {
            let mut previous = std::mem::take(&mut w.builds);
            for target in targets {
                if w.builds.iter().any(|b| &b.target == target) {
                    continue;
                }
                let build = match previous.iter().position(|b| &b.target == target) {
                    Some(ix) => previous.swap_remove(ix),
                    None => ManufacturingBuild::new(target.as_str()),
                };
                w.builds.push(build);
            }
        });
        self.sync_subscription();
        self.auto_build();
    }

    // --- Navigation ---

    pub async fn next_step(&self) -> bool {
        let Some(step) = self.inner.store.read(|s| s.manufacturing.as_ref().map(|w| w.step)) else {
            return false;
        };
        match WizardStep::from_number(step.number() + 1) {
            Some(next) => self.go_to_step(next).await,
            None => false,
        }
    }

    /// Moves to `step`. Forward moves are gated; backward moves never reset confirmations.
    pub async fn go_to_step(&self, step: WizardStep) -> bool {
        let moved = self.mutate(|w| {
            if step > w.step {
                if step >= WizardStep::BuildAndReview && w.builds.is_empty() {
                    return false;
                }
                if step == WizardStep::Export && !w.all_confirmed() {
                    return false;
                }
            }
            w.step = step;
            true
        });
        if moved != Some(true) {
            return false;
        }

        match step {
            WizardStep::BuildAndReview => self.auto_build(),
            WizardStep::Export => self.refresh_cost_estimate().await,
            WizardStep::SelectBuilds => {}
        }
        true
    }

    // --- Step 2 ---

    /// Issues one build command for every pending target, unless a build is already in flight.
    fn auto_build(&self) {
        let Some(token) = self.live_token() else {
            return;
        };
        let triggered = self.inner.store.with_state_mut(|s| {
            if token.is_cancelled() {
                return None;
            }
            let known = &s.builds.data;
            let w = s.manufacturing.as_mut()?;
            if w.step != WizardStep::BuildAndReview {
                return None;
            }
            let any_building = w
                .builds
                .iter()
                .any(|b| b.status == ManufacturingBuildStatus::Building);
            let pending: Vec<String> = w
                .builds
                .iter()
                .filter(|b| b.status == ManufacturingBuildStatus::Pending)
                .map(|b| b.target.clone())
                .collect();
            if any_building || pending.is_empty() {
                return None;
            }

            let root = w.project_root.clone();
            for build in w
                .builds
                .iter_mut()
                .filter(|b| b.status == ManufacturingBuildStatus::Pending)
            {
                // Entries already known belong to earlier builds of this target.
                let earlier: Vec<String> = known
                    .queued
                    .iter()
                    .chain(&known.history)
                    .filter(|q| {
                        q.project_root.as_deref() == Some(root.as_str())
                            && q.target_name() == build.target
                    })
                    .filter_map(|q| q.build_id.clone())
                    .collect();
                build.stale_build_ids.extend(earlier);
                build.status = ManufacturingBuildStatus::Building;
                build.build_id = None;
                build.error = None;
            }
            Some((root, pending))
        });

        if let Some((root, targets)) = triggered {
            info!("building {} target(s) for {}", targets.len(), root);
            self.inner.commands.build(&root, &targets);
        }
    }

    /// ready -> confirmed only.
    pub fn confirm(&self, target: &str) -> bool {
        self.mutate(|w| match w.build_mut(target) {
            Some(b) if b.status == ManufacturingBuildStatus::Ready => {
                b.status = ManufacturingBuildStatus::Confirmed;
                true
            }
            _ => false,
        })
        .unwrap_or(false)
    }

    /// failed -> pending, then the auto-build rule picks it up again.
    pub fn retry(&self, target: &str) -> bool {
        let reset = self
            .mutate(|w| match w.build_mut(target) {
                Some(b) if b.status == ManufacturingBuildStatus::Failed => {
                    if let Some(id) = b.build_id.take() {
                        b.stale_build_ids.push(id);
                    }
                    b.status = ManufacturingBuildStatus::Pending;
                    b.error = None;
                    b.outputs = None;
                    b.outputs_error = None;
                    true
                }
                _ => false,
            })
            .unwrap_or(false);
        if reset {
            self.auto_build();
        }
        reset
    }

    pub fn dismiss_git_warning(&self) {
        self.mutate(|w| w.git_warning_dismissed = true);
    }

    // --- Step 3 ---

    pub fn set_export_directory(&self, directory: impl Into<String>) {
        let directory = directory.into();
        self.mutate(|w| w.export_directory = directory);
    }

    pub fn toggle_file_type(&self, file_type: &str) {
        self.mutate(|w| {
            if let Some(ix) = w.export_file_types.iter().position(|t| t == file_type) {
                w.export_file_types.remove(ix);
            } else {
                w.export_file_types.push(file_type.to_string());
            }
        });
    }

    pub fn set_quantity(&self, quantity: u32) {
        let quantity = ato_config::clamp_quantity(quantity);
        self.mutate(|w| w.quantity = quantity);
    }

    /// Re-estimates cost for the confirmed targets. No confirmed targets clears the estimate.
    pub async fn refresh_cost_estimate(&self) {
        let Some(token) = self.live_token() else {
            return;
        };
        let Some((root, targets, quantity)) = self.write_if_live(&token, |w| {
            let targets = w.confirmed_targets();
            if targets.is_empty() {
                w.cost_estimate = None;
                w.cost_error = None;
                w.cost_loading = false;
                return None;
            }
            w.cost_loading = true;
            w.cost_error = None;
            Some((w.project_root.clone(), targets, w.quantity))
        })
        .flatten() else {
            return;
        };

        let result = self
            .inner
            .manufacturing
            .estimate_cost(&root, &targets, quantity)
            .await;
        self.write_if_live(&token, |w| {
            w.cost_loading = false;
            match result {
                Ok(estimate) => w.cost_estimate = Some(estimate),
                Err(e) => {
                    warn!("cost estimate failed: {:#}", e);
                    w.cost_error = Some(e.to_string());
                }
            }
        });
    }

    /// Exports the confirmed targets. A failure is kept in `export_error` and the wizard stays open.
    pub async fn export(&self) -> bool {
        let Some(token) = self.live_token() else {
            return false;
        };
        let Some(request) = self.write_if_live(&token, |w| {
            let targets = w.confirmed_targets();
            if targets.is_empty() {
                w.export_error = Some("No confirmed builds to export".to_string());
                return None;
            }
            w.exporting = true;
            w.export_error = None;
            w.export_result = None;
            Some(ExportRequest {
                project_root: w.project_root.clone(),
                targets,
                directory: w.export_directory.clone(),
                file_types: w.export_file_types.clone(),
            })
        })
        .flatten() else {
            return false;
        };

        let result = self.inner.manufacturing.export_files(&request).await;
        self.write_if_live(&token, |w| {
            w.exporting = false;
            match result {
                Ok(res) => {
                    w.export_result = Some(res);
                    true
                }
                Err(e) => {
                    warn!("export failed: {:#}", e);
                    w.export_error = Some(e.to_string());
                    false
                }
            }
        })
        .unwrap_or(false)
    }

    // --- Reconciliation ---

    fn spawn_reconciler(&self, token: CancellationToken, subscription: BuildSubscription) {
        let this = self.clone();
        let mut updates = subscription.updates;
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = updates.recv() => next,
                };
                match next {
                    Some(builds) => this.reconcile(&token, &builds),
                    None => break,
                }
            }
            debug!("wizard reconciler stopped");
        });
    }

    fn reconcile(&self, token: &CancellationToken, entries: &[Build]) {
        let ready = self
            .write_if_live(token, |w| {
                let root = w.project_root.clone();
                let mut ready = Vec::new();
                for entry in entries {
                    if entry.project_root.as_deref() != Some(root.as_str()) {
                        continue;
                    }
                    let Some(build) = w.build_mut(entry.target_name()) else {
                        continue;
                    };
                    if advance(build, entry) {
                        ready.push(TargetKey::new(root.clone(), build.target.clone()));
                    }
                }
                ready
            })
            .unwrap_or_default();

        for key in ready {
            self.spawn_ready_fetch(token.clone(), key);
        }
        // A retried target may have been waiting for the in-flight build to finish.
        self.auto_build();
    }

    /// Outputs and BOM for a target that just became ready.
    fn spawn_ready_fetch(&self, token: CancellationToken, key: TargetKey) {
        let this = self.clone();
        tokio::spawn(async move {
            let manufacturing = this.inner.manufacturing.clone();
            let (outputs, bom) =
                tokio::join!(manufacturing.build_outputs(&key), manufacturing.refresh_bom(&key));

            this.write_if_live(&token, |w| {
                if let Some(b) = w.build_mut(&key.target) {
                    match outputs {
                        Ok(o) => {
                            b.outputs = Some(o);
                            b.outputs_error = None;
                        }
                        Err(e) => {
                            warn!("fetching outputs for {} failed: {:#}", key.target, e);
                            b.outputs_error = Some(e.to_string());
                        }
                    }
                }
            });

            let event = match bom {
                Ok(Some(bom)) => DomainEvent::BomLoaded {
                    key,
                    bom: Some(bom),
                },
                Ok(None) => return,
                Err(e) => {
                    warn!("refreshing BOM for {} failed: {:#}", key.target, e);
                    DomainEvent::SliceError {
                        kind: SliceKind::Bom(key),
                        message: Some(e.to_string()),
                    }
                }
            };
            this.inner.store.with_state_mut(|s| {
                if !token.is_cancelled() {
                    reduce(s, event);
                }
            });
        });
    }

    fn spawn_git_check(&self, token: CancellationToken, project_root: String) {
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.inner.manufacturing.git_status(&project_root).await;
            this.write_if_live(&token, |w| {
                w.git_status_loading = false;
                match result {
                    Ok(status) => w.git_status = Some(status),
                    Err(e) => warn!("git status check failed: {:#}", e),
                }
            });
        });
    }

    // --- Helpers ---

    fn live_token(&self) -> Option<CancellationToken> {
        self.inner
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.token.clone())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut WizardState) -> R) -> Option<R> {
        let token = self.live_token()?;
        self.write_if_live(&token, f)
    }

    fn write_if_live<R>(
        &self,
        token: &CancellationToken,
        f: impl FnOnce(&mut WizardState) -> R,
    ) -> Option<R> {
        self.inner.store.with_state_mut(|s| {
            if token.is_cancelled() {
                return None;
            }
            s.manufacturing.as_mut().map(f)
        })
    }

    fn sync_subscription(&self) {
        let Some(subscription) = self
            .inner
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.subscription)
        else {
            return;
        };
        let keys = self
            .inner
            .store
            .read(|s| s.manufacturing.as_ref().map(WizardState::target_keys))
            .unwrap_or_default();
        self.inner.store.update_subscription(subscription, keys);
    }
}

/// Folds one build entry into a wizard build. Returns `true` when it just became ready.
///
/// Status only moves forward. Updates for stale build ids, for a build id other
/// than the pinned one, or that would move a pending build anywhere but
/// building are ignored.
fn advance(build: &mut ManufacturingBuild, entry: &Build) -> bool {
    if build.status.rank() >= ManufacturingBuildStatus::Ready.rank() {
        return false;
    }
    if let Some(id) = &entry.build_id {
        if build.stale_build_ids.contains(id) {
            return false;
        }
        if build.build_id.as_ref().is_some_and(|pinned| pinned != id) {
            return false;
        }
    }

    let next = match entry.status {
        BuildStatus::Queued | BuildStatus::Building => ManufacturingBuildStatus::Building,
        BuildStatus::Success | BuildStatus::Warning => ManufacturingBuildStatus::Ready,
        BuildStatus::Failed | BuildStatus::Cancelled => ManufacturingBuildStatus::Failed,
    };
    if build.status == ManufacturingBuildStatus::Pending && next != ManufacturingBuildStatus::Building
    {
        return false;
    }

    if build.build_id.is_none() {
        build.build_id = entry.build_id.clone();
    }
    build.status = next;
    match next {
        ManufacturingBuildStatus::Ready => {
            build.error = None;
            true
        }
        ManufacturingBuildStatus::Failed => {
            build.error = Some(entry.error.clone().unwrap_or_else(|| {
                if entry.status == BuildStatus::Cancelled {
                    "Build cancelled".to_string()
                } else {
                    "Build failed".to_string()
                }
            }));
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(target: &str, id: &str, status: BuildStatus) -> Build {
        Build {
            name: target.into(),
            target: Some(target.into()),
            project_root: Some("/p".into()),
            build_id: Some(id.into()),
            status,
            ..Default::default()
        }
    }

    fn building(target: &str) -> ManufacturingBuild {
        ManufacturingBuild {
            status: ManufacturingBuildStatus::Building,
            ..ManufacturingBuild::new(target)
        }
    }

    #[test]
    fn first_id_seen_while_building_is_pinned() {
        let mut b = building("a");
        assert!(!advance(&mut b, &entry("a", "one", BuildStatus::Building)));
        assert_eq!(b.build_id.as_deref(), Some("one"));

        assert!(!advance(&mut b, &entry("a", "two", BuildStatus::Success)));
        assert_eq!(b.status, ManufacturingBuildStatus::Building);

        assert!(advance(&mut b, &entry("a", "one", BuildStatus::Warning)));
        assert_eq!(b.status, ManufacturingBuildStatus::Ready);
    }

    #[test]
    fn never_regresses_from_ready() {
        let mut b = building("a");
        assert!(advance(&mut b, &entry("a", "one", BuildStatus::Success)));
        assert!(!advance(&mut b, &entry("a", "one", BuildStatus::Building)));
        assert!(!advance(&mut b, &entry("a", "one", BuildStatus::Failed)));
        assert_eq!(b.status, ManufacturingBuildStatus::Ready);
    }

    #[test]
    fn pending_only_moves_to_building() {
        let mut b = ManufacturingBuild::new("a");
        assert!(!advance(&mut b, &entry("a", "old", BuildStatus::Success)));
        assert_eq!(b.status, ManufacturingBuildStatus::Pending);
        assert_eq!(b.build_id, None);

        advance(&mut b, &entry("a", "new", BuildStatus::Queued));
        assert_eq!(b.status, ManufacturingBuildStatus::Building);
    }

    #[test]
    fn stale_ids_are_ignored_and_failures_carry_a_message() {
        let mut b = building("a");
        b.stale_build_ids.push("old".into());
        assert!(!advance(&mut b, &entry("a", "old", BuildStatus::Failed)));
        assert_eq!(b.status, ManufacturingBuildStatus::Building);

        assert!(!advance(&mut b, &entry("a", "new", BuildStatus::Cancelled)));
        assert_eq!(b.status, ManufacturingBuildStatus::Failed);
        assert_eq!(b.error.as_deref(), Some("Build cancelled"));
    }
}
