use async_trait::async_trait;

use ato_core::manufacturing::{
    BuildOutputs, CostEstimate, ExportRequest, ExportResult, GitStatus,
};
use ato_core::{
    BomData, Build, DependencyInfo, FileTreeNode, ModuleDefinition, PackageInfo, Problem,
    Project, StdLibItem, TargetKey, VariablesData,
};

use crate::domain::ClientSettings;

/// Read-only queries against the backend.
#[async_trait]
pub trait QueryPort: Send + Sync + 'static {
    async fn projects(&self) -> anyhow::Result<Vec<Project>>;
    async fn builds_history(&self) -> anyhow::Result<Vec<Build>>;
    async fn builds_active(&self) -> anyhow::Result<Vec<Build>>;
    async fn packages(&self) -> anyhow::Result<Vec<PackageInfo>>;
    async fn stdlib(&self) -> anyhow::Result<Vec<StdLibItem>>;
    async fn problems(&self, developer_mode: bool) -> anyhow::Result<Vec<Problem>>;
    async fn files(&self, project_root: &str) -> anyhow::Result<Vec<FileTreeNode>>;
    async fn modules(&self, project_root: &str) -> anyhow::Result<Vec<ModuleDefinition>>;
    async fn dependencies(&self, project_root: &str) -> anyhow::Result<Vec<DependencyInfo>>;
    /// `None` when the target has no BOM yet.
    async fn bom(&self, key: &TargetKey) -> anyhow::Result<Option<BomData>>;
    async fn variables(&self, key: &TargetKey) -> anyhow::Result<Option<VariablesData>>;
}

/// Wizard-scoped request/response actions.
#[async_trait]
pub trait ManufacturingPort: Send + Sync + 'static {
    async fn git_status(&self, project_root: &str) -> anyhow::Result<GitStatus>;
    async fn build_outputs(&self, key: &TargetKey) -> anyhow::Result<BuildOutputs>;
    async fn refresh_bom(&self, key: &TargetKey) -> anyhow::Result<Option<BomData>>;
    async fn estimate_cost(
        &self,
        project_root: &str,
        targets: &[String],
        quantity: u32,
    ) -> anyhow::Result<CostEstimate>;
    async fn export_files(&self, request: &ExportRequest) -> anyhow::Result<ExportResult>;
}

/// One-way commands. Their outcome is only observed through later events.
pub trait CommandPort: Send + Sync + 'static {
    fn build(&self, project_root: &str, targets: &[String]);
}

pub trait SettingsRepo: Send + Sync + 'static {
    fn load(&self) -> anyhow::Result<ClientSettings>;
    fn save(&self, settings: &ClientSettings) -> anyhow::Result<()>;
}
