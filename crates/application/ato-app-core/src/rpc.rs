use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use ato_core::manufacturing::{
    BuildOutputs, CostEstimate, ExportRequest, ExportResult, GitStatus,
};
use ato_core::normalize::normalize_value;
use ato_core::{
    BomData, Build, DependencyInfo, FileTreeNode, ModuleDefinition, PackageInfo, Problem,
    Project, StdLibItem, TargetKey, VariablesData,
};
use ato_infra::Transport;

use crate::ports::{CommandPort, ManufacturingPort, QueryPort};

/// Backend ports implemented as request/response calls over the transport.
#[derive(Clone)]
pub struct RpcBackend {
    transport: Transport,
}

impl RpcBackend {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Raw request. A `{success: false, error}` body becomes an error carrying the backend message.
    /// Successful bodies come back with camelCase keys at every depth.
    pub async fn call(&self, action: &str, params: Map<String, Value>) -> anyhow::Result<Value> {
        let value = self.transport.send_with_response(action, params).await?;
        if let Some(obj) = value.as_object() {
            if obj.get("success").and_then(Value::as_bool) == Some(false) {
                let message = obj
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("request failed");
                bail!("{message}");
            }
        }
        Ok(normalize_value(value))
    }

    async fn fetch<T>(&self, action: &str, params: Value, key: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let value = self.call(action, into_params(params)).await?;
        unwrap_payload(value, key).with_context(|| format!("malformed {action} response"))
    }

    async fn fetch_optional<T>(
        &self,
        action: &str,
        params: Value,
        key: &str,
    ) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let value = self.call(action, into_params(params)).await?;
        optional_payload(value, key).with_context(|| format!("malformed {action} response"))
    }
}

fn into_params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Accepts both `{key: payload}` and a bare payload.
fn unwrap_payload<T>(value: Value, key: &str) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    let inner = match value {
        Value::Object(mut obj) if obj.contains_key(key) => obj.remove(key).unwrap_or(Value::Null),
        other => other,
    };
    if inner.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(inner)
}

/// Like [`unwrap_payload`], but a body holding only status keys means "nothing there".
fn optional_payload<T>(value: Value, key: &str) -> Result<Option<T>, serde_json::Error>
where
    T: DeserializeOwned,
{
    match value {
        Value::Object(mut obj) => {
            if let Some(inner) = obj.remove(key) {
                return serde_json::from_value(inner);
            }
            let has_payload = obj
                .keys()
                .any(|k| !matches!(k.as_str(), "success" | "info" | "error" | "message"));
            if !has_payload {
                return Ok(None);
            }
            serde_json::from_value(Value::Object(obj)).map(Some)
        }
        Value::Null => Ok(None),
        other => serde_json::from_value(other).map(Some),
    }
}

#[async_trait]
impl QueryPort for RpcBackend {
    async fn projects(&self) -> anyhow::Result<Vec<Project>> {
        self.fetch("projects.list", json!({}), "projects").await
    }

    async fn builds_history(&self) -> anyhow::Result<Vec<Build>> {
        self.fetch("builds.history", json!({}), "builds").await
    }

    async fn builds_active(&self) -> anyhow::Result<Vec<Build>> {
        self.fetch("builds.active", json!({}), "builds").await
    }

    async fn packages(&self) -> anyhow::Result<Vec<PackageInfo>> {
        self.fetch("packages.summary", json!({}), "packages").await
    }

    async fn stdlib(&self) -> anyhow::Result<Vec<StdLibItem>> {
        self.fetch("stdlib.list", json!({}), "items").await
    }

    async fn problems(&self, developer_mode: bool) -> anyhow::Result<Vec<Problem>> {
        self.fetch(
            "problems.list",
            json!({ "developerMode": developer_mode }),
            "problems",
        )
        .await
    }

    async fn files(&self, project_root: &str) -> anyhow::Result<Vec<FileTreeNode>> {
        self.fetch("files.list", json!({ "projectRoot": project_root }), "files")
            .await
    }

    async fn modules(&self, project_root: &str) -> anyhow::Result<Vec<ModuleDefinition>> {
        self.fetch("modules.list", json!({ "projectRoot": project_root }), "modules")
            .await
    }

    async fn dependencies(&self, project_root: &str) -> anyhow::Result<Vec<DependencyInfo>> {
        self.fetch(
            "dependencies.list",
            json!({ "projectRoot": project_root }),
            "dependencies",
        )
        .await
    }

    async fn bom(&self, key: &TargetKey) -> anyhow::Result<Option<BomData>> {
        self.fetch_optional(
            "bom.get",
            json!({ "projectRoot": key.project_root, "targetName": key.target }),
            "bom",
        )
        .await
    }

    async fn variables(&self, key: &TargetKey) -> anyhow::Result<Option<VariablesData>> {
        self.fetch_optional(
            "variables.get",
            json!({ "projectRoot": key.project_root, "targetName": key.target }),
            "variables",
        )
        .await
    }
}

#[async_trait]
impl ManufacturingPort for RpcBackend {
    async fn git_status(&self, project_root: &str) -> anyhow::Result<GitStatus> {
        self.fetch(
            "getManufacturingGitStatus",
            json!({ "projectRoot": project_root }),
            "gitStatus",
        )
        .await
    }

    async fn build_outputs(&self, key: &TargetKey) -> anyhow::Result<BuildOutputs> {
        self.fetch(
            "getManufacturingOutputs",
            json!({ "projectRoot": key.project_root, "target": key.target }),
            "outputs",
        )
        .await
    }

    async fn refresh_bom(&self, key: &TargetKey) -> anyhow::Result<Option<BomData>> {
        self.fetch_optional(
            "refreshBOM",
            json!({ "projectRoot": key.project_root, "target": key.target }),
            "bom",
        )
        .await
    }

    async fn estimate_cost(
        &self,
        project_root: &str,
        targets: &[String],
        quantity: u32,
    ) -> anyhow::Result<CostEstimate> {
        self.fetch(
            "estimateManufacturingCost",
            json!({ "projectRoot": project_root, "targets": targets, "quantity": quantity }),
            "estimate",
        )
        .await
    }

    async fn export_files(&self, request: &ExportRequest) -> anyhow::Result<ExportResult> {
        let params = serde_json::to_value(request)?;
        let value = self.call("exportManufacturingFiles", into_params(params)).await?;
        unwrap_payload(value, "result").context("malformed exportManufacturingFiles response")
    }
}

impl CommandPort for RpcBackend {
    fn build(&self, project_root: &str, targets: &[String]) {
        self.transport.send_action(
            "build",
            into_params(json!({ "projectRoot": project_root, "targets": targets })),
        );
    }
}
