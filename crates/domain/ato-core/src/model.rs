use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overall status of a build as reported by the build queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    #[default]
    Queued,
    Building,
    Success,
    Warning,
    Failed,
    Cancelled,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::Warning | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Build {
    pub name: String,
    pub display_name: String,
    pub project_name: Option<String>,
    pub build_id: Option<String>,

    pub status: BuildStatus,
    pub elapsed_seconds: f64,
    pub warnings: u32,
    pub errors: u32,
    pub return_code: Option<i32>,
    pub error: Option<String>,

    pub project_root: Option<String>,
    pub target: Option<String>,
    pub entry: Option<String>,
    pub started_at: Option<f64>,
    pub timestamp: Option<String>,

    pub stages: Vec<Value>,
    pub total_stages: Option<u32>,
    pub queue_position: Option<u32>,
}

impl Build {
    /// Target name, falling back to the build name for entries that omit `target`.
    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildTarget {
    pub name: String,
    pub entry: String,
    pub root: String,
    pub last_build: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub root: String,
    pub name: String,
    pub targets: Vec<BuildTarget>,
    pub display_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInfo {
    pub identifier: String,
    pub name: String,
    pub publisher: String,
    pub version: Option<String>,
    pub latest_version: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
    pub license: Option<String>,
    pub installed: bool,
    pub installed_in: Vec<String>,
    pub has_update: bool,
    pub downloads: Option<u64>,
    pub version_count: Option<u32>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemLevel {
    #[default]
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Problem {
    pub id: String,
    pub level: ProblemLevel,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub stage: Option<String>,
    pub logger: Option<String>,
    pub build_name: Option<String>,
    pub project_name: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StdLibItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub description: String,
    pub usage: Option<String>,
    pub children: Vec<Value>,
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileTreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub extension: Option<String>,
    pub children: Option<Vec<FileTreeNode>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub file: String,
    pub entry: String,
    pub line: Option<u32>,
    pub super_type: Option<String>,
    pub children: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DependencyInfo {
    pub identifier: String,
    pub version: String,
    pub latest_version: Option<String>,
    pub name: String,
    pub publisher: String,
    pub repository: Option<String>,
    pub has_update: bool,
    pub is_direct: bool,
    pub via: Option<Vec<String>>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BomComponent {
    pub id: String,
    pub lcsc: Option<String>,
    pub manufacturer: Option<String>,
    pub mpn: Option<String>,
    #[serde(rename = "type")]
    pub component_type: String,
    pub value: String,
    pub package: String,
    pub description: Option<String>,
    pub quantity: u32,
    pub unit_cost: Option<f64>,
    pub stock: Option<i64>,
    pub source: String,
    pub parameters: Vec<Value>,
    pub usages: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BomData {
    pub version: String,
    pub components: Vec<BomComponent>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariablesData {
    pub version: String,
    pub nodes: Vec<Value>,
}
