use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::normalize_keys;

/// Backend-pushed notification names.
///
/// Unknown names are kept verbatim so newer backends never break older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    // Data state changes - client should refetch
    ProjectsChanged,
    PackagesChanged,
    StdlibChanged,
    BomChanged,
    VariablesChanged,
    BuildsChanged,
    ProblemsChanged,

    // File watcher notifications
    ProjectFilesChanged,
    ProjectModulesChanged,
    ProjectDependenciesChanged,

    // Configuration changes
    AtopileConfigChanged,

    // Shared UI state
    LogViewCurrentIdChanged,

    // Open requests
    OpenLayout,
    OpenKicad,
    Open3d,

    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::ProjectsChanged => "projects_changed",
            EventType::PackagesChanged => "packages_changed",
            EventType::StdlibChanged => "stdlib_changed",
            EventType::BomChanged => "bom_changed",
            EventType::VariablesChanged => "variables_changed",
            EventType::BuildsChanged => "builds_changed",
            EventType::ProblemsChanged => "problems_changed",
            EventType::ProjectFilesChanged => "project_files_changed",
            EventType::ProjectModulesChanged => "project_modules_changed",
            EventType::ProjectDependenciesChanged => "project_dependencies_changed",
            EventType::AtopileConfigChanged => "atopile_config_changed",
            EventType::LogViewCurrentIdChanged => "log_view_current_id_changed",
            EventType::OpenLayout => "open_layout",
            EventType::OpenKicad => "open_kicad",
            EventType::Open3d => "open_3d",
            EventType::Unknown(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "projects_changed" => EventType::ProjectsChanged,
            "packages_changed" => EventType::PackagesChanged,
            "stdlib_changed" => EventType::StdlibChanged,
            "bom_changed" => EventType::BomChanged,
            "variables_changed" => EventType::VariablesChanged,
            "builds_changed" => EventType::BuildsChanged,
            "problems_changed" => EventType::ProblemsChanged,
            "project_files_changed" => EventType::ProjectFilesChanged,
            "project_modules_changed" => EventType::ProjectModulesChanged,
            "project_dependencies_changed" => EventType::ProjectDependenciesChanged,
            "atopile_config_changed" => EventType::AtopileConfigChanged,
            "log_view_current_id_changed" => EventType::LogViewCurrentIdChanged,
            "open_layout" => EventType::OpenLayout,
            "open_kicad" => EventType::OpenKicad,
            "open_3d" => EventType::Open3d,
            other => EventType::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Unknown(_))
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        EventType::parse(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged backend notification. Re-applying the same event must be harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: EventType,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl Event {
    pub fn new(event: EventType, data: Option<Map<String, Value>>) -> Self {
        Self { event, data }
    }

    /// Same event with its payload keys rewritten to camelCase.
    pub fn normalized(self) -> Self {
        Self {
            event: self.event,
            data: self.data.map(normalize_keys),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// Inline `error` carried by the payload, if the backend already knows the operation failed.
    pub fn inline_error(&self) -> Option<&str> {
        self.str_field("error").filter(|e| !e.is_empty())
    }
}
