//! Atopile tool-chain configuration and the partial patch carried by
//! `atopile_config_changed`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallProgress {
    pub message: String,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectedInstallation {
    pub path: String,
    pub version: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtopileConfig {
    pub actual_version: Option<String>,
    pub actual_source: Option<String>,
    pub actual_binary_path: Option<String>,
    /// `release`, `branch` or `local`.
    pub source: String,
    pub current_version: String,
    pub branch: Option<String>,
    pub local_path: Option<String>,
    pub available_versions: Vec<String>,
    pub available_branches: Vec<String>,
    pub detected_installations: Vec<DetectedInstallation>,
    pub is_installing: bool,
    pub install_progress: Option<InstallProgress>,
    pub error: Option<String>,
}

impl Default for AtopileConfig {
    fn default() -> Self {
        Self {
            actual_version: None,
            actual_source: None,
            actual_binary_path: None,
            source: "release".to_string(),
            current_version: String::new(),
            branch: None,
            local_path: None,
            available_versions: Vec::new(),
            available_branches: Vec::new(),
            detected_installations: Vec::new(),
            is_installing: false,
            install_progress: None,
            error: None,
        }
    }
}

/// Distinguishes an absent key (`None`) from an explicit `null` (`Some(None)`).
fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Partial update to [`AtopileConfig`]. Expects camelCase keys (see [`crate::normalize`]).
///
/// Absent fields leave the current value alone. For nullable fields an explicit
/// `null` clears the value; for the rest `null` is treated as absent.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtopileConfigPatch {
    #[serde(deserialize_with = "present")]
    pub actual_version: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub actual_source: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub actual_binary_path: Option<Option<String>>,
    pub source: Option<String>,
    pub current_version: Option<String>,
    #[serde(deserialize_with = "present")]
    pub branch: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub local_path: Option<Option<String>>,
    pub available_versions: Option<Vec<String>>,
    pub available_branches: Option<Vec<String>>,
    pub detected_installations: Option<Vec<DetectedInstallation>>,
    pub is_installing: Option<bool>,
    #[serde(deserialize_with = "present")]
    pub install_progress: Option<Option<InstallProgress>>,
    #[serde(deserialize_with = "present")]
    pub error: Option<Option<String>>,
}

impl AtopileConfigPatch {
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map.clone()))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(self, cfg: &mut AtopileConfig) {
        if let Some(v) = self.actual_version {
            cfg.actual_version = v;
        }
        if let Some(v) = self.actual_source {
            cfg.actual_source = v;
        }
        if let Some(v) = self.actual_binary_path {
            cfg.actual_binary_path = v;
        }
        if let Some(v) = self.source {
            cfg.source = v;
        }
        if let Some(v) = self.current_version {
            cfg.current_version = v;
        }
        if let Some(v) = self.branch {
            cfg.branch = v;
        }
        if let Some(v) = self.local_path {
            cfg.local_path = v;
        }
        if let Some(v) = self.available_versions {
            cfg.available_versions = v;
        }
        if let Some(v) = self.available_branches {
            cfg.available_branches = v;
        }
        if let Some(v) = self.detected_installations {
            cfg.detected_installations = v;
        }
        if let Some(v) = self.is_installing {
            cfg.is_installing = v;
            if !v {
                cfg.install_progress = None;
            }
        }
        if let Some(v) = self.install_progress {
            cfg.install_progress = v;
        }
        if let Some(v) = self.error {
            cfg.error = v;
        }
    }
}
