use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::domain::ClientSettings;
use crate::ports::SettingsRepo;

const QUALIFIER: &str = "dev";
const ORG: &str = "atopile";
const APP: &str = "ato-client";

/// JSON settings file under the platform config directory.
pub struct FileSettingsRepo {
    dir: Option<PathBuf>,
}

impl Default for FileSettingsRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSettingsRepo {
    pub fn new() -> Self {
        Self { dir: None }
    }

    /// Stores settings under `dir` instead of the platform config directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    fn config_dir(&self) -> Result<PathBuf> {
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from(QUALIFIER, ORG, APP)
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
                .config_dir()
                .to_path_buf(),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    pub fn settings_path(&self) -> Result<PathBuf> {
        Ok(self.config_dir()?.join("settings.json"))
    }
}

impl SettingsRepo for FileSettingsRepo {
    fn load(&self) -> Result<ClientSettings> {
        let path = self.settings_path()?;
        if !path.exists() {
            return Ok(ClientSettings::default());
        }
        let content = fs::read_to_string(&path).context("Failed to read settings")?;
        let mut settings: ClientSettings =
            serde_json::from_str(&content).context("Failed to parse settings")?;
        settings.request_timeout_ms = ato_config::clamp_request_timeout(settings.request_timeout_ms);
        Ok(settings)
    }

    fn save(&self, settings: &ClientSettings) -> Result<()> {
        let path = self.settings_path()?;
        let json = serde_json::to_string_pretty(settings)?;
        atomic_write(&path, json.as_bytes()).context("Failed to write settings")?;
        Ok(())
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    };

    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file {}", tmp_path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("Failed to write temp file {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync temp file {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to rename temp file {} to {}",
            tmp_path.display(),
            path.display()
        )
    })
}
