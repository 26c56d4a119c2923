use anyhow::{bail, Result};
use ato_app_core::persistence::FileSettingsRepo;
use ato_app_core::{ClientSettings, SettingsRepo};

/// Fields to change; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub backend_addr: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub developer_mode: Option<bool>,
    pub export_directory: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.backend_addr.is_none()
            && self.request_timeout_ms.is_none()
            && self.developer_mode.is_none()
            && self.export_directory.is_none()
    }
}

pub struct SettingsManager<R = FileSettingsRepo> {
    repo: R,
}

impl SettingsManager {
    pub fn new() -> Self {
        Self {
            repo: FileSettingsRepo::new(),
        }
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SettingsRepo> SettingsManager<R> {
    pub fn with_repo(repo: R) -> Self {
        Self { repo }
    }

    pub fn load(&self) -> Result<ClientSettings> {
        self.repo.load()
    }

    pub fn apply(&self, update: SettingsUpdate) -> Result<ClientSettings> {
        if update.is_empty() {
            bail!("Nothing to change");
        }
        let mut settings = self.repo.load()?;
        if let Some(addr) = update.backend_addr {
            if addr.trim().is_empty() {
                bail!("Backend address cannot be empty");
            }
            settings.backend_addr = addr.trim().to_string();
        }
        if let Some(ms) = update.request_timeout_ms {
            settings.request_timeout_ms = ato_config::clamp_request_timeout(ms);
        }
        if let Some(on) = update.developer_mode {
            settings.developer_mode = on;
        }
        if let Some(dir) = update.export_directory {
            settings.export_directory = dir;
        }
        self.repo.save(&settings)?;
        Ok(settings)
    }
}

pub fn handle_show(manager: &SettingsManager<impl SettingsRepo>) -> Result<()> {
    let settings = manager.load()?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub fn handle_set(manager: &SettingsManager<impl SettingsRepo>, update: SettingsUpdate) -> Result<()> {
    let settings = manager.apply(update)?;
    println!(":: Saved settings (backend {})", settings.backend_addr);
    Ok(())
}
