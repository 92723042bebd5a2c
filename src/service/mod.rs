mod systemd;

pub use systemd::{Systemctl, copy_unit_file};

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Snapshot of a unit as reported by the init system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,

    /// `ActiveState`, e.g. "active", "inactive", "failed"
    pub active_state: String,

    /// `SubState`, e.g. "running", "dead"
    pub sub_state: String,

    /// `UnitFileState`, e.g. "enabled", "disabled"
    pub unit_file_state: String,

    /// Human-readable status text for the operator
    pub raw: String,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        self.active_state == "active"
    }

    pub fn is_enabled(&self) -> bool {
        self.unit_file_state == "enabled"
    }

    /// Parse `systemctl show --property=...` output (`Key=Value` lines)
    pub fn from_properties(name: &str, properties: &str) -> Self {
        let mut status = ServiceStatus {
            name: name.to_string(),
            ..Default::default()
        };

        for line in properties.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim() {
                "ActiveState" => status.active_state = value,
                "SubState" => status.sub_state = value,
                "UnitFileState" => status.unit_file_state = value,
                _ => {}
            }
        }

        status
    }
}

/// Operations the installer needs from the host init system.
///
/// `Systemctl` talks to the real systemd; tests swap in a fake.
#[allow(async_fn_in_trait)]
pub trait ServiceManager {
    /// Copy a unit file into the unit directory, returning the installed path.
    /// Existing files are overwritten.
    async fn copy_unit_file(&self, source: &Path) -> Result<PathBuf>;

    async fn reload_definitions(&self) -> Result<()>;

    async fn enable(&self, service: &str) -> Result<()>;

    async fn start(&self, service: &str) -> Result<()>;

    async fn query_status(&self, service: &str) -> Result<ServiceStatus>;

    async fn stop(&self, service: &str) -> Result<()>;

    async fn restart(&self, service: &str) -> Result<()>;

    async fn disable(&self, service: &str) -> Result<()>;

    /// Remove an installed unit file. Returns false if it was not there.
    async fn remove_unit_file(&self, file_name: &str) -> Result<bool>;
}
