pub mod config;
pub mod error;
pub mod hints;
pub mod installer;
pub mod logs;
pub mod service;

pub use config::{FailurePolicy, InstallerConfig, PrivilegePolicy};
pub use error::{InstallError, Result};
pub use installer::{InstallReport, Installer, Step};
pub use service::{ServiceManager, ServiceStatus, Systemctl};
