use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the installer and the service manager.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Unit file not found: {}", .0.display())]
    MissingUnitFile(PathBuf),

    #[error("Permission denied: {0}. Re-run with sudo.")]
    PermissionDenied(String),

    #[error("systemd rejected unit {unit}: {reason}")]
    UnitRejected { unit: String, reason: String },

    #[error("Service {service} failed to start: {reason}")]
    StartFailed { service: String, reason: String },

    #[error("Failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl InstallError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::MissingUnitFile(_) => 2,
            InstallError::PermissionDenied(_) => 3,
            InstallError::UnitRejected { .. } => 4,
            InstallError::StartFailed { .. } => 5,
            InstallError::Command { .. } => 6,
            InstallError::CommandFailed { .. } => 7,
            InstallError::Io(_) => 8,
            InstallError::Config(_) => 9,
        }
    }
}

pub type Result<T> = std::result::Result<T, InstallError>;
