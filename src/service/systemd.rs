use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use super::{ServiceManager, ServiceStatus};
use crate::error::{InstallError, Result};

const SYSTEMCTL: &str = "systemctl";

const STATUS_PROPERTIES: &str = "--property=ActiveState,SubState,UnitFileState";

const PERMISSION_MARKERS: [&str; 4] = [
    "Access denied",
    "Permission denied",
    "Interactive authentication required",
    "Operation not permitted",
];

/// systemd-backed service manager
#[derive(Debug, Clone)]
pub struct Systemctl {
    unit_dir: PathBuf,
    program: String,
}

impl Systemctl {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            program: SYSTEMCTL.to_string(),
        }
    }

    /// Use another binary in place of `systemctl`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn unit_dir(&self) -> &Path {
        &self.unit_dir
    }

    async fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("> {} {}", self.program, args.join(" "));

        Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| InstallError::Command {
                program: self.program.clone(),
                source,
            })
    }

    /// Run a command, turning a non-zero exit into the error built by `on_failure`.
    /// Permission failures are always reported as `PermissionDenied`.
    async fn run<F>(&self, args: &[&str], on_failure: F) -> Result<()>
    where
        F: FnOnce(String) -> InstallError,
    {
        let output = self.output(args).await?;
        if output.status.success() {
            return Ok(());
        }

        let reason = failure_reason(&output);
        if is_permission_denied(&reason) {
            return Err(InstallError::PermissionDenied(format!(
                "{} {}: {}",
                self.program,
                args.join(" "),
                reason
            )));
        }

        Err(on_failure(reason))
    }

    fn command_failed(&self, args: &[&str], reason: String) -> InstallError {
        InstallError::CommandFailed {
            command: format!("{} {}", self.program, args.join(" ")),
            reason,
        }
    }
}

impl ServiceManager for Systemctl {
    async fn copy_unit_file(&self, source: &Path) -> Result<PathBuf> {
        copy_unit_file(source, &self.unit_dir).await
    }

    async fn reload_definitions(&self) -> Result<()> {
        self.run(&["daemon-reload"], |reason| InstallError::UnitRejected {
            unit: "daemon-reload".to_string(),
            reason,
        })
        .await
    }

    async fn enable(&self, service: &str) -> Result<()> {
        self.run(&["enable", service], |reason| InstallError::UnitRejected {
            unit: service.to_string(),
            reason,
        })
        .await
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.run(&["start", service], |reason| InstallError::StartFailed {
            service: service.to_string(),
            reason,
        })
        .await
    }

    async fn query_status(&self, service: &str) -> Result<ServiceStatus> {
        let show_args = ["show", service, STATUS_PROPERTIES, "--no-pager"];
        let output = self.output(&show_args).await?;
        if !output.status.success() {
            let reason = failure_reason(&output);
            if is_permission_denied(&reason) {
                return Err(InstallError::PermissionDenied(reason));
            }
            return Err(self.command_failed(&show_args, reason));
        }

        let mut status =
            ServiceStatus::from_properties(service, &String::from_utf8_lossy(&output.stdout));

        // `systemctl status` exits 3 for inactive units; its text is wanted either way
        let output = self.output(&["status", service, "--no-pager"]).await?;
        let mut raw = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !raw.is_empty() && !raw.ends_with('\n') {
                raw.push('\n');
            }
            raw.push_str(stderr.trim_end());
        }
        status.raw = raw;

        Ok(status)
    }

    async fn stop(&self, service: &str) -> Result<()> {
        let args = ["stop", service];
        self.run(&args, |reason| self.command_failed(&args, reason)).await
    }

    async fn restart(&self, service: &str) -> Result<()> {
        self.run(&["restart", service], |reason| InstallError::StartFailed {
            service: service.to_string(),
            reason,
        })
        .await
    }

    async fn disable(&self, service: &str) -> Result<()> {
        let args = ["disable", service];
        self.run(&args, |reason| self.command_failed(&args, reason)).await
    }

    async fn remove_unit_file(&self, file_name: &str) -> Result<bool> {
        let path = self.unit_dir.join(file_name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(
                InstallError::PermissionDenied(format!("cannot remove {}", path.display())),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy `source` into `unit_dir`, overwriting any file of the same name.
pub async fn copy_unit_file(source: &Path, unit_dir: &Path) -> Result<PathBuf> {
    match fs::metadata(source).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(InstallError::MissingUnitFile(source.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(InstallError::MissingUnitFile(source.to_path_buf()));
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(InstallError::PermissionDenied(format!(
                "cannot read {}",
                source.display()
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| InstallError::MissingUnitFile(source.to_path_buf()))?;
    let destination = unit_dir.join(file_name);

    debug!("Copying {:?} -> {:?}", source, destination);
    fs::copy(source, &destination).await.map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            InstallError::PermissionDenied(format!("cannot write {}", destination.display()))
        } else {
            InstallError::Io(e)
        }
    })?;

    Ok(destination)
}

fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit code {:?}", output.status.code())
    } else {
        stderr.to_string()
    }
}

fn is_permission_denied(stderr: &str) -> bool {
    PERMISSION_MARKERS.iter().any(|marker| stderr.contains(marker))
}
