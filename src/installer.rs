use std::fmt;
use std::path::PathBuf;

use nix::unistd::Uid;
use tracing::{info, warn};

use crate::config::{FailurePolicy, InstallerConfig, PrivilegePolicy};
use crate::error::{InstallError, Result};
use crate::hints;
use crate::service::{ServiceManager, ServiceStatus};

/// Install steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CopyUnit,
    Reload,
    Enable,
    Start,
    Status,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::CopyUnit,
        Step::Reload,
        Step::Enable,
        Step::Start,
        Step::Status,
    ];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CopyUnit => "copy unit file",
            Step::Reload => "reload systemd",
            Step::Enable => "enable service",
            Step::Start => "start service",
            Step::Status => "query status",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct StepOutcome {
    pub step: Step,
    pub error: Option<InstallError>,
}

/// What happened during an install run
#[derive(Debug, Default)]
pub struct InstallReport {
    pub outcomes: Vec<StepOutcome>,
    pub destination: Option<PathBuf>,
    pub status: Option<ServiceStatus>,
}

impl InstallReport {
    pub fn steps_run(&self) -> Vec<Step> {
        self.outcomes.iter().map(|o| o.step).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Error of the last step run, which decides the exit status when
    /// failures are tolerated.
    pub fn last_error(&self) -> Option<&InstallError> {
        self.outcomes.last().and_then(|o| o.error.as_ref())
    }
}

/// Drives a `ServiceManager` through the install sequence
pub struct Installer<M> {
    manager: M,
    config: InstallerConfig,
    privileged: bool,
}

impl<M: ServiceManager> Installer<M> {
    pub fn new(manager: M, config: InstallerConfig) -> Self {
        Self {
            manager,
            config,
            privileged: Uid::effective().is_root(),
        }
    }

    /// Override the detected root status
    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    fn check_privilege(&self, action: &str) -> Result<()> {
        if self.config.privilege_policy == PrivilegePolicy::Require && !self.privileged {
            return Err(InstallError::PermissionDenied(format!(
                "{} requires root",
                action
            )));
        }
        Ok(())
    }

    /// Copy, reload, enable, start and report status.
    ///
    /// With `FailurePolicy::Abort` the first failing step is returned as the
    /// error. With `FailurePolicy::Continue` every step runs and failures are
    /// recorded in the report.
    pub async fn install(&self) -> Result<InstallReport> {
        self.config.validate()?;
        self.check_privilege("installing a system service")?;

        let service = &self.config.service;
        info!(
            "Installing {} from {:?} into {:?}",
            service, self.config.unit_file, self.config.unit_dir
        );

        let mut report = InstallReport::default();

        for step in Step::ALL {
            info!("Step: {}", step);
            let result = self.run_step(step, &mut report).await;

            match result {
                Ok(()) => report.outcomes.push(StepOutcome { step, error: None }),
                Err(err) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(err),
                    FailurePolicy::Continue => {
                        warn!("Step '{}' failed, continuing: {}", step, err);
                        println!("Warning: {} failed: {}", step, err);
                        report.outcomes.push(StepOutcome {
                            step,
                            error: Some(err),
                        });
                    }
                },
            }
        }

        println!();
        hints::print(service);

        Ok(report)
    }

    async fn run_step(&self, step: Step, report: &mut InstallReport) -> Result<()> {
        let service = &self.config.service;

        match step {
            Step::CopyUnit => {
                let destination = self.manager.copy_unit_file(&self.config.unit_file).await?;
                println!("Installed unit file: {}", destination.display());
                report.destination = Some(destination);
            }
            Step::Reload => {
                self.manager.reload_definitions().await?;
                println!("Reloaded systemd unit definitions");
            }
            Step::Enable => {
                self.manager.enable(service).await?;
                println!("Enabled {} (starts on boot)", service);
            }
            Step::Start => {
                self.manager.start(service).await?;
                println!("Started {}", service);
            }
            Step::Status => {
                let status = self.manager.query_status(service).await?;
                print_status(&status);
                report.status = Some(status);
            }
        }

        Ok(())
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let status = self.manager.query_status(&self.config.service).await?;
        print_status(&status);
        println!();
        hints::print(&self.config.service);
        Ok(status)
    }

    pub async fn start(&self) -> Result<()> {
        self.check_privilege("starting a system service")?;
        self.manager.start(&self.config.service).await?;
        println!("Service started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.check_privilege("stopping a system service")?;
        self.manager.stop(&self.config.service).await?;
        println!("Service stopped");
        Ok(())
    }

    pub async fn restart(&self) -> Result<()> {
        self.check_privilege("restarting a system service")?;
        self.manager.restart(&self.config.service).await?;
        println!("Service restarted");
        Ok(())
    }

    /// Stop, disable and remove the unit, then reload systemd
    pub async fn uninstall(&self) -> Result<()> {
        self.config.validate()?;
        self.check_privilege("uninstalling a system service")?;

        let service = &self.config.service;

        if let Err(e) = self.manager.stop(service).await {
            warn!("Stop failed during uninstall: {}", e);
        }
        if let Err(e) = self.manager.disable(service).await {
            warn!("Disable failed during uninstall: {}", e);
        }

        let file_name = self.config.unit_file_name()?;
        if self.manager.remove_unit_file(&file_name).await? {
            println!("Removed unit file: {}", self.config.destination()?.display());
        } else {
            println!("Service not installed (unit file not found)");
        }

        self.manager.reload_definitions().await?;
        println!("Reloaded systemd unit definitions");

        Ok(())
    }
}

fn print_status(status: &ServiceStatus) {
    println!();
    println!("Service: {}", status.name);
    if !status.active_state.is_empty() {
        println!(
            "State: {} ({}), {}",
            status.active_state, status.sub_state, status.unit_file_state
        );
    }
    if !status.raw.is_empty() {
        println!();
        println!("{}", status.raw.trim_end());
    }
}
