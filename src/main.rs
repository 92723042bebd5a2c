use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use unit_installer::config::ConfigLayer;
use unit_installer::{
    FailurePolicy, InstallError, Installer, InstallerConfig, PrivilegePolicy, Systemctl, hints,
    logs,
};

#[derive(Parser)]
#[command(name = "unit-installer")]
#[command(about = "Install, enable and start the fact-checker API systemd service")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct TargetArgs {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Unit file to install (service name defaults to its stem)
    #[arg(long, global = true)]
    unit_file: Option<PathBuf>,

    /// Service name
    #[arg(short, long, global = true)]
    service: Option<String>,

    /// systemd unit directory
    #[arg(long, global = true)]
    unit_dir: Option<PathBuf>,

    /// What to do when a step fails
    #[arg(long, global = true, value_enum)]
    failure_policy: Option<FailurePolicy>,

    /// Keep running later steps after a failure (same as --failure-policy continue)
    #[arg(long, global = true, conflicts_with = "failure_policy")]
    keep_going: bool,

    /// Whether to check for root before running
    #[arg(long, global = true, value_enum)]
    privilege_policy: Option<PrivilegePolicy>,

    /// Do not check for root before running (same as --privilege-policy ignore)
    #[arg(long, global = true, conflicts_with = "privilege_policy")]
    no_privilege_check: bool,
}

impl TargetArgs {
    fn flags(&self) -> ConfigLayer {
        ConfigLayer {
            service: self.service.clone(),
            unit_file: self.unit_file.clone(),
            unit_dir: self.unit_dir.clone(),
            failure_policy: self
                .failure_policy
                .or(self.keep_going.then_some(FailurePolicy::Continue)),
            privilege_policy: self
                .privilege_policy
                .or(self.no_privilege_check.then_some(PrivilegePolicy::Ignore)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the unit file, reload systemd, enable and start the service (default)
    Install,

    /// Stop, disable and remove the service
    Uninstall,

    /// Start the service
    Start,

    /// Stop the service
    Stop,

    /// Restart the service
    Restart,

    /// Show service status
    Status,

    /// Print log and restart commands
    Hints,

    /// Show service logs
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = InstallerConfig::resolve(
        cli.target.config.as_deref(),
        ConfigLayer::from_process_env(),
        cli.target.flags(),
    )?;
    let command = cli.command.unwrap_or(Commands::Install);

    let installer = Installer::new(Systemctl::new(&config.unit_dir), config);
    let service = installer.config().service.clone();

    match command {
        Commands::Install => {
            let report = installer.install().await?;
            if let Some(err) = report.last_error() {
                std::process::exit(err.exit_code());
            }
            if report.succeeded() {
                println!();
                println!("Service installed and started successfully!");
            }
        }
        Commands::Uninstall => installer.uninstall().await?,
        Commands::Start => installer.start().await?,
        Commands::Stop => installer.stop().await?,
        Commands::Restart => installer.restart().await?,
        Commands::Status => {
            installer
                .status()
                .await
                .with_context(|| format!("Failed to query status of {}", service))?;
        }
        Commands::Hints => hints::print(&service),
        Commands::Logs { lines, follow } => logs::run(&service, lines, follow).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<InstallError>()
            .map_or(1, InstallError::exit_code);
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_flags_without_subcommand() {
        let cli = Cli::try_parse_from(["unit-installer", "--keep-going", "--no-privilege-check"])
            .unwrap();
        let flags = cli.target.flags();

        assert!(cli.command.is_none());
        assert_eq!(flags.failure_policy, Some(FailurePolicy::Continue));
        assert_eq!(flags.privilege_policy, Some(PrivilegePolicy::Ignore));
    }

    #[test]
    fn test_policy_values_after_subcommand() {
        let cli = Cli::try_parse_from([
            "unit-installer",
            "install",
            "--failure-policy",
            "continue",
            "--privilege-policy",
            "ignore",
            "--unit-file",
            "deploy/billing.service",
        ])
        .unwrap();
        let flags = cli.target.flags();

        assert!(matches!(cli.command, Some(Commands::Install)));
        assert_eq!(flags.failure_policy, Some(FailurePolicy::Continue));
        assert_eq!(flags.privilege_policy, Some(PrivilegePolicy::Ignore));
        assert_eq!(flags.unit_file, Some(PathBuf::from("deploy/billing.service")));
    }

    #[test]
    fn test_no_policy_flags_leave_layer_unset() {
        let cli = Cli::try_parse_from(["unit-installer", "status"]).unwrap();
        let flags = cli.target.flags();

        assert_eq!(flags.failure_policy, None);
        assert_eq!(flags.privilege_policy, None);
    }

    #[test]
    fn test_keep_going_conflicts_with_failure_policy() {
        let result = Cli::try_parse_from([
            "unit-installer",
            "--keep-going",
            "--failure-policy",
            "abort",
        ]);
        assert!(result.is_err());
    }
}
