use tokio::process::Command;

use crate::error::{InstallError, Result};

fn journalctl_args(service: &str, lines: usize, follow: bool) -> Vec<String> {
    let mut args = vec![
        "-u".to_string(),
        service.to_string(),
        "-n".to_string(),
        lines.to_string(),
        "--no-pager".to_string(),
    ];
    if follow {
        args.push("-f".to_string());
    }
    args
}

/// Show the service's journal, optionally following it
pub async fn run(service: &str, lines: usize, follow: bool) -> Result<()> {
    let args = journalctl_args(service, lines, follow);

    let status = Command::new("journalctl")
        .args(&args)
        .status()
        .await
        .map_err(|source| InstallError::Command {
            program: "journalctl".to_string(),
            source,
        })?;

    if !status.success() {
        return Err(InstallError::CommandFailed {
            command: format!("journalctl {}", args.join(" ")),
            reason: format!("exit code {:?}", status.code()),
        });
    }

    Ok(())
}
