//! Local sshd supervised for `--ssh-server`.

use tunnelward_common::{SshServerConfig, SubsystemError};
use tunnelward_core::SubsystemContext;

/// Origin URL the tunnel uses when it fronts the local sshd.
pub fn origin_url(config: &SshServerConfig) -> String {
    format!("ssh://127.0.0.1:{}", config.local_port)
}

#[cfg(unix)]
pub fn sshd_command(config: &SshServerConfig) -> tokio::process::Command {
    let mut command = tokio::process::Command::new(&config.sshd_path);
    command
        .arg("-D")
        .arg("-e")
        .arg("-p")
        .arg(config.local_port.to_string())
        .arg("-o")
        .arg("ListenAddress=127.0.0.1");
    if let Some(key) = &config.host_key_path {
        command.arg("-h").arg(key);
    }
    command
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    command
}

/// Run sshd in the foreground until shutdown is forced. sshd exiting on its
/// own is a failure.
#[cfg(unix)]
pub async fn run(config: SshServerConfig, ctx: SubsystemContext) -> Result<(), SubsystemError> {
    use tracing::{info, warn};

    let mut child = sshd_command(&config).spawn().map_err(|e| {
        SubsystemError::startup(format!(
            "failed to start {}: {e}",
            config.sshd_path.display()
        ))
    })?;
    info!(
        pid = ?child.id(),
        "Started sshd on 127.0.0.1:{}",
        config.local_port
    );

    tokio::select! {
        () = ctx.shutdown.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop sshd: {}", e);
            }
            Ok(())
        }
        status = child.wait() => {
            let status = status?;
            Err(SubsystemError::runtime(format!("sshd exited unexpectedly ({status})")))
        }
    }
}

#[cfg(not(unix))]
pub async fn run(_config: SshServerConfig, _ctx: SubsystemContext) -> Result<(), SubsystemError> {
    Err(SubsystemError::startup(
        "the local SSH server is only supported on Unix",
    ))
}
