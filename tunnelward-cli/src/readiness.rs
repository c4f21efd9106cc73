//! Things that happen once the tunnel is connected.

use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tunnelward_core::SubsystemContext;

/// Wait for the connected signal, then notify the service manager and write
/// the pidfile. Gives up quietly if shutdown is forced first.
pub fn spawn_consumers(ctx: &SubsystemContext, pidfile: Option<PathBuf>) -> JoinHandle<()> {
    let connected = ctx.connected.clone();
    let shutdown = ctx.shutdown.clone();

    tokio::spawn(async move {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = connected.wait() => {}
        }

        notify_service_manager();

        if let Some(path) = pidfile {
            match write_pidfile(&path).await {
                Ok(written) => info!("Wrote pidfile {}", written.display()),
                Err(e) => warn!("Failed to write pidfile {}: {}", path.display(), e),
            }
        }
    })
}

#[cfg(unix)]
fn notify_service_manager() {
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        warn!("Failed to notify service manager: {}", e);
    }
}

#[cfg(not(unix))]
fn notify_service_manager() {}

/// Write this process id, without a trailing newline, to `path`.
pub async fn write_pidfile(path: &Path) -> io::Result<PathBuf> {
    let path = expand_home(path)?;
    tokio::fs::write(&path, std::process::id().to_string()).await?;
    Ok(path)
}

/// Replace a leading `~` with the user's home directory.
pub fn expand_home(path: &Path) -> io::Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "cannot determine home directory"))?;
    Ok(home.join(rest))
}
