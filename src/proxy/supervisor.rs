//! HAProxy process supervision.
//!
//! # Responsibilities
//! - Spawn haproxy with the generated configuration
//! - Exit with the child's exit code if it dies
//! - Forward termination signals to the child

use std::io;
use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};

/// Spawn `haproxy -f <config>` with inherited stdio.
pub fn spawn_haproxy(bin: &str, config: &Path) -> io::Result<Child> {
    let child = Command::new(bin).arg("-f").arg(config).spawn()?;
    tracing::info!(bin, config = %config.display(), pid = child.id(), "haproxy started");
    Ok(child)
}

/// Run until the child exits or a termination signal arrives.
///
/// Returns the exit code the daemon should terminate with.
pub async fn supervise(mut child: Child) -> io::Result<i32> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            let code = status.code().unwrap_or(1);
            tracing::error!(code, "haproxy process exited");
            Ok(code)
        }
        _ = sigterm.recv() => {
            terminate(&mut child).await;
            Ok(0)
        }
        _ = sigint.recv() => {
            terminate(&mut child).await;
            Ok(0)
        }
    }
}

async fn terminate(child: &mut Child) {
    tracing::info!("termination signal received, stopping haproxy");
    if let Some(pid) = child.id() {
        if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::warn!(error = %err, "failed to signal haproxy");
        }
    }
    let _ = child.wait().await;
}
