//! Scratch-file cleanup on INT, TERM and QUIT.

use crate::CoreError;
use reward_compose::ScratchRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Watch for termination signals on a background thread. On the first one
/// the registry is cleaned up and the process exits with status 1. Only the
/// first call installs a watcher.
///
/// Handlers are registered before this returns, so a signal arriving right
/// after installation is not lost.
pub fn install_signal_cleanup(registry: Arc<ScratchRegistry>) -> Result<(), CoreError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut watcher = {
        let _guard = rt.enter();
        Termination::register()?
    };
    std::thread::Builder::new()
        .name("reward-signals".to_owned())
        .spawn(move || {
            let name = rt.block_on(watcher.recv());
            debug!(signal = name, "terminating");
            if let Err(e) = registry.cleanup() {
                warn!("scratch cleanup failed: {e}");
            }
            std::process::exit(1);
        })?;
    Ok(())
}

#[cfg(unix)]
struct Termination {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Termination {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

#[cfg(not(unix))]
struct Termination;

#[cfg(not(unix))]
impl Termination {
    #[allow(clippy::unnecessary_wraps)]
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot watch for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}
