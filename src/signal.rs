//! Termination-signal watcher.
//!
//! Once armed, a background task waits for SIGINT or SIGTERM, stops diagnostic
//! capture (trace first, then profile) and force-exits with status 1. The
//! handlers are registered before [`SignalWatcher::arm`] returns, so a signal
//! delivered at any point after arming is observed.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::capture::CaptureSession;

/// Exit status used when a signal terminates the process.
pub const SIGNAL_EXIT_CODE: i32 = 1;

/// Process exit hook, `std::process::exit` outside tests.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit hook that terminates the process.
pub fn process_exit() -> ExitFn {
    Arc::new(|code| std::process::exit(code))
}

type Termination = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle to the armed watcher task.
pub struct SignalWatcher {
    task: JoinHandle<()>,
}

impl SignalWatcher {
    /// Registers the termination handlers and spawns the watcher task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be registered.
    pub fn arm(capture: CaptureSession, exit: ExitFn) -> io::Result<Self> {
        let termination = termination()?;
        Ok(Self::with_trigger(termination, capture, exit))
    }

    /// Spawns a watcher that fires when `trigger` completes.
    pub fn with_trigger<F>(trigger: F, capture: CaptureSession, exit: ExitFn) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            trigger.await;
            info!("termination signal received");
            capture.stop_all();
            exit(SIGNAL_EXIT_CODE);
        });
        Self { task }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    #[cfg(test)]
    pub(crate) fn disarm(self) {
        self.task.abort();
    }
}

#[cfg(unix)]
fn termination() -> io::Result<Termination> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(Box::pin(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    }))
}

#[cfg(not(unix))]
fn termination() -> io::Result<Termination> {
    Ok(Box::pin(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(?err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }))
}
