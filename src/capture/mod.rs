//! Optional diagnostic capture: execution trace and CPU profile.
//!
//! Both streams are fed by `tracing` layers that are installed once with the
//! process subscriber (see [`crate::logging::init`]) and stay dormant until the
//! matching stream is started. Stopping is idempotent and safe to race: the
//! normal exit path and the signal watcher may both call
//! [`CaptureSession::stop_all`], and each sink is flushed exactly once.

mod gate;
mod profile;
mod trace;

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

pub use profile::ProfileRecorder;
pub use trace::{TraceRecorder, TraceWriter};

/// Error type for diagnostic capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The sink file could not be opened for writing.
    #[error("open {path}: {source}")]
    OpenSink {
        /// Sink path supplied by the operator.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// A stream may only be started once per process.
    #[error("{0} capture already started")]
    AlreadyStarted(&'static str),
    /// Flushing a sink failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type alias for diagnostic capture.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Where to write each capture stream; `None` leaves the stream off.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Execution trace sink (`--trace`).
    pub trace: Option<PathBuf>,
    /// CPU profile sink (`--cpu`).
    pub cpu: Option<PathBuf>,
}

/// Owner of the trace and profile streams for one process.
#[derive(Clone, Default)]
pub struct CaptureSession {
    trace: TraceRecorder,
    profile: ProfileRecorder,
}

impl CaptureSession {
    /// Session with both streams idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts every stream that has a sink in `options`.
    ///
    /// # Errors
    ///
    /// Returns the first sink that cannot be opened. A stream started before
    /// the failure keeps running until stopped.
    pub fn start(&self, options: &CaptureOptions) -> Result<()> {
        if let Some(path) = &options.trace {
            self.start_trace(path)?;
        }
        if let Some(path) = &options.cpu {
            self.start_profile(path)?;
        }
        Ok(())
    }

    /// Starts the execution trace.
    pub fn start_trace(&self, path: &std::path::Path) -> Result<()> {
        self.trace.start(path)?;
        debug!(path = %path.display(), "execution trace started");
        Ok(())
    }

    /// Starts the CPU profile.
    pub fn start_profile(&self, path: &std::path::Path) -> Result<()> {
        self.profile.start(path)?;
        debug!(path = %path.display(), "cpu profile started");
        Ok(())
    }

    /// Stops the execution trace. No-op unless it is running.
    pub fn stop_trace(&self) -> Result<()> {
        if self.trace.stop()? {
            debug!("execution trace stopped");
        }
        Ok(())
    }

    /// Stops the CPU profile. No-op unless it is running.
    pub fn stop_profile(&self) -> Result<()> {
        if self.profile.stop()? {
            debug!("cpu profile stopped");
        }
        Ok(())
    }

    /// Stops the trace, then the profile. Failures are logged, not returned.
    pub fn stop_all(&self) {
        if let Err(err) = self.stop_trace() {
            warn!(%err, "failed to flush execution trace");
        }
        if let Err(err) = self.stop_profile() {
            warn!(%err, "failed to flush cpu profile");
        }
    }

    /// Trace recorder backing this session.
    pub fn trace(&self) -> &TraceRecorder {
        &self.trace
    }

    /// Profile recorder backing this session.
    pub fn profile(&self) -> &ProfileRecorder {
        &self.profile
    }

    /// Subscriber layers feeding both streams.
    pub fn layers<S>(&self) -> impl Layer<S> + Send + Sync
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let targets = capture_targets();
        self.trace
            .layer(targets.clone())
            .and_then(self.profile.layer(targets))
    }
}

fn capture_targets() -> Targets {
    Targets::new()
        .with_target("diffs", Level::TRACE)
        .with_target("tower_http", Level::DEBUG)
        .with_default(Level::INFO)
}

/// Stops every stream when dropped, covering early returns and unwinding.
pub struct StopOnDrop(pub CaptureSession);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop_all();
    }
}
