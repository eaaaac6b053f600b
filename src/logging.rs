//! Process-wide tracing subscriber.

use std::io;
use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::capture::CaptureSession;

const DEFAULT_FILTER: &str = "info";

/// Console logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Prefix lines with timestamp, level and target (long-running commands).
    pub prefix: bool,
    /// Filter directives used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl LogOptions {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .ok()
            .or_else(|| {
                self.filter
                    .as_deref()
                    .and_then(|directives| EnvFilter::try_new(directives).ok())
            })
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs the global subscriber: console output on stderr plus the capture
/// layers of `capture`. Only the first call has any effect.
///
/// Returns `true` when this call installed the subscriber.
pub fn init(options: &LogOptions, capture: &CaptureSession) -> bool {
    static INSTALLED: OnceLock<bool> = OnceLock::new();
    *INSTALLED.get_or_init(|| {
        let console = if options.prefix {
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(io::stderr)
                .without_time()
                .with_level(false)
                .with_target(false)
                .boxed()
        };
        tracing_subscriber::registry()
            .with(console.with_filter(options.env_filter()))
            .with(capture.layers())
            .try_init()
            .is_ok()
    })
}
