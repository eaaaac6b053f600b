use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::Subscriber;
use tracing_subscriber::filter::{self, Targets};
use tracing_subscriber::fmt::{self, format::FmtSpan, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::gate::Gate;
use super::{CaptureError, Result};

/// Execution trace written as JSON lines.
///
/// Every enabled event and span close is appended to the sink while the
/// recorder is running. Writes made before start or after stop are dropped.
#[derive(Clone, Default)]
pub struct TraceRecorder {
    inner: Arc<TraceInner>,
}

#[derive(Default)]
struct TraceInner {
    gate: Gate,
    sink: Mutex<Option<BufWriter<File>>>,
}

impl TraceRecorder {
    pub(crate) fn start(&self, path: &Path) -> Result<()> {
        let file = open_sink(path)?;
        let mut sink = self.inner.sink.lock();
        if !self.inner.gate.open() {
            return Err(CaptureError::AlreadyStarted("trace"));
        }
        *sink = Some(BufWriter::new(file));
        Ok(())
    }

    /// Closes the gate and flushes the sink while holding the sink lock, so a
    /// caller that loses the race returns only after the file is complete.
    pub(crate) fn stop(&self) -> Result<bool> {
        let mut sink = self.inner.sink.lock();
        if !self.inner.gate.close() {
            return Ok(false);
        }
        if let Some(mut writer) = sink.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(true)
    }

    /// Whether the trace is currently recording.
    pub fn is_running(&self) -> bool {
        self.inner.gate.is_open()
    }

    /// Whether the trace was started and has since been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.gate.is_closed()
    }

    pub(crate) fn layer<S>(&self, targets: Targets) -> impl Layer<S> + Send + Sync
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let recorder = self.clone();
        fmt::layer()
            .json()
            .with_writer(self.clone())
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter::filter_fn(move |meta| {
                recorder.is_running() && targets.would_enable(meta.target(), meta.level())
            }))
    }
}

pub(crate) fn open_sink(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|source| CaptureError::OpenSink {
            path: path.to_path_buf(),
            source,
        })
}

/// Writer handed to the formatter for a single record.
pub struct TraceWriter<'a> {
    guard: MutexGuard<'a, Option<BufWriter<File>>>,
}

impl Write for TraceWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.guard.as_mut() {
            Some(writer) => writer.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.guard.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for TraceRecorder {
    type Writer = TraceWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        TraceWriter {
            guard: self.inner.sink.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_only_while_running() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("trace.json");
        let recorder = TraceRecorder::default();

        recorder.make_writer().write_all(b"before\n").expect("write");
        recorder.start(&path).expect("start");
        recorder.make_writer().write_all(b"during\n").expect("write");
        assert!(recorder.stop().expect("stop"));
        recorder.make_writer().write_all(b"after\n").expect("write");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "during\n");
    }

    #[test]
    fn stop_without_start_is_noop() {
        let recorder = TraceRecorder::default();
        assert!(!recorder.stop().expect("stop"));
        assert!(!recorder.is_stopped());
    }

    #[test]
    fn second_stop_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        let recorder = TraceRecorder::default();
        recorder.start(&dir.path().join("t")).expect("start");
        assert!(recorder.stop().expect("first stop"));
        assert!(!recorder.stop().expect("second stop"));
        assert!(recorder.is_stopped());
    }

    #[test]
    fn racing_stops_return_after_the_flush() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("trace.json");
        let recorder = TraceRecorder::default();
        recorder.start(&path).expect("start");

        let mut pending = recorder.make_writer();
        pending.write_all(b"event\n").expect("write");

        let stoppers: Vec<_> = (0..2)
            .map(|_| {
                let recorder = recorder.clone();
                let path = path.clone();
                std::thread::spawn(move || {
                    let won = recorder.stop().expect("stop");
                    (won, std::fs::read_to_string(&path).expect("read"))
                })
            })
            .collect();
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(pending);

        let results: Vec<(bool, String)> = stoppers
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect();
        assert_eq!(results.iter().filter(|(won, _)| *won).count(), 1);
        for (_, contents) in &results {
            assert_eq!(contents, "event\n");
        }
    }

    #[test]
    fn unwritable_sink_fails_start() {
        let dir = TempDir::new().expect("tempdir");
        let recorder = TraceRecorder::default();
        let err = recorder
            .start(&dir.path().join("missing").join("trace"))
            .expect_err("missing parent");
        assert!(matches!(err, CaptureError::OpenSink { .. }));
        assert!(!recorder.is_running());
    }
}
