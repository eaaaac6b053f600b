use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::filter::{self, Targets};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::gate::Gate;
use super::trace::open_sink;
use super::{CaptureError, Result};

/// CPU profile built from span busy time.
///
/// Each closed span contributes its self time (busy time minus the busy time
/// of its children) to the stack formed by its ancestors. On stop the totals
/// are written in folded-stack form, one `root;child;leaf <nanos>` line per
/// stack, which flamegraph tooling reads directly.
#[derive(Clone, Default)]
pub struct ProfileRecorder {
    inner: Arc<ProfileInner>,
}

#[derive(Default)]
struct ProfileInner {
    gate: Gate,
    state: Mutex<ProfileState>,
}

#[derive(Default)]
struct ProfileState {
    sink: Option<File>,
    stacks: BTreeMap<String, u64>,
}

impl ProfileRecorder {
    pub(crate) fn start(&self, path: &Path) -> Result<()> {
        let file = open_sink(path)?;
        let mut state = self.inner.state.lock();
        if !self.inner.gate.open() {
            return Err(CaptureError::AlreadyStarted("cpu profile"));
        }
        state.sink = Some(file);
        state.stacks.clear();
        Ok(())
    }

    /// Writes the folded stacks under the state lock; a losing caller waits
    /// for the winner's write to finish.
    pub(crate) fn stop(&self) -> Result<bool> {
        let mut state = self.inner.state.lock();
        if !self.inner.gate.close() {
            return Ok(false);
        }
        let stacks = mem::take(&mut state.stacks);
        if let Some(file) = state.sink.take() {
            let mut writer = BufWriter::new(file);
            for (stack, nanos) in &stacks {
                writeln!(writer, "{stack} {nanos}")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(true)
    }

    /// Whether the profile is currently recording.
    pub fn is_running(&self) -> bool {
        self.inner.gate.is_open()
    }

    /// Whether the profile was started and has since been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.gate.is_closed()
    }

    fn record(&self, stack: String, nanos: u64) {
        let mut state = self.inner.state.lock();
        if !self.inner.gate.is_open() {
            return;
        }
        *state.stacks.entry(stack).or_default() += nanos;
    }

    pub(crate) fn layer<S>(&self, targets: Targets) -> impl Layer<S> + Send + Sync
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let recorder = self.clone();
        ProfileLayer {
            recorder: self.clone(),
        }
        .with_filter(filter::filter_fn(move |meta| {
            meta.is_span()
                && recorder.is_running()
                && targets.would_enable(meta.target(), meta.level())
        }))
    }
}

#[derive(Default)]
struct Busy {
    total: Duration,
    children: Duration,
    entered: Option<Instant>,
}

struct ProfileLayer {
    recorder: ProfileRecorder,
}

impl<S> Layer<S> for ProfileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, _attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(Busy::default());
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(busy) = span.extensions_mut().get_mut::<Busy>() {
                busy.entered = Some(Instant::now());
            }
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(busy) = span.extensions_mut().get_mut::<Busy>() {
                if let Some(start) = busy.entered.take() {
                    busy.total += start.elapsed();
                }
            }
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let (total, self_time) = match span.extensions().get::<Busy>() {
            Some(busy) => (busy.total, busy.total.saturating_sub(busy.children)),
            None => return,
        };
        if let Some(parent) = span.parent() {
            if let Some(busy) = parent.extensions_mut().get_mut::<Busy>() {
                busy.children += total;
            }
        }
        let stack = span
            .scope()
            .from_root()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(";");
        self.recorder
            .record(stack, u64::try_from(self_time.as_nanos()).unwrap_or(u64::MAX));
    }
}
