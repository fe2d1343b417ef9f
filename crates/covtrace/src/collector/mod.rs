//! Coverage collection sessions.
//!
//! A [`Collector`] owns everything that outlives a single tracer: the line
//! data, the process-wide decision layer and the accumulated statistics. It
//! creates the tracer for the calling context on `start` and hands out
//! [`TracerSeed`]s for other threads.

mod active;

use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use covtrace_core::{
    Frame, Host, LineData, SharedDecisions, SharedHook, SharedLineData, ShouldTrace, Tracer,
    TracerConfig, TracerStats,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Tracer type created by a collector.
pub type SessionTracer<'h, F, D> =
    Tracer<'h, F, Arc<str>, SharedDecisions<D, Arc<str>>, SharedLineData<Arc<str>>>;

/// Snapshot of collected lines: tracename to sorted line numbers.
pub type LineSnapshot = BTreeMap<Arc<str>, Vec<u32>>;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn host_key<F>(host: &dyn Host<F>) -> *const () {
    std::ptr::from_ref(host).cast()
}

fn erase<F: 'static>(hook: SharedHook<F>) -> Rc<dyn Any> {
    Rc::new(hook)
}

/// One coverage measurement session.
///
/// Collectors started on the same host nest: starting a second one shadows
/// the first, and stopping (or dropping) the second hands the host back to
/// the first with its stack intact. Only the most recently started collector
/// may be stopped, paused or resumed.
pub struct Collector<'h, F: 'static, D> {
    id: u64,
    config: TracerConfig,
    data: SharedLineData<Arc<str>>,
    decisions: SharedDecisions<D, Arc<str>>,
    /// Tracer for the context that called `start`; `Some` until `stop`.
    tracer: Option<SessionTracer<'h, F, D>>,
    host: Option<&'h dyn Host<F>>,
    /// Stats of stopped tracers and tracers reported back by other threads.
    retired: Mutex<TracerStats>,
}

impl<'h, F, D> Collector<'h, F, D>
where
    F: Frame + 'static,
    D: ShouldTrace<F, Arc<str>> + 'static,
{
    pub fn new(should_trace: D) -> Self {
        Self::with_config(should_trace, TracerConfig::default())
    }

    pub fn with_config(should_trace: D, config: TracerConfig) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            data: Arc::new(Mutex::new(LineData::new())),
            decisions: SharedDecisions::new(should_trace),
            tracer: None,
            host: None,
            retired: Mutex::new(TracerStats::default()),
        }
    }

    /// Create a tracer for the calling context and install it on `host`,
    /// shadowing any collector already started there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if this collector already has a
    /// tracer, paused or not.
    pub fn start(&mut self, host: &'h dyn Host<F>) -> Result<()> {
        if self.tracer.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let mut tracer = Tracer::with_config(
            self.decisions.clone(),
            Arc::clone(&self.data),
            &self.config,
        );
        tracer.start(host);
        let key = host_key(host);
        active::push(key, self.id, host.get_trace().map(erase));
        self.tracer = Some(tracer);
        self.host = Some(host);
        info!(nesting = active::depth(key), "collection started");
        Ok(())
    }

    /// Resume a paused collection. The tracer keeps the stack it had when
    /// paused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if there is no tracer to resume and
    /// [`Error::Shadowed`] if a collector started later is still running.
    pub fn resume(&mut self) -> Result<()> {
        let host = self.top_host()?;
        let Some(tracer) = self.tracer.as_mut() else {
            return Err(Error::NotStarted);
        };
        if !tracer.is_started() {
            tracer.start(host);
            active::set_hook(self.id, host.get_trace().map(erase));
            debug!(depth = tracer.depth(), "collection resumed");
        }
        Ok(())
    }
}

impl<'h, F: 'static, D> Collector<'h, F, D> {
    /// Stop and discard the current tracer, keeping its statistics. The
    /// collector this one shadowed, if any, is reinstalled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if there is no tracer and
    /// [`Error::Shadowed`] if a collector started later is still running.
    pub fn stop(&mut self) -> Result<()> {
        let host = self.top_host()?;
        let mut tracer = self.tracer.take().ok_or(Error::NotStarted)?;
        tracer.stop();
        *self.retired.lock() += tracer.stats();
        self.host = None;

        let uncovered = active::remove(host_key(host), self.id)
            .and_then(|hook| hook.downcast_ref::<SharedHook<F>>().cloned());
        if let Some(hook) = uncovered {
            host.set_trace(Some(hook));
            debug!("outer collection resumed");
        }
        info!(
            units = self.data.lock().unit_count(),
            "collection stopped"
        );
        Ok(())
    }

    /// Deregister the current tracer without discarding its state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if there is no tracer and
    /// [`Error::Shadowed`] if a collector started later is still running.
    pub fn pause(&mut self) -> Result<()> {
        self.top_host()?;
        let tracer = self.tracer.as_mut().ok_or(Error::NotStarted)?;
        tracer.stop();
        active::set_hook(self.id, None);
        debug!(depth = tracer.depth(), "collection paused");
        Ok(())
    }

    /// Host of the current tracer, provided no later collector shadows it.
    fn top_host(&self) -> Result<&'h dyn Host<F>> {
        let host = self.host.ok_or(Error::NotStarted)?;
        if active::is_top(host_key(host), self.id) {
            Ok(host)
        } else {
            Err(Error::Shadowed)
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tracer.as_ref().is_some_and(Tracer::is_started) && !self.is_shadowed()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.tracer.as_ref().is_some_and(|tracer| !tracer.is_started())
    }

    /// Started, but a collector started later on the same host is running.
    #[must_use]
    pub fn is_shadowed(&self) -> bool {
        matches!(self.top_host(), Err(Error::Shadowed))
    }

    /// Seed for a tracer on another thread. The tracer built from it has its
    /// own stack and cache and shares this collector's decisions and results.
    #[must_use]
    pub fn tracer_for_thread(&self) -> TracerSeed<D> {
        TracerSeed {
            config: self.config.clone(),
            decisions: self.decisions.clone(),
            data: Arc::clone(&self.data),
        }
    }

    /// Add the statistics of a tracer that ran elsewhere.
    pub fn absorb_stats(&self, stats: TracerStats) {
        *self.retired.lock() += stats;
    }

    /// Forget collected lines, decisions and statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StillRunning`] while a tracer exists.
    pub fn reset(&mut self) -> Result<()> {
        if self.tracer.is_some() {
            return Err(Error::StillRunning("reset"));
        }
        self.data.lock().clear();
        self.decisions.clear();
        *self.retired.lock() = TracerStats::default();
        debug!("collector reset");
        Ok(())
    }

    /// Shared handle to the collected line data.
    #[must_use]
    pub fn data(&self) -> SharedLineData<Arc<str>> {
        Arc::clone(&self.data)
    }

    /// Copy of the collected lines, sorted by tracename and line.
    #[must_use]
    pub fn line_data(&self) -> LineSnapshot {
        self.data
            .lock()
            .iter()
            .map(|(name, lines)| (Arc::clone(name), lines.iter().copied().collect()))
            .collect()
    }

    /// Statistics of every tracer this collector knows about.
    #[must_use]
    pub fn stats(&self) -> TracerStats {
        let mut stats = *self.retired.lock();
        if let Some(tracer) = &self.tracer {
            stats += tracer.stats();
        }
        stats
    }
}

impl<F: 'static, D> Drop for Collector<'_, F, D> {
    fn drop(&mut self) {
        let Some(host) = self.host else {
            return;
        };
        if !self.is_shadowed() {
            if let Err(error) = self.stop() {
                warn!(%error, "stopping dropped collector failed");
            }
            return;
        }
        // Leave the hook to the collector that shadows this one.
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.detach();
        }
        active::remove(host_key(host), self.id);
        debug!("shadowed collection dropped");
    }
}

/// Everything needed to build a session tracer on another thread.
pub struct TracerSeed<D> {
    config: TracerConfig,
    decisions: SharedDecisions<D, Arc<str>>,
    data: SharedLineData<Arc<str>>,
}

impl<D> TracerSeed<D> {
    /// Build the tracer. Call this on the thread it will trace.
    #[must_use]
    pub fn build<'h, F>(self) -> SessionTracer<'h, F, D>
    where
        F: Frame,
        D: ShouldTrace<F, Arc<str>>,
    {
        Tracer::with_config(self.decisions, self.data, &self.config)
    }
}
