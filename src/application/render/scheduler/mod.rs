//! Keystroke-aware render scheduling.
//!
//! Short documents and bypassed calls render synchronously. Long documents
//! are handed to a trailing debouncer: a burst of calls collapses into one
//! render of the latest text once input has been quiet for the configured
//! window, and the result goes to a [`RenderSink`].

mod classify;
mod debounce;
mod sink;

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use metrics::counter;
use tokio::{
    runtime::Handle,
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};

use crate::application::render::service::RenderPipeline;
use crate::application::render::types::RenderTree;

pub use classify::LengthClassifier;
pub use debounce::{DebouncePoll, DebounceState, Debouncer};
pub use sink::RenderSink;

pub const METRIC_RENDER_DEFERRED_TOTAL: &str = "append_editor_render_deferred_total";

pub const DEFAULT_LONG_TEXT_THRESHOLD: usize = 10_000;
pub const DEFAULT_CLASSIFY_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Texts with more characters than this are deferred.
    pub long_text_threshold: usize,
    /// How long a long/short verdict is reused. Zero classifies every call.
    pub classify_interval: Duration,
    /// Input must pause this long before a deferred render fires.
    pub quiet_window: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            long_text_threshold: DEFAULT_LONG_TEXT_THRESHOLD,
            classify_interval: DEFAULT_CLASSIFY_INTERVAL,
            quiet_window: DEFAULT_QUIET_WINDOW,
        }
    }
}

impl From<&crate::config::SchedulerSettings> for SchedulePolicy {
    fn from(settings: &crate::config::SchedulerSettings) -> Self {
        Self {
            long_text_threshold: settings.long_text_threshold,
            classify_interval: settings.classify_interval,
            quiet_window: settings.quiet_window,
        }
    }
}

/// Result of [`RenderScheduler::render_with_policy`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scheduled {
    Rendered(RenderTree),
    /// The render was deferred. `stale` is the last tree delivered by the
    /// deferred path, if any.
    Deferred { stale: Option<Arc<RenderTree>> },
}

impl Scheduled {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Scheduled::Deferred { .. })
    }

    pub fn rendered(self) -> Option<RenderTree> {
        match self {
            Scheduled::Rendered(tree) => Some(tree),
            Scheduled::Deferred { .. } => None,
        }
    }
}

/// Decides per call whether to render now or coalesce into a deferred
/// render. Cheap to clone; clones share the same timer and state.
#[derive(Clone)]
pub struct RenderScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    pipeline: Arc<RenderPipeline>,
    policy: SchedulePolicy,
    sink: Box<dyn RenderSink>,
    state: Mutex<SchedulerState>,
    missing_runtime_logged: AtomicBool,
    /// Set once the timer task failed, for example on a runtime built without
    /// the time driver. Long texts then render immediately.
    timers_unavailable: AtomicBool,
}

struct SchedulerState {
    classifier: LengthClassifier,
    debouncer: Debouncer,
    /// Bumped by every immediate render; a deferred render started under an
    /// older epoch is discarded instead of delivered.
    epoch: u64,
    timer_running: bool,
    last_deferred: Option<Arc<RenderTree>>,
}

impl RenderScheduler {
    pub fn new(
        pipeline: Arc<RenderPipeline>,
        policy: SchedulePolicy,
        sink: impl RenderSink,
    ) -> Self {
        let state = SchedulerState {
            classifier: LengthClassifier::new(policy.long_text_threshold, policy.classify_interval),
            debouncer: Debouncer::new(policy.quiet_window),
            epoch: 0,
            timer_running: false,
            last_deferred: None,
        };

        Self {
            shared: Arc::new(Shared {
                pipeline,
                policy,
                sink: Box::new(sink),
                state: Mutex::new(state),
                missing_runtime_logged: AtomicBool::new(false),
                timers_unavailable: AtomicBool::new(false),
            }),
        }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.shared.policy
    }

    pub fn pipeline(&self) -> &Arc<RenderPipeline> {
        &self.shared.pipeline
    }

    /// Unconditional synchronous render. Leaves scheduler state untouched.
    pub fn render(&self, text: &str) -> RenderTree {
        self.shared.pipeline.render(text)
    }

    /// Apply the scheduling policy to `text`.
    ///
    /// With `bypass` set, or for text that is not classified long, the text
    /// renders now and any pending deferred render is cancelled. Otherwise
    /// the text replaces whatever is pending and the render fires once no
    /// further call has arrived for the quiet window.
    pub fn render_with_policy(&self, text: &str, bypass: bool) -> Scheduled {
        if bypass || self.shared.timers_unavailable.load(Ordering::Acquire) {
            return Scheduled::Rendered(self.render_immediately(text));
        }

        let now = Instant::now();
        let mut state = self.shared.lock_state("render_with_policy");
        if !state.classifier.is_long(text, now) {
            drop(state);
            return Scheduled::Rendered(self.render_immediately(text));
        }

        let Ok(handle) = Handle::try_current() else {
            drop(state);
            self.shared.log_missing_runtime();
            return Scheduled::Rendered(self.render_immediately(text));
        };

        state.debouncer.push(text.to_string(), now);
        counter!(METRIC_RENDER_DEFERRED_TOTAL).increment(1);

        if !state.timer_running {
            state.timer_running = true;
            handle.spawn(supervise_timer(Arc::clone(&self.shared)));
        }

        Scheduled::Deferred {
            stale: state.last_deferred.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock_state("is_pending").debouncer.is_pending()
    }

    /// Render the pending text now instead of waiting for the quiet window.
    /// Returns `None` when nothing is pending.
    pub fn flush(&self) -> Option<RenderTree> {
        let text = {
            let mut state = self.shared.lock_state("flush");
            let text = state.debouncer.cancel()?;
            state.epoch += 1;
            text
        };
        Some(self.shared.pipeline.render(&text))
    }

    fn render_immediately(&self, text: &str) -> RenderTree {
        {
            let mut state = self.shared.lock_state("render_immediately");
            state.epoch += 1;
            if state.debouncer.cancel().is_some() {
                debug!(
                    target = "application::render::scheduler",
                    "pending deferred render superseded by immediate render"
                );
            }
        }
        self.shared.pipeline.render(text)
    }
}

impl Shared {
    fn lock_state(&self, op: &'static str) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    target = "application::render::scheduler",
                    op,
                    result = "poisoned_recovered",
                    "Recovered from poisoned scheduler lock"
                );
                poisoned.into_inner()
            }
        }
    }

    fn log_missing_runtime(&self) {
        if !self.missing_runtime_logged.swap(true, Ordering::Relaxed) {
            warn!(
                target = "application::render::scheduler",
                "no tokio runtime available; long texts render immediately"
            );
        }
    }

    /// The timer task died: stop deferring and deliver what was pending so
    /// the latest text is not lost.
    fn recover_from_timer_failure(&self, reason: &str) {
        self.timers_unavailable.store(true, Ordering::Release);
        let (pending, epoch) = {
            let mut state = self.lock_state("recover_timer");
            state.timer_running = false;
            (state.debouncer.cancel(), state.epoch)
        };

        warn!(
            target = "application::render::scheduler",
            reason,
            "render timer failed; long texts now render immediately"
        );

        if let Some(text) = pending {
            self.fire(&text, epoch);
        }
    }

    fn fire(&self, text: &str, epoch: u64) {
        let tree = Arc::new(self.pipeline.render(text));

        {
            let mut state = self.lock_state("fire");
            if state.epoch != epoch {
                debug!(
                    target = "application::render::scheduler",
                    "deferred render discarded: superseded by immediate render"
                );
                return;
            }
            state.last_deferred = Some(Arc::clone(&tree));
        }

        self.sink.deliver(tree);
    }
}

/// Runs the timer as its own task so a panic inside it (a runtime without
/// timers panics on the first sleep) is observed and recovered from.
async fn supervise_timer(shared: Arc<Shared>) {
    let timer = tokio::spawn(run_timer(Arc::clone(&shared)));
    match timer.await {
        Ok(()) => {}
        Err(err) if err.is_panic() => shared.recover_from_timer_failure("timer task panicked"),
        Err(_) => shared.recover_from_timer_failure("timer task cancelled"),
    }
}

/// Single timer per scheduler: sleeps until the current deadline, re-checks
/// (pushes may have moved it) and renders the latest text once it holds.
async fn run_timer(shared: Arc<Shared>) {
    loop {
        let (poll, epoch) = {
            let mut state = shared.lock_state("run_timer");
            let poll = state.debouncer.poll(Instant::now());
            if poll == DebouncePoll::Idle {
                state.timer_running = false;
            }
            (poll, state.epoch)
        };

        match poll {
            DebouncePoll::Wait(deadline) => sleep_until(deadline).await,
            DebouncePoll::Fire(text) => shared.fire(&text, epoch),
            DebouncePoll::Idle => return,
        }
    }
}
