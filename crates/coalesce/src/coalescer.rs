use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info_span, trace, Instrument};

use crate::builder::CoalescerBuilder;
use crate::config::CoalescerConfig;
use crate::error::{CoalesceError, Fault};
use crate::operation::Operation;
use crate::state::{CoalesceState, TriggerOutcome};
use crate::stats::{CoalescerStats, StatsRecorder};

/// Collapses bursts of triggers into single, never-overlapping runs of an
/// [`Operation`], always invoked with the context bound at construction.
///
/// Cloning is cheap and every clone drives the same state.
pub struct Coalescer<C: Send + 'static = ()> {
    inner: Arc<Inner<C>>,
    ctx: C,
}

/// A coalescer whose context comes from the trigger that arms the timer.
///
/// Only [`trigger_with`](Self::trigger_with) is offered: an idle coalescer
/// always has a context to arm with. Follow-up runs reuse the arming context,
/// and contexts carried by absorbed or follow-up-requesting triggers are
/// dropped.
pub struct DynamicCoalescer<C: Send + 'static> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: Send + 'static> {
    name: Arc<str>,
    delay: Duration,
    operation: Box<dyn Operation<C>>,
    state: watch::Sender<CoalesceState>,
    faults: broadcast::Sender<Fault>,
    stats: StatsRecorder,
    runtime: Handle,
}

impl Coalescer<()> {
    /// Coalesce a context-free operation.
    ///
    /// A zero `delay` is replaced by [`DEFAULT_DELAY`](crate::DEFAULT_DELAY).
    ///
    /// # Panics
    ///
    /// Outside a Tokio runtime, like `tokio::spawn`. Use
    /// [`CoalescerBuilder::runtime`] to supply a handle explicitly.
    pub fn new<O: Operation<()>>(delay: Duration, operation: O) -> Self {
        CoalescerBuilder::new(operation).delay(delay).build(())
    }
}

impl<C> Coalescer<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn builder<O: Operation<C>>(operation: O) -> CoalescerBuilder<C> {
        CoalescerBuilder::new(operation)
    }

    /// Coalesce `operation`, always running it with `ctx`.
    pub fn with_context<O: Operation<C>>(delay: Duration, operation: O, ctx: C) -> Self {
        CoalescerBuilder::new(operation).delay(delay).build(ctx)
    }

    pub(crate) fn from_parts(
        operation: Box<dyn Operation<C>>,
        config: CoalescerConfig,
        runtime: Handle,
        ctx: C,
    ) -> Self {
        Self {
            inner: Inner::new(operation, config, runtime, false),
            ctx,
        }
    }

    /// Request a run.
    ///
    /// Never blocks. On an idle coalescer this arms the delay timer; while a
    /// timer is armed it does nothing; while a run executes it requests one
    /// follow-up run, which starts as soon as the current run finishes.
    pub fn trigger(&self) -> TriggerOutcome {
        self.inner.submit(|| self.ctx.clone())
    }

    /// A plain closure that triggers this coalescer.
    pub fn trigger_fn(&self) -> impl Fn() -> TriggerOutcome + Clone + Send + Sync + 'static {
        let this = self.clone();
        move || this.trigger()
    }

    /// Resolves once no timer is armed, no run executes and no follow-up is owed.
    pub async fn wait_idle(&self) {
        self.inner.wait_idle().await
    }
}

impl<C> DynamicCoalescer<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Coalesce `operation`, taking its context from [`trigger_with`](Self::trigger_with).
    pub fn new<O: Operation<C>>(delay: Duration, operation: O) -> Self {
        CoalescerBuilder::new(operation).delay(delay).build_dynamic()
    }

    pub(crate) fn from_parts(
        operation: Box<dyn Operation<C>>,
        config: CoalescerConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Inner::new(operation, config, runtime, true),
        }
    }

    /// Request a run, offering `ctx` in case this trigger arms the timer.
    ///
    /// Branches exactly like [`Coalescer::trigger`]; `ctx` is dropped unless
    /// the outcome is [`TriggerOutcome::Armed`].
    pub fn trigger_with(&self, ctx: C) -> TriggerOutcome {
        self.inner.submit(move || ctx)
    }

    pub async fn wait_idle(&self) {
        self.inner.wait_idle().await
    }
}

macro_rules! observers {
    ($handle:ident) => {
        impl<C: Send + 'static> $handle<C> {
            /// The configured name, or the operation's own.
            pub fn name(&self) -> &str {
                &self.inner.name
            }

            pub fn delay(&self) -> Duration {
                self.inner.delay
            }

            pub fn state(&self) -> CoalesceState {
                *self.inner.state.borrow()
            }

            /// Observe state transitions.
            pub fn subscribe(&self) -> watch::Receiver<CoalesceState> {
                self.inner.state.subscribe()
            }

            /// Receive faults raised by runs that start after this call.
            ///
            /// Delivery is at-most-once: a receiver that falls more than
            /// `fault_capacity` faults behind gets `RecvError::Lagged`.
            pub fn faults(&self) -> broadcast::Receiver<Fault> {
                self.inner.faults.subscribe()
            }

            pub fn stats(&self) -> CoalescerStats {
                self.inner.stats.snapshot()
            }
        }

        impl<C: Send + 'static> fmt::Debug for $handle<C> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("name", &self.inner.name)
                    .field("delay", &self.inner.delay)
                    .field("state", &*self.inner.state.borrow())
                    .finish()
            }
        }
    };
}

observers!(Coalescer);
observers!(DynamicCoalescer);

impl<C: Send + 'static> Inner<C> {
    fn new(
        operation: Box<dyn Operation<C>>,
        config: CoalescerConfig,
        runtime: Handle,
        dynamic: bool,
    ) -> Arc<Self> {
        let config = config.normalized();
        let name: Arc<str> = match config.name {
            Some(name) => Arc::from(name),
            None => Arc::from(operation.name().as_ref()),
        };
        let (state, _) = watch::channel(CoalesceState::IDLE);
        let (faults, _) = broadcast::channel(config.fault_capacity);

        debug!(operation = %name, delay = ?config.delay, dynamic, "coalescer created");

        Arc::new(Self {
            name,
            delay: config.delay,
            operation,
            state,
            faults,
            stats: StatsRecorder::default(),
            runtime,
        })
    }

    async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(CoalesceState::is_idle).await;
    }
}

impl<C> Inner<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// `ctx` is only evaluated when the trigger arms the timer.
    fn submit(self: &Arc<Self>, ctx: impl FnOnce() -> C) -> TriggerOutcome {
        let mut outcome = TriggerOutcome::Absorbed;
        self.state.send_if_modified(|state| {
            outcome = state.on_trigger();
            outcome.changes_state()
        });
        self.stats.record_trigger(outcome);

        match outcome {
            TriggerOutcome::Armed => {
                trace!(operation = %self.name, delay = ?self.delay, "timer armed");
                self.spawn_run(ctx(), Some(self.delay));
            }
            TriggerOutcome::Absorbed => {
                trace!(operation = %self.name, "trigger absorbed by pending run");
            }
            TriggerOutcome::FollowUpRequested => {
                trace!(operation = %self.name, "follow-up requested during run");
            }
        }

        outcome
    }

    fn spawn_run(self: &Arc<Self>, ctx: C, wait: Option<Duration>) {
        self.runtime.spawn(Self::run(Arc::clone(self), ctx, wait));
    }

    fn run(self: Arc<Self>, ctx: C, wait: Option<Duration>) -> BoxFuture<'static, ()> {
        async move {
            if let Some(wait) = wait {
                tokio::time::sleep(wait).await;
            }

            self.state.send_modify(CoalesceState::on_fire);
            let run = self.stats.record_run_started();
            let span = info_span!("coalesced_run", operation = %self.name, run);
            debug!(parent: &span, "run started");

            // Decides on the follow-up even if this task is torn down mid-run.
            let guard = RunGuard {
                inner: Arc::clone(&self),
                ctx: Some(ctx.clone()),
            };

            let started = Instant::now();
            // `run` itself may panic before handing back a future.
            let outcome = AssertUnwindSafe(async { self.operation.run(ctx).await })
                .catch_unwind()
                .instrument(span.clone())
                .await;
            self.stats.record_run_completed();

            span.in_scope(|| match outcome {
                Ok(Ok(())) => {
                    debug!(elapsed = ?started.elapsed(), "run finished");
                }
                Ok(Err(err)) => self.report(run, CoalesceError::failed(&self.name, &err)),
                Err(payload) => self.report(run, CoalesceError::panicked(&self.name, payload)),
            });

            drop(guard);
        }
        .boxed()
    }

    fn report(&self, run: u64, error: CoalesceError) {
        self.stats.record_fault();
        error!(error = %error, "coalesced operation faulted");
        // No receivers is fine: the fault has been logged.
        let _ = self.faults.send(Fault { run, error });
    }
}

/// Runs the completion step of a run when dropped.
struct RunGuard<C>
where
    C: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<C>>,
    ctx: Option<C>,
}

impl<C> Drop for RunGuard<C>
where
    C: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let mut follow_up = false;
        self.inner.state.send_modify(|state| follow_up = state.on_complete());

        if !follow_up {
            return;
        }

        if let Some(ctx) = self.ctx.take() {
            debug!(operation = %self.inner.name, "triggers arrived during run, scheduling follow-up");
            Inner::spawn_run(&self.inner, ctx, None);
        }
    }
}

impl<C: Clone + Send + 'static> Clone for Coalescer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ctx: self.ctx.clone(),
        }
    }
}

impl<C: Send + 'static> Clone for DynamicCoalescer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
