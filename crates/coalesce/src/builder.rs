use std::time::Duration;

use tokio::runtime::Handle;

use crate::coalescer::{Coalescer, DynamicCoalescer};
use crate::config::CoalescerConfig;
use crate::operation::Operation;

/// Builder for [`Coalescer`] and [`DynamicCoalescer`].
///
/// ```ignore
/// let autosave = Coalescer::builder(SaveDocument::new(store))
///     .delay(Duration::from_millis(250))
///     .name("autosave")
///     .build(document);
///
/// autosave.trigger();
/// ```
pub struct CoalescerBuilder<C: Send + 'static> {
    operation: Box<dyn Operation<C>>,
    config: CoalescerConfig,
    runtime: Option<Handle>,
}

impl<C> CoalescerBuilder<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new<O: Operation<C>>(operation: O) -> Self {
        Self {
            operation: Box::new(operation),
            config: CoalescerConfig::default(),
            runtime: None,
        }
    }

    /// Replace the whole config. Later setters override its fields.
    pub fn config(mut self, config: CoalescerConfig) -> Self {
        self.config = config;
        self
    }

    /// Zero is replaced by [`DEFAULT_DELAY`](crate::DEFAULT_DELAY) at build time.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn fault_capacity(mut self, capacity: usize) -> Self {
        self.config.fault_capacity = capacity;
        self
    }

    /// Runtime that timers and runs are spawned on.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build a coalescer that runs every invocation with `ctx`.
    ///
    /// # Panics
    ///
    /// If no runtime was supplied and this is called outside a Tokio runtime.
    pub fn build(self, ctx: C) -> Coalescer<C> {
        let runtime = self.runtime.unwrap_or_else(Handle::current);
        Coalescer::from_parts(self.operation, self.config, runtime, ctx)
    }

    /// Build a coalescer that takes its context from
    /// [`DynamicCoalescer::trigger_with`].
    ///
    /// # Panics
    ///
    /// As [`build`](Self::build).
    pub fn build_dynamic(self) -> DynamicCoalescer<C> {
        let runtime = self.runtime.unwrap_or_else(Handle::current);
        DynamicCoalescer::from_parts(self.operation, self.config, runtime)
    }
}
