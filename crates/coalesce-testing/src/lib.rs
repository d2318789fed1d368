//! Testing utilities for coalesced operations.
//!
//! [`RecordingOperation`] records when each run started and finished (on the
//! Tokio clock, so paused-time tests see exact instants), can simulate a
//! slow operation, and can be scripted to fail or panic on chosen runs.
//! [`ContextLog`] records the context each run was invoked with.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use coalesce_core::Operation;
use tokio::time::Instant;

/// One observed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRecord {
    /// 1-based run number as seen by the operation.
    pub run: u64,
    pub started: Instant,
    pub finished: Option<Instant>,
}

#[derive(Debug, Clone)]
enum Script {
    Fail(String),
    Panic(String),
}

#[derive(Debug, Default)]
struct Recorder {
    name: Mutex<Option<String>>,
    duration: Duration,
    runs: Mutex<Vec<RunRecord>>,
    script: Mutex<HashMap<u64, Script>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An operation that records its runs.
///
/// Clones share the same log, so keep one clone for assertions and hand the
/// other to the coalescer.
#[derive(Debug, Clone, Default)]
pub struct RecordingOperation {
    inner: Arc<Recorder>,
}

impl RecordingOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each run sleeps for `duration` before finishing.
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            inner: Arc::new(Recorder {
                duration,
                ..Recorder::default()
            }),
        }
    }

    /// Report `name` from [`Operation::name`]. Applies to every clone.
    pub fn named(self, name: impl Into<String>) -> Self {
        *lock(&self.inner.name) = Some(name.into());
        self
    }

    /// Make run number `run` return an error after finishing its work.
    pub fn fail_on(self, run: u64, message: impl Into<String>) -> Self {
        lock(&self.inner.script).insert(run, Script::Fail(message.into()));
        self
    }

    /// Make run number `run` panic after finishing its work.
    pub fn panic_on(self, run: u64, message: impl Into<String>) -> Self {
        lock(&self.inner.script).insert(run, Script::Panic(message.into()));
        self
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        lock(&self.inner.runs).clone()
    }

    pub fn run_count(&self) -> usize {
        lock(&self.inner.runs).len()
    }

    /// Start instants of every run, in order.
    pub fn starts(&self) -> Vec<Instant> {
        lock(&self.inner.runs).iter().map(|r| r.started).collect()
    }

    /// Highest number of runs observed executing at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    async fn record(&self) -> Result<()> {
        let run = {
            let mut runs = lock(&self.inner.runs);
            let run = runs.len() as u64 + 1;
            runs.push(RunRecord {
                run,
                started: Instant::now(),
                finished: None,
            });
            run
        };

        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.inner.duration.is_zero() {
            tokio::time::sleep(self.inner.duration).await;
        }

        if let Some(record) = lock(&self.inner.runs).get_mut(run as usize - 1) {
            record.finished = Some(Instant::now());
        }
        self.inner.active.fetch_sub(1, Ordering::SeqCst);

        let scripted = lock(&self.inner.script).get(&run).cloned();
        match scripted {
            Some(Script::Fail(message)) => bail!(message),
            Some(Script::Panic(message)) => panic!("{message}"),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<C: Send + 'static> Operation<C> for RecordingOperation {
    async fn run(&self, _ctx: C) -> Result<()> {
        self.record().await
    }

    fn name(&self) -> Cow<'_, str> {
        match lock(&self.inner.name).as_deref() {
            Some(name) => Cow::Owned(name.to_string()),
            None => Cow::Borrowed("recording_operation"),
        }
    }
}

/// An operation that records the context of every run.
#[derive(Debug)]
pub struct ContextLog<C> {
    seen: Arc<Mutex<Vec<C>>>,
}

impl<C> Clone for ContextLog<C> {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
        }
    }
}

impl<C> Default for ContextLog<C> {
    fn default() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<C: Clone> ContextLog<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<C> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl<C> Operation<C> for ContextLog<C>
where
    C: Send + 'static,
{
    async fn run(&self, ctx: C) -> Result<()> {
        lock(&self.seen).push(ctx);
        Ok(())
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("context_log")
    }
}
