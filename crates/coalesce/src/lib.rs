//! # Coalesce
//!
//! Collapse bursts of triggers into single, deferred, never-overlapping runs
//! of an async operation.
//!
//! ## Core Concepts
//!
//! A [`Coalescer`] wraps one [`Operation`] and one delay:
//! - [`Coalescer::trigger`] = a request that the operation eventually run
//! - [`Operation::run`] = the work, awaited to completion
//!
//! The operation's context is either bound once ([`Coalescer`]) or supplied
//! by whichever trigger arms the timer ([`DynamicCoalescer::trigger_with`]).
//!
//! The key principle: **one burst = one run, and runs never overlap**.
//!
//! ## State Machine
//!
//! ```text
//!                 trigger()
//!   ┌──────┐  ─────────────►  ┌─────────┐   trigger(): absorbed
//!   │ Idle │                  │ Pending │ ◄────────────┐
//!   └──────┘                  └─────────┘ ─────────────┘
//!      ▲                           │
//!      │                           ▼ delay elapsed / follow-up spawned
//!      │  no triggers        ┌─────────┐   trigger(): in_progress += 1
//!      └──────────────────── │ Running │ ◄────────────┐
//!                            └─────────┘ ─────────────┘
//!                                  │
//!                                  ▼ in_progress > 1
//!                            Pending (no delay: follow-up task spawned)
//! ```
//!
//! ## Guarantees
//!
//! - **At least once after a burst**: every trigger is followed by a run that
//!   starts after it.
//! - **No overlap**: the next run starts only after the previous run's future
//!   has completed.
//! - **Collapsing, not queueing**: any number of triggers during a run produce
//!   exactly one follow-up, which starts immediately (no second delay).
//! - **Faults never wedge**: an `Err` or a panic from the operation is
//!   reported and the completion step runs regardless.
//!
//! Triggers return before the operation runs, so faults surface on
//! [`Coalescer::faults`] and in the `tracing` output, never to the caller.
//!
//! ## Example
//!
//! ```ignore
//! use coalesce_core::{Coalescer, Operation};
//! use std::time::Duration;
//!
//! struct Reindex { index: Arc<Index> }
//!
//! #[async_trait::async_trait]
//! impl Operation for Reindex {
//!     async fn run(&self, _: ()) -> anyhow::Result<()> {
//!         self.index.rebuild().await
//!     }
//! }
//!
//! let reindex = Coalescer::new(Duration::from_millis(50), Reindex { index });
//!
//! // Ten file events in quick succession: one rebuild.
//! for _ in 0..10 {
//!     reindex.trigger();
//! }
//! reindex.wait_idle().await;
//! ```
//!
//! ## What This Is Not
//!
//! - A scheduler across multiple operations
//! - A persistent queue (pending state is in-memory only)
//! - Cancellable: once armed or running, a run proceeds

mod builder;
mod coalescer;
mod config;
mod error;
mod operation;
mod state;
mod stats;

pub use builder::CoalescerBuilder;
pub use coalescer::{Coalescer, DynamicCoalescer};
pub use config::{CoalescerConfig, DEFAULT_DELAY, DEFAULT_FAULT_CAPACITY};
pub use error::{CoalesceError, Fault};
pub use operation::Operation;
pub use state::{CoalesceState, TriggerOutcome};
pub use stats::CoalescerStats;

// Re-export commonly used external types
pub use async_trait::async_trait;
