//! Triggers from many tasks and threads, on real time.

use std::sync::Arc;
use std::time::Duration;

use coalesce_core::{CoalesceState, Coalescer, TriggerOutcome};
use coalesce_testing::RecordingOperation;
use tokio::time::Instant;

const TASKS: usize = 8;
const TRIGGERS_PER_TASK: usize = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_never_overlap_runs() {
    let op = RecordingOperation::with_duration(Duration::from_millis(5));
    let coalescer = Coalescer::new(Duration::from_millis(2), op.clone());

    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let coalescer = coalescer.clone();
        handles.push(tokio::spawn(async move {
            let mut last = Instant::now();
            for _ in 0..TRIGGERS_PER_TASK {
                tokio::time::sleep(Duration::from_micros(fastrand::u64(0..3_000))).await;
                last = Instant::now();
                coalescer.trigger();
            }
            last
        }));
    }

    let mut last_trigger = None;
    for handle in handles {
        let last = handle.await.unwrap();
        last_trigger = last_trigger.max(Some(last));
    }

    coalescer.wait_idle().await;

    let stats = coalescer.stats();
    assert_eq!(op.max_concurrency(), 1, "runs overlapped");
    assert_eq!(stats.triggers, (TASKS * TRIGGERS_PER_TASK) as u64);
    assert_eq!(stats.runs_started, op.run_count() as u64);
    assert_eq!(stats.runs_completed, stats.runs_started);
    assert!(stats.runs_started < stats.triggers, "nothing was coalesced");

    // The last trigger is always covered by a run that starts after it.
    let last_start = *op.starts().last().expect("at least one run");
    assert!(last_start >= last_trigger.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_run_is_followed_by_at_most_one_follow_up() {
    let op = RecordingOperation::with_duration(Duration::from_millis(250));
    let coalescer = Coalescer::new(Duration::from_millis(5), op.clone());

    coalescer.trigger();
    let mut rx = coalescer.subscribe();
    rx.wait_for(CoalesceState::is_running).await.unwrap();

    let barrier = Arc::new(tokio::sync::Barrier::new(TASKS));
    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let coalescer = coalescer.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            coalescer.trigger()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), TriggerOutcome::FollowUpRequested);
    }

    coalescer.wait_idle().await;
    assert_eq!(op.run_count(), 2);
}

#[test]
fn triggers_from_plain_threads_with_an_explicit_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let op = RecordingOperation::new();
    let coalescer = Coalescer::builder(op.clone())
        .delay(Duration::from_millis(10))
        .runtime(runtime.handle().clone())
        .build(());

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let trigger = coalescer.trigger_fn();
            std::thread::spawn(move || trigger())
        })
        .collect();

    let outcomes: Vec<TriggerOutcome> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    assert!(outcomes.contains(&TriggerOutcome::Armed));

    runtime.block_on(coalescer.wait_idle());

    assert!(op.run_count() >= 1);
    assert_eq!(op.max_concurrency(), 1);
    assert_eq!(coalescer.stats().runs_completed, op.run_count() as u64);
}
