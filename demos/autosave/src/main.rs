//! # Autosave Example
//!
//! An editor saves its document whenever it changes. Keystrokes arrive in
//! bursts; saving on every one would hammer the disk and let saves overlap.
//! Wrapping the save in a `Coalescer` turns each burst into one save, and
//! edits made while a save is in flight into exactly one more.
//!
//! Set `AUTOSAVE_CONFIG` to override the defaults, e.g.
//! `AUTOSAVE_CONFIG='{"delay_ms": 400}'`.

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use coalesce_core::{Coalescer, CoalescerConfig, Operation};
use tokio::sync::Mutex;
use tracing::{info, Level};

// ============================================================================
// Document
// ============================================================================

#[derive(Default)]
struct Document {
    text: Mutex<String>,
    revision: AtomicU64,
}

impl Document {
    async fn type_text(&self, s: &str) {
        self.text.lock().await.push_str(s);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Storage (simulated slow disk)
// ============================================================================

#[derive(Default)]
struct Disk {
    saved: Mutex<Vec<(u64, usize)>>,
}

impl Disk {
    async fn write(&self, revision: u64, bytes: usize) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(120)).await;
        if bytes > 64 * 1024 {
            bail!("document too large: {bytes} bytes");
        }
        self.saved.lock().await.push((revision, bytes));
        Ok(())
    }
}

// ============================================================================
// Operation
// ============================================================================

struct SaveDocument {
    disk: Arc<Disk>,
}

#[async_trait]
impl Operation<Arc<Document>> for SaveDocument {
    async fn run(&self, doc: Arc<Document>) -> Result<()> {
        let revision = doc.revision.load(Ordering::SeqCst);
        let bytes = doc.text.lock().await.len();

        info!(revision, bytes, "saving");
        self.disk.write(revision, bytes).await
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let config = match env::var("AUTOSAVE_CONFIG") {
        Ok(raw) => serde_json::from_str(&raw).context("parsing AUTOSAVE_CONFIG")?,
        Err(_) => CoalescerConfig::new(Duration::from_millis(250)).with_name("autosave"),
    };

    let disk = Arc::new(Disk::default());
    let doc = Arc::new(Document::default());

    let autosave = Coalescer::builder(SaveDocument {
        disk: Arc::clone(&disk),
    })
    .config(config)
    .build(Arc::clone(&doc));

    // First burst: typed well inside one delay window.
    for word in ["Coalescing ", "collapses ", "bursts. "] {
        doc.type_text(word).await;
        autosave.trigger();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    // Wait until the save is on its way, then keep typing while it runs.
    let mut state = autosave.subscribe();
    state.wait_for(|s| s.is_running()).await?;
    for word in ["Edits ", "during ", "a ", "save ", "queue ", "one ", "more."] {
        doc.type_text(word).await;
        autosave.trigger();
    }

    autosave.wait_idle().await;

    let saved = disk.saved.lock().await.clone();
    println!("saves: {saved:?}");
    println!(
        "stats: {}",
        serde_json::to_string_pretty(&autosave.stats()).context("rendering stats")?
    );

    Ok(())
}
