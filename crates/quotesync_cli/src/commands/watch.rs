//! Watch command implementation.

use super::sync::{build_engine, settle_interactively, summarize, QuoteEngine};
use crate::local::open_store;
use quotesync_engine::{SyncConfig, SyncState, SyncStats};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Runs the watch command until Ctrl-C.
pub fn run(
    store_path: &Path,
    remote_path: &Path,
    config: SyncConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(store_path)?;
    let engine = Arc::new(build_engine(Arc::clone(&store), remote_path, config)?);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(watch(Arc::clone(&engine)))?;

    print_stats(&engine.stats());
    if store.is_dirty() {
        store.flush()?;
    }
    Ok(())
}

async fn watch(engine: Arc<QuoteEngine>) -> Result<(), Box<dyn std::error::Error>> {
    let mut states = engine.subscribe();
    let interval = engine.config().sync_interval;
    // Re-asks about a conflict that was kept.
    let mut reminder = tokio::time::interval(interval);
    reminder.tick().await;

    engine.start_auto_sync();
    println!("Syncing every {interval:?}. Press Ctrl-C to stop.");

    let result = loop {
        let blocked = tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                state == SyncState::Blocked
            }
            _ = reminder.tick() => engine.state() == SyncState::Blocked,
        };
        if !blocked {
            continue;
        }

        match settle_interactively(&engine).await {
            Ok(outcome) => println!("{}", summarize(&outcome)),
            Err(e) => break Err(e),
        }
    };

    engine.stop_auto_sync().await;
    info!("watch stopped");
    result
}

fn print_stats(stats: &SyncStats) {
    println!("Cycles completed:   {}", stats.cycles_completed);
    println!("Failed cycles:      {}", stats.failed_cycles);
    println!("Skipped triggers:   {}", stats.coalesced_triggers);
    println!("Conflicts deferred: {}", stats.conflicts_deferred);
    println!("Quotes uploaded:    {}", stats.items_uploaded);
    if let Some(error) = &stats.last_error {
        println!("Last error:         {error}");
    }
}
