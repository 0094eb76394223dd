//! Sync command implementation.

use crate::local::open_store;
use crate::prompt::{ask_decision, TerminalPrompt};
use crate::server::{FileServer, COLLECTION_PATH};
use quotesync_engine::{
    CycleOutcome, HttpFetcher, OutcomeKind, PromptDecision, SyncConfig, SyncEngine, SyncResult,
};
use quotesync_store::RecordStore;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Engine type used by the CLI.
pub type QuoteEngine = SyncEngine<HttpFetcher<FileServer>>;

/// Builds an engine syncing `store` against the server file at `remote_path`.
pub fn build_engine(
    store: Arc<RecordStore>,
    remote_path: &Path,
    config: SyncConfig,
) -> SyncResult<QuoteEngine> {
    let fetcher = HttpFetcher::new(FileServer::new(remote_path), COLLECTION_PATH);
    Ok(SyncEngine::new(config, store, fetcher)?.with_prompt(Arc::new(TerminalPrompt)))
}

/// One-line description of a cycle outcome.
pub fn summarize(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Completed(report) => {
            let what = match (report.kind, report.strategy) {
                (OutcomeKind::NoConflict, _) => "already up to date".to_string(),
                (OutcomeKind::CleanMerge, _) => "merged new quotes from the server".to_string(),
                (OutcomeKind::Conflict, Some(strategy)) => {
                    format!("resolved a conflict with {strategy}")
                }
                (OutcomeKind::Conflict, None) => "resolved a conflict".to_string(),
            };
            format!(
                "Sync complete: {what}; uploaded {} quote(s); local version {}, server version {}.",
                report.uploaded, report.local_version, report.remote_version
            )
        }
        CycleOutcome::Blocked => "Sync paused: a conflict is waiting for a decision.".to_string(),
        CycleOutcome::Discarded => "Conflict discarded; local quotes unchanged.".to_string(),
        CycleOutcome::Rejected { state } => format!("Sync skipped: engine is {state}."),
    }
}

/// Asks the user about the pending conflict until it is settled or kept.
pub async fn settle_interactively(
    engine: &QuoteEngine,
) -> Result<CycleOutcome, Box<dyn std::error::Error>> {
    loop {
        let decision = tokio::task::spawn_blocking(ask_decision).await??;
        match engine.resolve_pending(decision).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if matches!(decision, PromptDecision::Resolve(_)) => {
                warn!(error = %e, "resolution failed; conflict still pending");
                println!("Could not apply the resolution: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Runs the sync command.
pub fn run(
    store_path: &Path,
    remote_path: &Path,
    config: SyncConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(store_path)?;
    let engine = build_engine(Arc::clone(&store), remote_path, config)?;
    let runtime = tokio::runtime::Runtime::new()?;

    let outcome = runtime.block_on(async {
        let outcome = engine.sync_now().await?;
        if matches!(outcome, CycleOutcome::Blocked) {
            return settle_interactively(&engine).await;
        }
        Ok::<_, Box<dyn std::error::Error>>(outcome)
    })?;
    println!("{}", summarize(&outcome));

    if store.is_dirty() {
        store.flush()?;
    }
    Ok(())
}
