//! The sync scheduler.

use crate::config::SyncConfig;
use crate::error::{FetchError, SyncError, SyncResult};
use crate::fetcher::{RemoteFetcher, UploadAck};
use crate::prompt::{ConflictPrompt, PromptDecision};
use crate::state::{
    CycleOutcome, CycleReport, OutcomeKind, SyncMetadata, SyncState, SyncStats, TriggerSource,
};
use parking_lot::{Mutex, RwLock};
use quotesync_protocol::{
    auto_resolve, detect, resolve, Conflict, ConflictOutcome, Item, ItemId, ItemStatus,
    ResolveError, Snapshot, Strategy,
};
use quotesync_store::{RecordStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

struct AutoSync {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Puts the engine back to rest if a cycle ends without settling its state.
///
/// A cycle can stop at any `.await` when its future is dropped, or unwind
/// from a panic. The engine then returns to `Blocked` if a conflict is still
/// pending and to `Idle` otherwise.
struct CycleGuard<'a, F: RemoteFetcher> {
    engine: &'a SyncEngine<F>,
    finished: bool,
}

impl<'a, F: RemoteFetcher> CycleGuard<'a, F> {
    fn new(engine: &'a SyncEngine<F>) -> Self {
        Self {
            engine,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl<F: RemoteFetcher> Drop for CycleGuard<'_, F> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let engine = self.engine;
        let rest = if engine.metadata.read().pending_conflict.is_some() {
            SyncState::Blocked
        } else {
            SyncState::Idle
        };
        let mut interrupted = None;
        engine.state.send_if_modified(|state| {
            if !state.is_active() {
                return false;
            }
            interrupted = Some(*state);
            *state = rest;
            true
        });
        if let Some(state) = interrupted {
            {
                let mut stats = engine.stats.write();
                stats.failed_cycles += 1;
                stats.last_error = Some(format!("sync cycle interrupted while {state}"));
            }
            warn!(%state, next = %rest, "sync cycle interrupted");
        }
    }
}

/// The sync engine coordinates cycles between the record store and a remote.
///
/// A cycle is fetch → detect → resolve → apply → upload. At most one cycle
/// runs at a time: a trigger that arrives while the engine is not
/// [`SyncState::Idle`] is dropped and reported as
/// [`CycleOutcome::Rejected`].
///
/// # State machine
///
/// ```text
/// Idle ──trigger──▶ Fetching ──ok──▶ Resolving ──▶ Applying ──▶ Idle
///                      │                 │
///                      └─failed─▶ Idle   └─AskUser─▶ Blocked
///
/// Blocked ──Resolve(strategy)──▶ Applying
/// Blocked ──Discard──▶ Idle
/// ```
///
/// The state is published on a `watch` channel; see [`subscribe`](Self::subscribe).
pub struct SyncEngine<F: RemoteFetcher> {
    config: SyncConfig,
    store: Arc<RecordStore>,
    fetcher: F,
    prompt: Option<Arc<dyn ConflictPrompt>>,
    strategy: RwLock<Strategy>,
    state: watch::Sender<SyncState>,
    metadata: RwLock<SyncMetadata>,
    stats: RwLock<SyncStats>,
    auto_sync: Mutex<Option<AutoSync>>,
}

impl<F: RemoteFetcher> SyncEngine<F> {
    /// Creates a new sync engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the configuration is unusable.
    pub fn new(config: SyncConfig, store: Arc<RecordStore>, fetcher: F) -> SyncResult<Self> {
        config.validate()?;
        let (state, _) = watch::channel(SyncState::Idle);
        let metadata = SyncMetadata {
            local_version: store.version(),
            ..SyncMetadata::default()
        };
        Ok(Self {
            strategy: RwLock::new(config.default_strategy),
            config,
            store,
            fetcher,
            prompt: None,
            state,
            metadata: RwLock::new(metadata),
            stats: RwLock::new(SyncStats::default()),
            auto_sync: Mutex::new(None),
        })
    }

    /// Sets the collaborator notified when a conflict is deferred.
    pub fn with_prompt(mut self, prompt: Arc<dyn ConflictPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the record store.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Returns the fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Gets the current metadata.
    ///
    /// `local_version` is read from the store, so inserts made since the
    /// last cycle are reflected.
    pub fn metadata(&self) -> SyncMetadata {
        let mut metadata = self.metadata.read().clone();
        metadata.local_version = self.store.version();
        metadata
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the conflict awaiting the user, if any.
    pub fn pending_conflict(&self) -> Option<Conflict> {
        self.metadata.read().pending_conflict.clone()
    }

    /// Gets the strategy applied to new conflicts.
    pub fn strategy(&self) -> Strategy {
        *self.strategy.read()
    }

    /// Sets the strategy applied to new conflicts.
    ///
    /// A conflict that is already pending keeps waiting for the user.
    pub fn set_strategy(&self, strategy: Strategy) {
        info!(%strategy, "conflict strategy changed");
        *self.strategy.write() = strategy;
    }

    /// Runs a manual cycle. Same as `trigger(TriggerSource::Manual)`.
    ///
    /// # Errors
    ///
    /// See [`trigger`](Self::trigger).
    pub async fn sync_now(&self) -> SyncResult<CycleOutcome> {
        self.trigger(TriggerSource::Manual).await
    }

    /// Starts a cycle if the engine is idle.
    ///
    /// Returns [`CycleOutcome::Rejected`] without doing anything if a cycle
    /// is running or a conflict is pending.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the cycle. The engine is back in
    /// [`SyncState::Idle`] and the store is unchanged unless the error
    /// happened after a successful apply.
    ///
    /// Dropping the returned future mid-cycle also puts the engine back in
    /// [`SyncState::Idle`].
    pub async fn trigger(&self, source: TriggerSource) -> SyncResult<CycleOutcome> {
        if let Err(state) = self.begin_cycle() {
            self.stats.write().coalesced_triggers += 1;
            debug!(?source, %state, "trigger dropped; engine is not idle");
            return Ok(CycleOutcome::Rejected { state });
        }
        info!(?source, "sync cycle started");

        let guard = CycleGuard::new(self);
        let result = self.run_cycle(Instant::now()).await;
        guard.finish();
        result
    }

    async fn run_cycle(&self, started: Instant) -> SyncResult<CycleOutcome> {
        let remote = match self.fetch_with_retry().await {
            Ok(remote) => remote,
            Err(e) => return Err(self.fail_cycle(e.into(), SyncState::Idle)),
        };

        self.set_state(SyncState::Resolving);
        match self.settle(remote, None, started).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail_cycle(e, SyncState::Idle)),
        }
    }

    /// Answers the pending conflict.
    ///
    /// `Resolve(strategy)` re-runs detection between the *current* local
    /// snapshot and the stored remote snapshot, so items inserted while
    /// blocked are kept, then applies with `strategy`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NoPendingConflict`] if the engine is not blocked
    /// - [`SyncError::Resolve`] for `Resolve(AskUser)`
    /// - any apply error; the engine then stays blocked on the same conflict
    pub async fn resolve_pending(&self, decision: PromptDecision) -> SyncResult<CycleOutcome> {
        match decision {
            PromptDecision::KeepBlocked => {
                if self.state() == SyncState::Blocked {
                    debug!("conflict left pending");
                    Ok(CycleOutcome::Blocked)
                } else {
                    Err(SyncError::NoPendingConflict)
                }
            }
            PromptDecision::Discard => self.discard_pending(),
            PromptDecision::Resolve(strategy) => self.resolve_with(strategy).await,
        }
    }

    fn discard_pending(&self) -> SyncResult<CycleOutcome> {
        let mut discarded = None;
        let changed = self.state.send_if_modified(|state| {
            if *state != SyncState::Blocked {
                return false;
            }
            discarded = self.metadata.write().pending_conflict.take();
            *state = SyncState::Idle;
            true
        });
        if !changed {
            return Err(SyncError::NoPendingConflict);
        }

        self.stats.write().conflicts_discarded += 1;
        info!(
            deltas = discarded.as_ref().map_or(0, Conflict::delta_count),
            "pending conflict discarded"
        );
        Ok(CycleOutcome::Discarded)
    }

    async fn resolve_with(&self, strategy: Strategy) -> SyncResult<CycleOutcome> {
        if !strategy.auto_resolves() {
            return Err(ResolveError::DeferredStrategy.into());
        }
        self.transition(SyncState::Blocked, SyncState::Applying)
            .map_err(|_| SyncError::NoPendingConflict)?;

        let pending = self.metadata.read().pending_conflict.clone();
        let Some(conflict) = pending else {
            self.set_state(SyncState::Idle);
            return Err(SyncError::NoPendingConflict);
        };
        info!(%strategy, "resolving pending conflict");

        let guard = CycleGuard::new(self);
        let result = match self.settle(conflict.remote, Some(strategy), Instant::now()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail_cycle(e, SyncState::Blocked)),
        };
        guard.finish();
        result
    }

    /// Detects, resolves and applies `remote` against the current store.
    ///
    /// Re-reads the store and resolves again whenever `apply` loses the race
    /// against an insert.
    async fn settle(
        &self,
        remote: Snapshot,
        chosen: Option<Strategy>,
        started: Instant,
    ) -> SyncResult<CycleOutcome> {
        let attempts = self.config.max_apply_attempts;
        for attempt in 1..=attempts {
            let local = self.store.current();
            let outcome = detect(&local, &remote);
            debug!(
                outcome = outcome.name(),
                attempt,
                local_version = local.version,
                remote_version = remote.version,
                "classified remote snapshot"
            );

            let (kind, strategy, resolved) = match outcome {
                ConflictOutcome::NoConflict => {
                    (OutcomeKind::NoConflict, None, auto_resolve(&local, &remote))
                }
                ConflictOutcome::CleanMerge { .. } => {
                    (OutcomeKind::CleanMerge, None, auto_resolve(&local, &remote))
                }
                ConflictOutcome::Conflict(conflict) => {
                    let strategy = chosen.unwrap_or_else(|| self.strategy());
                    if !strategy.auto_resolves() {
                        return Ok(self.block(conflict));
                    }
                    let resolved = resolve(&conflict, strategy)?;
                    (OutcomeKind::Conflict, Some(strategy), resolved)
                }
            };

            self.set_state(SyncState::Applying);
            match self.apply_changes(&local, resolved) {
                Ok(applied) => {
                    let strategy = strategy.or(chosen);
                    return Ok(self.complete(kind, strategy, applied, &remote, started).await);
                }
                Err(StoreError::StaleSnapshot { based_on, current }) => {
                    debug!(
                        based_on,
                        current, attempt, "store moved during the cycle; resolving again"
                    );
                    self.set_state(SyncState::Resolving);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SyncError::ApplyContention { attempts })
    }

    fn apply_changes(&self, local: &Snapshot, resolved: Snapshot) -> Result<bool, StoreError> {
        if resolved.items == local.items {
            return Ok(false);
        }
        let commit = self.store.apply(resolved)?;
        if !commit.is_persisted() {
            self.stats.write().persist_warnings += 1;
        }
        Ok(true)
    }

    async fn complete(
        &self,
        kind: OutcomeKind,
        strategy: Option<Strategy>,
        applied: bool,
        remote: &Snapshot,
        started: Instant,
    ) -> CycleOutcome {
        // Applied; an interrupted upload must not bring the conflict back.
        self.metadata.write().pending_conflict = None;
        let uploaded = if self.config.upload_pending {
            self.upload_pending().await
        } else {
            0
        };
        let local_version = self.store.version();
        let duration = started.elapsed();

        {
            let mut metadata = self.metadata.write();
            metadata.last_sync_time = Some(SystemTime::now());
            metadata.local_version = local_version;
            metadata.remote_version = remote.version;
            if strategy.is_some() {
                metadata.conflicts_resolved += 1;
            }
        }
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.items_uploaded += uploaded as u64;
            stats.last_outcome = Some(kind);
            stats.last_cycle_duration = Some(duration);
            stats.last_error = None;
        }

        info!(
            ?kind,
            ?strategy,
            applied,
            local_version,
            remote_version = remote.version,
            uploaded,
            "sync cycle completed"
        );
        self.set_state(SyncState::Idle);

        CycleOutcome::Completed(CycleReport {
            kind,
            strategy,
            applied,
            local_version,
            remote_version: remote.version,
            uploaded,
            duration,
        })
    }

    fn block(&self, conflict: Conflict) -> CycleOutcome {
        info!(
            modified = conflict.modified.len(),
            added_remote = conflict.added_remote.len(),
            added_local = conflict.added_local.len(),
            "conflict deferred to the user"
        );
        self.metadata.write().pending_conflict = Some(conflict.clone());
        self.stats.write().conflicts_deferred += 1;
        self.set_state(SyncState::Blocked);

        if let Some(prompt) = &self.prompt {
            prompt.present(&conflict);
        }
        CycleOutcome::Blocked
    }

    async fn fetch_with_retry(&self) -> Result<Snapshot, FetchError> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                self.stats.write().retries += 1;
                debug!(attempt, ?delay, "retrying fetch");
                tokio::time::sleep(delay).await;
            }

            match self.fetch_once().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = retry.max_attempts,
                        error = %e,
                        "fetch failed"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self) -> Result<Snapshot, FetchError> {
        let snapshot = match timeout(self.config.fetch_timeout, self.fetcher.fetch()).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::timed_out(self.config.fetch_timeout)),
        };
        if let Some(id) = snapshot.duplicate_id() {
            return Err(FetchError::InvalidData(format!(
                "remote snapshot repeats id {id}"
            )));
        }
        Ok(snapshot)
    }

    /// Uploads pending items and records the acknowledgements.
    ///
    /// Failures are logged and leave the items pending; they never fail the
    /// cycle. Returns the number of acknowledged items.
    async fn upload_pending(&self) -> usize {
        let pending: Vec<Item> = self
            .store
            .current()
            .items
            .into_iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let acks = match timeout(self.config.fetch_timeout, self.fetcher.upload(&pending)).await {
            Ok(Ok(acks)) => acks,
            Ok(Err(e)) => {
                warn!(error = %e, pending = pending.len(), "upload failed; items stay pending");
                return 0;
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.fetch_timeout,
                    pending = pending.len(),
                    "upload timed out; items stay pending"
                );
                return 0;
            }
        };
        if acks.is_empty() {
            return 0;
        }

        for _ in 0..self.config.max_apply_attempts {
            let current = self.store.current();
            match self.store.apply(confirm_uploads(&current, &acks)) {
                Ok(commit) => {
                    if !commit.is_persisted() {
                        self.stats.write().persist_warnings += 1;
                    }
                    debug!(
                        acked = acks.len(),
                        version = commit.snapshot.version,
                        "recorded upload acknowledgements"
                    );
                    return acks.len();
                }
                Err(StoreError::StaleSnapshot { .. }) => continue,
                Err(e) => {
                    warn!(error = %e, "failed to record upload acknowledgements");
                    return 0;
                }
            }
        }
        warn!(
            attempts = self.config.max_apply_attempts,
            "store kept changing; upload acknowledgements not recorded"
        );
        0
    }

    /// Moves a resting engine to `Fetching`, or reports the state that
    /// prevented it.
    fn begin_cycle(&self) -> Result<(), SyncState> {
        let mut observed = SyncState::Idle;
        let started = self.state.send_if_modified(|state| {
            observed = *state;
            if state.can_start_sync() {
                *state = SyncState::Fetching;
                true
            } else {
                false
            }
        });
        if started {
            debug!(from = %observed, to = %SyncState::Fetching, "state changed");
            Ok(())
        } else {
            Err(observed)
        }
    }

    fn transition(&self, from: SyncState, to: SyncState) -> Result<(), SyncState> {
        let mut observed = from;
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                observed = *state;
                false
            }
        });
        if changed {
            debug!(%from, %to, "state changed");
            Ok(())
        } else {
            Err(observed)
        }
    }

    fn set_state(&self, next: SyncState) {
        let mut previous = next;
        let changed = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(from = %previous, to = %next, "state changed");
        }
    }

    fn fail_cycle(&self, error: SyncError, next: SyncState) -> SyncError {
        warn!(error = %error, next = %next, "sync cycle failed");
        {
            let mut stats = self.stats.write();
            stats.failed_cycles += 1;
            stats.last_error = Some(error.to_string());
        }
        self.set_state(next);
        error
    }
}

impl<F: RemoteFetcher + 'static> SyncEngine<F> {
    /// Starts the periodic trigger. The first cycle runs immediately.
    ///
    /// Returns false if auto-sync is already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start_auto_sync(self: &Arc<Self>) -> bool {
        let mut slot = self.auto_sync.lock();
        if slot.as_ref().is_some_and(|auto| !auto.task.is_finished()) {
            return false;
        }

        let (shutdown, mut stopped) = oneshot::channel();
        let engine = Arc::clone(self);
        let period = self.config.sync_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        match engine.trigger(TriggerSource::Auto).await {
                            Ok(outcome) => debug!(?outcome, "automatic trigger finished"),
                            Err(e) => warn!(error = %e, "automatic sync cycle failed"),
                        }
                    }
                }
            }
            debug!("auto-sync loop exited");
        });

        *slot = Some(AutoSync { shutdown, task });
        info!(interval = ?period, "auto-sync started");
        true
    }

    /// Stops the periodic trigger and waits for a running cycle to finish.
    ///
    /// Returns false if auto-sync was not running.
    pub async fn stop_auto_sync(&self) -> bool {
        let auto = self.auto_sync.lock().take();
        let Some(auto) = auto else {
            return false;
        };
        // The loop may already have exited; a closed channel is fine.
        let _ = auto.shutdown.send(());
        if let Err(e) = auto.task.await {
            warn!(error = %e, "auto-sync task ended abnormally");
        }
        info!("auto-sync stopped");
        true
    }

    /// Returns true if the periodic trigger is running.
    pub fn is_auto_syncing(&self) -> bool {
        self.auto_sync
            .lock()
            .as_ref()
            .is_some_and(|auto| !auto.task.is_finished())
    }
}

/// Marks acknowledged pending items as uploaded under their server ids.
fn confirm_uploads(current: &Snapshot, acks: &[UploadAck]) -> Snapshot {
    let remote_ids: HashMap<&ItemId, &ItemId> = acks
        .iter()
        .map(|ack| (&ack.local_id, &ack.remote_id))
        .collect();
    let items = current
        .items
        .iter()
        .map(|item| match remote_ids.get(&item.id) {
            Some(remote_id) if item.status == ItemStatus::Pending => Item {
                id: (*remote_id).clone(),
                status: ItemStatus::Uploaded,
                ..item.clone()
            },
            _ => item.clone(),
        })
        .collect();
    Snapshot::new(items, current.version)
}
