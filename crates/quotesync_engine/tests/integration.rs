//! Integration tests for the sync engine against scripted remotes.

use async_trait::async_trait;
use parking_lot::Mutex;
use quotesync_engine::{
    CycleOutcome, FetchError, OutcomeKind, PromptDecision, RecordingPrompt, RemoteFetcher,
    RetryConfig, SyncConfig, SyncEngine, SyncError, SyncState, TriggerSource, UploadAck,
};
use quotesync_protocol::{
    Item, ItemDraft, ItemId, ItemStatus, OriginTag, Payload, ResolveError, Snapshot, Strategy,
};
use quotesync_store::{InMemoryPersistence, JsonFilePersistence, RecordStore};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A remote that serves a settable snapshot and accepts uploads.
#[derive(Default)]
struct ScriptedFetcher {
    remote: Mutex<Snapshot>,
    fetches: AtomicUsize,
    hang_fetches: AtomicUsize,
    panic_next_fetch: AtomicBool,
    grow_each_fetch: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    fail_uploads: AtomicBool,
    next_id: AtomicU64,
    on_upload: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl ScriptedFetcher {
    fn serving(items: Vec<Item>, version: u64) -> Arc<Self> {
        let fetcher = Self::default();
        *fetcher.remote.lock() = Snapshot::new(items, version);
        Arc::new(fetcher)
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn remote(&self) -> Snapshot {
        self.remote.lock().clone()
    }

    fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl RemoteFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.panic_next_fetch.swap(false, Ordering::SeqCst) {
            panic!("remote blew up");
        }
        if self.hang_fetches.load(Ordering::SeqCst) > 0 {
            self.hang_fetches.fetch_sub(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }

        let mut remote = self.remote.lock();
        if self.grow_each_fetch.load(Ordering::SeqCst) {
            remote
                .items
                .push(Item::remote(format!("r-{n}"), Payload::new("grown", "Remote")));
            remote.version += 1;
        }
        Ok(remote.clone())
    }

    async fn upload(&self, items: &[Item]) -> Result<Vec<UploadAck>, FetchError> {
        if let Some(hook) = self.on_upload.lock().as_ref() {
            hook();
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("upload refused".into()));
        }

        let mut remote = self.remote.lock();
        let mut acks = Vec::with_capacity(items.len());
        for item in items {
            // Known ids are updates; everything else gets a server id.
            if let Some(existing) = remote.items.iter_mut().find(|r| r.id == item.id) {
                existing.payload = item.payload.clone();
                acks.push(UploadAck {
                    local_id: item.id.clone(),
                    remote_id: item.id.clone(),
                });
                continue;
            }
            let id = ItemId::new(format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
            remote.items.push(Item {
                id: id.clone(),
                origin: OriginTag::Remote,
                status: ItemStatus::Synced,
                ..item.clone()
            });
            acks.push(UploadAck {
                local_id: item.id.clone(),
                remote_id: id,
            });
        }
        remote.version += 1;
        Ok(acks)
    }
}

fn config(strategy: Strategy) -> SyncConfig {
    SyncConfig::new(
        Duration::from_secs(60),
        strategy,
        Duration::from_secs(1),
        RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false),
    )
}

fn quote(id: &str, text: &str) -> Item {
    Item::remote(id, Payload::new(text, "Life"))
}

fn store_with(items: Vec<Item>) -> (Arc<InMemoryPersistence>, Arc<RecordStore>) {
    let persistence = Arc::new(InMemoryPersistence::with_snapshot(Snapshot::new(items, 1)));
    let store = Arc::new(RecordStore::open(persistence.clone()).unwrap());
    (persistence, store)
}

fn texts(store: &RecordStore) -> Vec<String> {
    store
        .current()
        .items
        .into_iter()
        .map(|item| item.payload.text)
        .collect()
}

#[tokio::test]
async fn server_wins_replaces_diverged_text() {
    let (_, store) = store_with(vec![quote("1", "A")]);
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "B")], 2);
    let engine = SyncEngine::new(config(Strategy::ServerWins), store.clone(), fetcher).unwrap();

    let outcome = engine.sync_now().await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.kind, OutcomeKind::Conflict);
    assert_eq!(report.strategy, Some(Strategy::ServerWins));

    assert_eq!(texts(&store), vec!["B".to_string()]);
    assert_eq!(store.version(), 2);
    let metadata = engine.metadata();
    assert_eq!(metadata.conflicts_resolved, 1);
    assert_eq!(metadata.remote_version, 2);
    assert!(metadata.last_sync_time.is_some());
}

#[tokio::test]
async fn local_wins_keeps_local_text_and_drops_remote_additions() {
    let (_, store) = store_with(vec![quote("1", "A")]);
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "B"), quote("2", "C")], 2);
    let engine =
        SyncEngine::new(config(Strategy::ServerWins), store.clone(), fetcher.clone()).unwrap();
    engine.set_strategy(Strategy::LocalWins);

    let report = engine.sync_now().await.unwrap().report().cloned().unwrap();
    assert_eq!(report.strategy, Some(Strategy::LocalWins));

    let current = store.current();
    assert_eq!(current.len(), 1);
    assert_eq!(current.items[0].payload.text, "A");

    // The diverged item was re-queued and pushed again as an update.
    assert_eq!(report.uploaded, 1);
    assert_eq!(current.items[0].id, ItemId::new("1"));
    assert_eq!(current.items[0].status, ItemStatus::Uploaded);
    let remote = fetcher.remote();
    assert_eq!(remote.get(&ItemId::new("1")).unwrap().payload.text, "A");
}

#[tokio::test]
async fn trigger_during_fetch_is_rejected_without_double_apply() {
    let (_, store) = store_with(Vec::new());
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "A")], 1);
    let gate = fetcher.gated();
    let engine = Arc::new(
        SyncEngine::new(config(Strategy::Merge), store.clone(), fetcher.clone()).unwrap(),
    );

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.trigger(TriggerSource::Auto).await })
    };
    let mut states = engine.subscribe();
    states
        .wait_for(|state| *state == SyncState::Fetching)
        .await
        .unwrap();

    let manual = engine.sync_now().await.unwrap();
    assert!(matches!(
        manual,
        CycleOutcome::Rejected {
            state: SyncState::Fetching
        }
    ));

    gate.notify_one();
    let first = running.await.unwrap().unwrap();
    assert!(matches!(first, CycleOutcome::Completed(_)));

    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(store.version(), 2);
    assert_eq!(engine.stats().coalesced_triggers, 1);
    assert_eq!(engine.stats().cycles_completed, 1);
    assert_eq!(engine.state(), SyncState::Idle);
}

#[tokio::test(start_paused = true)]
async fn exhausted_timeouts_return_to_idle_and_next_tick_still_fires() {
    let (_, store) = store_with(vec![quote("1", "A")]);
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "A"), quote("2", "B")], 5);
    fetcher.hang_fetches.store(3, Ordering::SeqCst);
    let engine =
        Arc::new(SyncEngine::new(config(Strategy::Merge), store.clone(), fetcher.clone()).unwrap());

    assert!(engine.start_auto_sync());
    assert!(engine.is_auto_syncing());
    assert!(!engine.start_auto_sync());

    // First tick: three 1s timeouts with 100ms and 200ms backoff in between.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let stats = engine.stats();
    assert_eq!(fetcher.fetch_count(), 3);
    assert_eq!(stats.failed_cycles, 1);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.cycles_completed, 0);
    assert!(stats.last_error.unwrap().contains("timed out"));
    assert_eq!(engine.state(), SyncState::Idle);
    assert_eq!(engine.metadata().conflicts_resolved, 0);
    assert!(engine.metadata().last_sync_time.is_none());
    assert_eq!(store.len(), 1);

    // Second tick at t = 60s succeeds.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let stats = engine.stats();
    assert_eq!(fetcher.fetch_count(), 4);
    assert_eq!(stats.cycles_completed, 1);
    assert!(stats.last_error.is_none());
    assert_eq!(store.len(), 2);

    assert!(engine.stop_auto_sync().await);
    assert!(!engine.is_auto_syncing());
    assert!(!engine.stop_auto_sync().await);
}

#[tokio::test(start_paused = true)]
async fn cancelled_cycle_returns_to_idle_and_next_sync_runs() {
    let (_, store) = store_with(vec![quote("1", "A")]);
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "A"), quote("2", "B")], 2);
    fetcher.hang_fetches.store(1, Ordering::SeqCst);
    let engine = SyncEngine::new(config(Strategy::Merge), store.clone(), fetcher.clone()).unwrap();

    let cancelled = tokio::time::timeout(Duration::from_millis(50), engine.sync_now()).await;
    assert!(cancelled.is_err());
    assert_eq!(engine.state(), SyncState::Idle);
    assert_eq!(engine.stats().failed_cycles, 1);
    assert!(engine
        .stats()
        .last_error
        .unwrap()
        .contains("interrupted while fetching"));

    let outcome = engine.sync_now().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Completed(_)));
    assert_eq!(fetcher.fetch_count(), 2);
    assert_eq!(store.len(), 2);
    assert_eq!(engine.state(), SyncState::Idle);
}

#[tokio::test]
async fn panicking_fetch_does_not_wedge_the_engine() {
    let (_, store) = store_with(Vec::new());
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "A")], 1);
    fetcher.panic_next_fetch.store(true, Ordering::SeqCst);
    let engine = Arc::new(
        SyncEngine::new(config(Strategy::Merge), store.clone(), fetcher.clone()).unwrap(),
    );

    let crashed = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync_now().await })
    };
    assert!(crashed.await.unwrap_err().is_panic());
    assert_eq!(engine.state(), SyncState::Idle);

    assert!(matches!(
        engine.sync_now().await.unwrap(),
        CycleOutcome::Completed(_)
    ));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn ask_user_blocks_until_a_strategy_is_supplied() {
    let (_, store) = store_with(vec![quote("1", "A")]);
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "B"), quote("2", "C")], 3);
    let prompt = Arc::new(RecordingPrompt::new());
    let engine = SyncEngine::new(config(Strategy::AskUser), store.clone(), fetcher.clone())
        .unwrap()
        .with_prompt(prompt.clone());

    assert!(matches!(
        engine.sync_now().await.unwrap(),
        CycleOutcome::Blocked
    ));
    assert_eq!(engine.state(), SyncState::Blocked);
    assert_eq!(prompt.count(), 1);
    assert_eq!(prompt.last().unwrap().modified[0].id(), &ItemId::new("1"));
    assert!(engine.pending_conflict().is_some());
    assert_eq!(store.version(), 1);

    // Blocked is backpressure: new triggers are dropped.
    assert!(engine.sync_now().await.unwrap().is_rejected());
    assert_eq!(fetcher.fetch_count(), 1);

    // AskUser cannot answer a prompt; KeepBlocked changes nothing.
    assert!(matches!(
        engine
            .resolve_pending(PromptDecision::Resolve(Strategy::AskUser))
            .await,
        Err(SyncError::Resolve(ResolveError::DeferredStrategy))
    ));
    assert!(matches!(
        engine.resolve_pending(PromptDecision::KeepBlocked).await,
        Ok(CycleOutcome::Blocked)
    ));
    assert_eq!(engine.state(), SyncState::Blocked);

    // A quote added while blocked survives the resolution.
    store
        .insert(ItemDraft::new(Payload::new("Added while blocked", "Life")))
        .unwrap();

    let outcome = engine
        .resolve_pending(PromptDecision::Resolve(Strategy::Merge))
        .await
        .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.strategy, Some(Strategy::Merge));
    assert_eq!(report.uploaded, 1);

    assert_eq!(engine.state(), SyncState::Idle);
    assert!(engine.pending_conflict().is_none());
    assert_eq!(engine.metadata().conflicts_resolved, 1);
    let mut all = texts(&store);
    all.sort();
    assert_eq!(all, vec!["Added while blocked", "B", "C"]);
}

#[tokio::test]
async fn discard_returns_to_idle_without_touching_the_store() {
    let (_, store) = store_with(vec![quote("1", "A")]);
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "B")], 2);
    let engine = SyncEngine::new(config(Strategy::AskUser), store.clone(), fetcher).unwrap();

    engine.sync_now().await.unwrap();
    assert_eq!(engine.state(), SyncState::Blocked);

    let outcome = engine.resolve_pending(PromptDecision::Discard).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Discarded));
    assert_eq!(engine.state(), SyncState::Idle);
    assert!(engine.pending_conflict().is_none());
    assert_eq!(texts(&store), vec!["A".to_string()]);
    assert_eq!(store.version(), 1);
    assert_eq!(engine.stats().conflicts_discarded, 1);

    // The remote still differs, so the next cycle asks again.
    assert!(matches!(
        engine.sync_now().await.unwrap(),
        CycleOutcome::Blocked
    ));
    assert_eq!(engine.stats().conflicts_deferred, 2);
}

#[tokio::test]
async fn upload_acks_replace_local_ids_and_next_fetch_confirms() {
    let (_, store) = store_with(Vec::new());
    let fetcher = ScriptedFetcher::serving(Vec::new(), 0);
    let engine = SyncEngine::new(config(Strategy::Merge), store.clone(), fetcher.clone()).unwrap();

    let local = store
        .insert(ItemDraft::new(Payload::new("Fresh quote", "Life")).with_id("tmp-1"))
        .unwrap();
    assert_eq!(local.snapshot.items[0].status, ItemStatus::Pending);

    let report = engine.sync_now().await.unwrap().report().cloned().unwrap();
    assert_eq!(report.kind, OutcomeKind::NoConflict);
    assert_eq!(report.uploaded, 1);

    let current = store.current();
    assert_eq!(current.items[0].id, ItemId::new("srv-1"));
    assert_eq!(current.items[0].status, ItemStatus::Uploaded);
    assert_eq!(fetcher.remote().len(), 1);

    // The server now returns it: the item is confirmed, no conflict.
    let report = engine.sync_now().await.unwrap().report().cloned().unwrap();
    assert_eq!(report.kind, OutcomeKind::NoConflict);
    assert_eq!(report.uploaded, 0);
    assert_eq!(store.current().items[0].status, ItemStatus::Synced);
    assert_eq!(engine.stats().items_uploaded, 1);
}

#[tokio::test]
async fn upload_failure_leaves_items_pending_and_completes_the_cycle() {
    let (_, store) = store_with(Vec::new());
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "A")], 1);
    fetcher.fail_uploads.store(true, Ordering::SeqCst);
    let engine = SyncEngine::new(config(Strategy::Merge), store.clone(), fetcher).unwrap();

    store
        .insert(ItemDraft::new(Payload::new("Unsent", "Life")).with_id("tmp-1"))
        .unwrap();

    let outcome = engine.sync_now().await.unwrap();
    assert_eq!(outcome.report().unwrap().uploaded, 0);
    let current = store.current();
    let unsent = current.get(&ItemId::new("tmp-1")).unwrap();
    assert_eq!(unsent.status, ItemStatus::Pending);
    assert_eq!(engine.stats().cycles_completed, 1);
    assert_eq!(engine.stats().failed_cycles, 0);
}

#[tokio::test]
async fn insert_during_upload_is_kept() {
    let (_, store) = store_with(Vec::new());
    let fetcher = ScriptedFetcher::serving(Vec::new(), 0);
    {
        let store = store.clone();
        *fetcher.on_upload.lock() = Some(Box::new(move || {
            store
                .insert(ItemDraft::new(Payload::new("Typed during upload", "Life")).with_id("tmp-2"))
                .unwrap();
        }));
    }
    let engine = SyncEngine::new(config(Strategy::Merge), store.clone(), fetcher).unwrap();

    store
        .insert(ItemDraft::new(Payload::new("First", "Life")).with_id("tmp-1"))
        .unwrap();
    engine.sync_now().await.unwrap();

    let current = store.current();
    assert_eq!(current.len(), 2);
    assert_eq!(current.get(&ItemId::new("srv-1")).unwrap().payload.text, "First");
    assert_eq!(
        current.get(&ItemId::new("tmp-2")).unwrap().status,
        ItemStatus::Pending
    );
}

#[tokio::test]
async fn persistence_failure_does_not_fail_the_cycle() {
    let (persistence, store) = store_with(Vec::new());
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "A"), quote("2", "B")], 1);
    let engine = SyncEngine::new(
        config(Strategy::Merge).with_upload_pending(false),
        store.clone(),
        fetcher,
    )
    .unwrap();

    persistence.set_fail_saves(true);
    let outcome = engine.sync_now().await.unwrap();
    assert!(outcome.report().unwrap().applied);
    assert_eq!(store.len(), 2);
    assert!(store.is_dirty());
    assert_eq!(engine.stats().persist_warnings, 1);
    assert_eq!(persistence.saved().unwrap().len(), 0);

    persistence.set_fail_saves(false);
    store.flush().unwrap();
    assert_eq!(persistence.saved().unwrap().len(), 2);
}

#[tokio::test]
async fn synced_collection_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quotes.json");
    let fetcher = ScriptedFetcher::serving(vec![quote("1", "A"), quote("2", "B")], 4);

    {
        let persistence = Arc::new(JsonFilePersistence::open(&path).unwrap());
        let store = Arc::new(RecordStore::open(persistence).unwrap());
        let engine =
            SyncEngine::new(config(Strategy::Merge), store, fetcher.clone()).unwrap();
        engine.sync_now().await.unwrap();
    }

    let persistence = Arc::new(JsonFilePersistence::open(&path).unwrap());
    let store = RecordStore::open(persistence).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.version(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_are_never_overwritten_by_cycles() {
    let (_, store) = store_with(Vec::new());
    let fetcher = ScriptedFetcher::serving(Vec::new(), 0);
    fetcher.grow_each_fetch.store(true, Ordering::SeqCst);
    let engine = Arc::new(
        SyncEngine::new(
            config(Strategy::Merge)
                .with_upload_pending(false)
                .with_max_apply_attempts(50),
            store.clone(),
            fetcher,
        )
        .unwrap(),
    );

    let writer = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || {
            for i in 0..200 {
                store
                    .insert(ItemDraft::new(Payload::new(format!("q{i}"), "Life")).with_id(format!("ins-{i}")))
                    .unwrap();
            }
        })
    };

    for _ in 0..20 {
        match engine.sync_now().await {
            Ok(_) | Err(SyncError::ApplyContention { .. }) => {}
            Err(e) => panic!("unexpected sync error: {e}"),
        }
    }
    writer.await.unwrap();

    let current = store.current();
    for i in 0..200 {
        assert!(current.contains(&ItemId::new(format!("ins-{i}"))));
    }
    assert_eq!(engine.state(), SyncState::Idle);
}
