//! End-to-end engine behavior against in-memory and file-backed caches

use planboard_doc::{DocPath, PathError};
use planboard_engine::{
    Credentials, EngineConfig, EngineError, LoadStatus, Notice, NoticeKind, PlanningEngine,
    SchedulerState, StaticAuthenticator,
};
use planboard_persist::{
    FileCache, GatewayConfig, IntegrityProbe, MemoryCache, RetryPolicy, SnapshotCache, StaticSeed,
};
use planboard_test_utils::{
    cache_with_snapshot, sample_plan, FailingCache, FlakySeed, SlowCache, SNAPSHOT_KEY,
    VERSION_KEY,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn start(cache: &Arc<MemoryCache>, seed: Value) -> PlanningEngine {
    PlanningEngine::start(
        EngineConfig::default(),
        cache.clone(),
        Arc::new(StaticSeed::new(seed)),
    )
    .await
    .unwrap()
}

fn path(s: &str) -> DocPath {
    s.parse().unwrap()
}

fn cached(cache: &MemoryCache) -> Option<Value> {
    cache
        .get(SNAPSHOT_KEY)
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

fn success_count(notices: &[Notice]) -> usize {
    notices
        .iter()
        .filter(|n| n.kind == NoticeKind::Success)
        .count()
}

#[tokio::test(start_paused = true)]
async fn burst_of_mutations_commits_once_with_last_content() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({"metas": {"mensal": [0, 0, 0]}})).await;

    for i in 0..10 {
        engine.set("metas.mensal[1]", json!(i)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(engine.autosave_state(), SchedulerState::Pending);
    assert_eq!(cache.write_count(SNAPSHOT_KEY), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(cache.write_count(SNAPSHOT_KEY), 1);
    assert_eq!(cached(&cache), Some(json!({"metas": {"mensal": [0, 9, 0]}})));
    assert_eq!(cache.get(VERSION_KEY).as_deref(), Some("1"));
    // Auto-save leaves the dirty flag alone
    assert!(engine.is_dirty());
    assert!(engine.last_saved_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn manual_save_cancels_pending_autosave() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({"a": 1})).await;

    engine.set("a", json!(2)).unwrap();
    let receipt = engine.save().await.unwrap();
    assert_eq!(receipt.version, "1");
    assert!(!engine.is_dirty());
    assert_eq!(engine.autosave_state(), SchedulerState::Idle);
    assert_eq!(success_count(&engine.notices()), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.write_count(SNAPSHOT_KEY), 1);
    assert_eq!(cached(&cache), Some(json!({"a": 2})));
    // Notices expire after their TTL
    assert!(engine.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn nested_write_scenario() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({"a": {"b": 1}})).await;

    let mut notices = engine.notifications().subscribe();

    engine.set("a.b", json!(2)).unwrap();
    assert_eq!(*engine.document().unwrap(), json!({"a": {"b": 2}}));
    assert!(engine.is_dirty());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(cached(&cache), Some(json!({"a": {"b": 2}})));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut raised = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        raised.push(notice);
    }
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].kind, NoticeKind::Success);
    assert_eq!(cache.write_count(SNAPSHOT_KEY), 1);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_write_changes_nothing() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]})).await;
    engine.save().await.unwrap();
    let before = engine.document().unwrap();

    let err = engine.set("items[5].name", json!("x")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Path(PathError::OutOfRange { index: 5, len: 3, .. })
    ));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*engine.document().unwrap(), *before);
    assert!(!engine.is_dirty());
    assert_eq!(cache.write_count(SNAPSHOT_KEY), 1);
    assert_eq!(engine.autosave_state(), SchedulerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn sequences_are_never_created() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({})).await;

    assert!(matches!(
        engine.set("riscos[0].id", json!(1)),
        Err(EngineError::Path(PathError::MissingSequence { .. }))
    ));
    engine.set("novo.campo", json!(true)).unwrap();
    assert_eq!(engine.read(&path("novo")), Some(json!({"campo": true})));
}

#[tokio::test(start_paused = true)]
async fn version_mismatch_loads_seed() {
    let stale = json!({"old": true});
    let cache = cache_with_snapshot(&stale, "0");
    let engine = start(&cache, sample_plan()).await;

    assert_eq!(engine.status(), LoadStatus::Ready);
    assert_eq!(*engine.document().unwrap(), sample_plan());
    assert!(!engine.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn trusted_snapshot_skips_seed() {
    let saved = json!({"cenarios": [{"id": "salvo"}]});
    let cache = cache_with_snapshot(&saved, "1");
    let seed = Arc::new(FlakySeed::new(sample_plan(), 0));

    let engine = PlanningEngine::start(EngineConfig::default(), cache.clone(), seed.clone())
        .await
        .unwrap();

    assert_eq!(*engine.document().unwrap(), saved);
    assert_eq!(seed.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn integrity_failure_loads_seed() {
    let cache = cache_with_snapshot(&json!({"cenarios": []}), "1");
    let config = EngineConfig::default().with_gateway(
        GatewayConfig::default().with_probe(IntegrityProbe::new(path("cenarios"), "id")),
    );

    let engine = PlanningEngine::start(config, cache.clone(), Arc::new(StaticSeed::new(sample_plan())))
        .await
        .unwrap();
    assert_eq!(*engine.document().unwrap(), sample_plan());
}

#[tokio::test(start_paused = true)]
async fn export_then_import_roundtrips() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, sample_plan()).await;
    let exported = engine.export_snapshot().unwrap();
    assert!(exported.file_name.starts_with("planboard-planejamento-"));

    engine.set("kpis.nps", json!(10)).unwrap();
    engine.import_snapshot(&exported.contents).await.unwrap();

    assert_eq!(*engine.document().unwrap(), sample_plan());
    assert!(!engine.is_dirty());
    assert_eq!(cached(&cache), Some(sample_plan()));
}

#[tokio::test(start_paused = true)]
async fn invalid_import_changes_nothing() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({"a": 1})).await;
    engine.set("a", json!(2)).unwrap();
    let before = engine.document().unwrap();

    for text in ["{not json", "[1, 2, 3]", "42"] {
        let err = engine.import_snapshot(text).await.unwrap_err();
        assert!(matches!(err, EngineError::Import(_)));
    }

    assert_eq!(*engine.document().unwrap(), *before);
    assert!(engine.is_dirty());
    assert_eq!(engine.autosave_state(), SchedulerState::Pending);
    assert!(engine.notices().iter().any(|n| n.kind == NoticeKind::Error));
}

#[tokio::test(start_paused = true)]
async fn import_cancels_pending_autosave() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({"a": 1})).await;

    engine.set("a", json!(2)).unwrap();
    engine.import_snapshot(r#"{"a": 9}"#).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.write_count(SNAPSHOT_KEY), 1);
    assert_eq!(cached(&cache), Some(json!({"a": 9})));
}

#[tokio::test(start_paused = true)]
async fn import_during_inflight_autosave_is_not_overwritten() {
    // Each commit writes two slots, 500 ms apiece
    let cache = Arc::new(SlowCache::new(Duration::from_millis(500)));
    let engine = PlanningEngine::start(
        EngineConfig::default(),
        cache.clone(),
        Arc::new(StaticSeed::new(json!({"a": 1}))),
    )
    .await
    .unwrap();

    engine.set("a", json!(2)).unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let (imported, ()) = tokio::join!(engine.import_snapshot(r#"{"a": 9}"#), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.set("a", json!(5)).unwrap();
    });
    imported.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let live = engine.document().unwrap();
    assert_eq!(*live, json!({"a": 9}));
    assert_eq!(cached(cache.memory()).as_ref(), Some(&*live));
    assert_eq!(engine.autosave_state(), SchedulerState::Idle);
    assert!(!engine.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn reset_during_inflight_autosave_leaves_cache_empty() {
    let cache = Arc::new(SlowCache::new(Duration::from_millis(500)));
    let engine = PlanningEngine::start(
        EngineConfig::default(),
        cache.clone(),
        Arc::new(StaticSeed::new(json!({"a": 1}))),
    )
    .await
    .unwrap();

    engine.set("a", json!(2)).unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let (reset, ()) = tokio::join!(engine.reset(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.set("a", json!(5)).unwrap();
    });
    reset.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(*engine.document().unwrap(), json!({"a": 1}));
    assert!(cache.memory().is_empty());
    assert!(!engine.is_dirty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_autosave_last_document() {
    let cache = Arc::new(MemoryCache::new());
    let engine = PlanningEngine::start(
        EngineConfig::default().with_autosave_idle(Duration::from_millis(50)),
        cache.clone(),
        Arc::new(StaticSeed::new(json!({"w": {}}))),
    )
    .await
    .unwrap();

    std::thread::scope(|scope| {
        for writer in 0..8 {
            let engine = &engine;
            scope.spawn(move || {
                for n in 0..200 {
                    engine.set(&format!("w.k{writer}"), json!(n)).unwrap();
                }
            });
        }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    let live = engine.document().unwrap();
    for writer in 0..8 {
        assert_eq!(live["w"][format!("k{writer}")], json!(199));
    }
    assert_eq!(cached(&cache).as_ref(), Some(&*live));
}

#[tokio::test(start_paused = true)]
async fn reset_discards_pending_autosave_and_cache() {
    let cache = Arc::new(MemoryCache::new());
    let seed = Arc::new(FlakySeed::new(json!({"a": 1}), 0));
    let engine = PlanningEngine::start(EngineConfig::default(), cache.clone(), seed.clone())
        .await
        .unwrap();

    engine.set("a", json!(2)).unwrap();
    engine.save().await.unwrap();
    engine.set("a", json!(3)).unwrap();
    seed.set_document(json!({"a": 100}));

    engine.reset().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*engine.document().unwrap(), json!({"a": 100}));
    assert!(!engine.is_dirty());
    assert_eq!(cache.write_count(SNAPSHOT_KEY), 1);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_reset_keeps_document() {
    let cache = Arc::new(MemoryCache::new());
    let seed = Arc::new(FlakySeed::new(json!({"a": 1}), 0));
    let engine = PlanningEngine::start(EngineConfig::default(), cache.clone(), seed.clone())
        .await
        .unwrap();
    engine.set("a", json!(2)).unwrap();

    seed.fail_next(10);
    assert!(matches!(engine.reset().await, Err(EngineError::Seed(_))));
    assert_eq!(*engine.document().unwrap(), json!({"a": 2}));
    assert!(engine.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn seed_failure_leaves_engine_loading_until_retry() {
    let cache = Arc::new(MemoryCache::new());
    let seed = Arc::new(FlakySeed::new(json!({"a": 1}), 3));
    let config = EngineConfig::default().with_seed_retry(RetryPolicy::default());

    let engine = PlanningEngine::start(config, cache.clone(), seed.clone())
        .await
        .unwrap();
    assert_eq!(engine.status(), LoadStatus::Loading);
    assert_eq!(seed.calls(), 3);
    assert!(matches!(engine.set("a", json!(2)), Err(EngineError::NotReady)));
    assert!(matches!(engine.export_snapshot(), Err(EngineError::NotReady)));

    assert_eq!(engine.retry_load().await.unwrap(), LoadStatus::Ready);
    assert_eq!(*engine.document().unwrap(), json!({"a": 1}));
}

#[tokio::test(start_paused = true)]
async fn failed_autosave_reports_error_and_stays_dirty() {
    let cache = Arc::new(FailingCache::new());
    let engine = PlanningEngine::start(
        EngineConfig::default(),
        cache.clone(),
        Arc::new(StaticSeed::new(json!({"a": 1}))),
    )
    .await
    .unwrap();

    cache.fail_writes(true);
    engine.set("a", json!(2)).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(engine.is_dirty());
    assert!(engine.last_saved_at().is_none());
    assert!(engine.notices().iter().any(|n| n.kind == NoticeKind::Error));

    assert!(matches!(engine.save().await, Err(EngineError::Persist(_))));
    assert!(engine.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn unreadable_cache_falls_back_to_seed() {
    let cache = Arc::new(FailingCache::new());
    cache.fail_reads(true);
    let engine = PlanningEngine::start(
        EngineConfig::default(),
        cache.clone(),
        Arc::new(StaticSeed::new(sample_plan())),
    )
    .await
    .unwrap();
    assert_eq!(*engine.document().unwrap(), sample_plan());
}

#[tokio::test(start_paused = true)]
async fn dirty_subscribers_are_woken() {
    let cache = Arc::new(MemoryCache::new());
    let engine = start(&cache, json!({"a": 1})).await;
    let mut rx = engine.subscribe_dirty();

    engine.set("a", json!(2)).unwrap();
    rx.changed().await.unwrap();
    assert!(*rx.borrow_and_update());

    engine.save().await.unwrap();
    rx.changed().await.unwrap();
    assert!(!*rx.borrow_and_update());
}

#[tokio::test(start_paused = true)]
async fn login_gates_mount() {
    let config = EngineConfig::from_toml_str(
        r#"
        [auth]
        required = true

        [[auth.users]]
        username = "ana"
        password = "s3cret"
        "#,
    )
    .unwrap();
    let auth = StaticAuthenticator::new(config.auth.clone());
    let seed = Arc::new(StaticSeed::new(json!({})));

    let refused = PlanningEngine::mount(
        auth.login(Some(&Credentials::new("ana", "wrong"))),
        config.clone(),
        Arc::new(MemoryCache::new()),
        seed.clone(),
    )
    .await;
    assert!(matches!(refused, Err(EngineError::Unauthenticated)));

    let engine = PlanningEngine::mount(
        auth.login(Some(&Credentials::new("ana", "s3cret"))),
        config,
        Arc::new(MemoryCache::new()),
        seed,
    )
    .await
    .unwrap();
    assert_eq!(engine.principal().unwrap().username, "ana");
}

#[tokio::test]
async fn file_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let seed = Arc::new(StaticSeed::new(sample_plan()));

    {
        let cache: Arc<dyn SnapshotCache> = Arc::new(FileCache::open(dir.path()).await.unwrap());
        let engine = PlanningEngine::start(EngineConfig::default(), cache, seed.clone())
            .await
            .unwrap();
        engine.set("empresa.ano", json!(2026)).unwrap();
        engine.save().await.unwrap();
        engine.shutdown();
    }

    let cache: Arc<dyn SnapshotCache> = Arc::new(FileCache::open(dir.path()).await.unwrap());
    let engine = PlanningEngine::start(EngineConfig::default(), cache, seed)
        .await
        .unwrap();
    assert_eq!(engine.read(&path("empresa.ano")), Some(json!(2026)));
    assert_eq!(engine.read(&path("cenarios[1].id")), Some(json!("otimista")));
}
