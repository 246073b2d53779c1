use anyhow::Result as AnyResult;
use async_trait::async_trait;
use es_persist::aggregate::{Aggregate, SnapshotAggregateFactory};
use es_persist::commit::{AGGREGATE_TYPE_HEADER, CommitAttempt};
use es_persist::conflict::{ConflictDetector, NullConflictDetector};
use es_persist::error::{PersistError, PersistResult};
use es_persist::repository::EventStoreRepository;
use es_persist::store::{EventStore, WriteError};
use es_persist::store_inmemory::InMemoryEventStore;
use es_persist::stream::{CommittedEventStream, EventMessage};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use ulid::Ulid;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tally {
    id: String,
    version: usize,
    total: i64,
    #[serde(skip)]
    pending: Vec<Value>,
}

impl Tally {
    fn add(&mut self, by: i64) {
        self.version += 1;
        self.total += by;
        self.pending.push(json!({
            "id": Ulid::new().to_string(),
            "by": by,
        }));
    }
}

impl Aggregate for Tally {
    const TYPE: &'static str = "tally";

    fn new(stream_id: &str) -> Self {
        Self {
            id: stream_id.to_string(),
            ..Default::default()
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> usize {
        self.version
    }

    fn apply(&mut self, event: &EventMessage) {
        if event.version() <= self.version {
            return;
        }
        self.total += event.payload()["by"].as_i64().unwrap_or(0);
        self.version = event.version();
    }

    fn uncommitted_events(&self) -> Vec<Value> {
        self.pending.clone()
    }

    fn clear_uncommitted_events(&mut self) {
        self.pending.clear();
    }
}

/// 统计写入调用次数的存储装饰器
#[derive(Clone)]
struct CountingStore {
    inner: Arc<InMemoryEventStore>,
    pub write_calls: Arc<Mutex<usize>>,
}

impl CountingStore {
    fn new(inner: Arc<InMemoryEventStore>) -> Self {
        Self {
            inner,
            write_calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl EventStore for CountingStore {
    async fn read_until(
        &self,
        stream_id: &str,
        version: usize,
    ) -> PersistResult<Option<CommittedEventStream>> {
        self.inner.read_until(stream_id, version).await
    }

    async fn read_from(
        &self,
        stream_id: &str,
        revision: usize,
    ) -> PersistResult<CommittedEventStream> {
        self.inner.read_from(stream_id, revision).await
    }

    async fn write(&self, attempt: &CommitAttempt) -> Result<(), WriteError> {
        *self.write_calls.lock().unwrap() += 1;
        self.inner.write(attempt).await
    }
}

/// 将任何交错都判为语义冲突的检测器
struct AlwaysConflict;

impl ConflictDetector for AlwaysConflict {
    fn conflicts_with(&self, _attempted: &[EventMessage], _committed: &[EventMessage]) -> bool {
        true
    }
}

/// 写入必败的存储（读路径不可达）
#[derive(Default)]
struct BrokenStore {
    write_calls: Mutex<usize>,
}

#[async_trait]
impl EventStore for BrokenStore {
    async fn read_until(
        &self,
        _stream_id: &str,
        _version: usize,
    ) -> PersistResult<Option<CommittedEventStream>> {
        Ok(None)
    }

    async fn read_from(
        &self,
        stream_id: &str,
        _revision: usize,
    ) -> PersistResult<CommittedEventStream> {
        Ok(CommittedEventStream::builder()
            .stream_id(stream_id.to_string())
            .build())
    }

    async fn write(&self, _attempt: &CommitAttempt) -> Result<(), WriteError> {
        *self.write_calls.lock().unwrap() += 1;
        Err(WriteError::Engine {
            reason: "disk unplugged".to_string(),
        })
    }
}

#[tokio::test]
async fn save_without_pending_events_is_a_noop() -> AnyResult<()> {
    let counting = CountingStore::new(Arc::new(InMemoryEventStore::new()));
    let mut repo =
        EventStoreRepository::new(counting.clone(), SnapshotAggregateFactory, NullConflictDetector);

    let mut idle = Tally::new("s-0");
    repo.save(&mut idle, Uuid::new_v4()).await?;

    assert_eq!(*counting.write_calls.lock().unwrap(), 0);
    assert_eq!(repo.counters().get("s-0"), None);
    Ok(())
}

#[tokio::test]
async fn successful_save_advances_bookkeeping_and_clears_events() -> AnyResult<()> {
    let store = Arc::new(InMemoryEventStore::new());
    let mut repo = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );

    let mut writer = Tally::new("s-1");
    writer.add(4);
    writer.add(5);
    repo.save(&mut writer, Uuid::new_v4()).await?;

    assert_eq!(repo.counters().get("s-1"), Some(1));
    assert!(writer.uncommitted_events().is_empty());

    let commits = store.commits("s-1");
    assert_eq!(commits.len(), 1);
    let versions: Vec<usize> = commits[0].events().iter().map(EventMessage::version).collect();
    assert_eq!(versions, vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn commit_headers_carry_aggregate_type_and_caller_entries() -> AnyResult<()> {
    let store = Arc::new(InMemoryEventStore::new());
    let mut repo = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );

    let mut writer = Tally::new("s-2");
    writer.add(1);
    repo.save_with_headers(&mut writer, Uuid::new_v4(), |headers| {
        headers.insert("tenant".to_string(), json!("t-9"));
        // 保留头不可被调用方覆盖
        headers.insert(AGGREGATE_TYPE_HEADER.to_string(), json!("spoofed"));
    })
    .await?;

    let commits = store.commits("s-2");
    assert_eq!(commits[0].headers()[AGGREGATE_TYPE_HEADER], json!("tally"));
    assert_eq!(commits[0].headers()["tenant"], json!("t-9"));
    Ok(())
}

/// 两写入者交错的完整场景：流 S 无历史提交，写入者一提交 2 个事件后
/// 簿记为 1；写入者二基于过期读提交 1 个事件，遭遇并发冲突，介入事件
/// 无语义冲突，和解后重新提交，簿记推进为 2。
#[tokio::test]
async fn interleaved_writers_reconcile_without_conflict() -> AnyResult<()> {
    let store = Arc::new(InMemoryEventStore::new());

    let mut repo1 = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );
    let mut writer1 = Tally::new("s-3");
    writer1.add(1);
    writer1.add(2);
    repo1.save(&mut writer1, Uuid::new_v4()).await?;
    assert_eq!(repo1.counters().get("s-3"), Some(1));

    // 写入者二：独立仓储实例，簿记未知（按 0 处理）
    let counting = CountingStore::new(Arc::clone(&store));
    let mut repo2 =
        EventStoreRepository::new(counting.clone(), SnapshotAggregateFactory, NullConflictDetector);
    let mut writer2 = Tally::new("s-3");
    writer2.add(7);
    repo2.save(&mut writer2, Uuid::new_v4()).await?;

    // 冲突 + 和解后的重新提交，共两次写入
    assert_eq!(*counting.write_calls.lock().unwrap(), 2);
    assert_eq!(repo2.counters().get("s-3"), Some(2));
    assert!(writer2.uncommitted_events().is_empty());

    // 和解后的事件紧随介入事件，版本无空洞
    let commits = store.commits("s-3");
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[1].events()[0].version(), 3);
    assert_eq!(commits[1].previous_commit_sequence(), 1);

    let mut reader = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );
    let merged: Tally = reader.load("s-3", 0).await?.unwrap();
    assert_eq!(merged.version(), 3);
    assert_eq!(merged.total, 10);
    Ok(())
}

#[tokio::test]
async fn semantic_conflict_raises_and_leaves_bookkeeping_untouched() -> AnyResult<()> {
    let store = Arc::new(InMemoryEventStore::new());

    let mut repo1 = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );
    let mut writer1 = Tally::new("s-4");
    writer1.add(1);
    writer1.add(2);
    repo1.save(&mut writer1, Uuid::new_v4()).await?;

    let mut repo2 =
        EventStoreRepository::new(Arc::clone(&store), SnapshotAggregateFactory, AlwaysConflict);
    let mut writer2 = Tally::new("s-4");
    writer2.add(7);
    let err = repo2.save(&mut writer2, Uuid::new_v4()).await.unwrap_err();

    match err {
        PersistError::ConflictingCommand { stream_id, source } => {
            assert_eq!(stream_id, "s-4");
            assert!(matches!(source, WriteError::Concurrency { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }

    // 簿记未被推进，事件未落盘，未提交事件保留待业务层决策
    assert_eq!(repo2.counters().get("s-4"), None);
    assert_eq!(store.commits("s-4").len(), 1);
    assert_eq!(writer2.uncommitted_events().len(), 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_commit_is_swallowed() -> AnyResult<()> {
    let store = Arc::new(InMemoryEventStore::new());
    let mut repo = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );

    let commit_id = Uuid::new_v4();
    let mut writer = Tally::new("s-5");
    writer.add(1);
    writer.add(2);
    repo.save(&mut writer, commit_id).await?;
    assert_eq!(repo.counters().get("s-5"), Some(1));

    // 网络重试场景：同一提交标识再次保存，不报错、不改变已有状态
    let mut retried = Tally::new("s-5");
    retried.add(1);
    retried.add(2);
    repo.save(&mut retried, commit_id).await?;

    assert_eq!(repo.counters().get("s-5"), Some(1));
    assert_eq!(store.commits("s-5").len(), 1);
    Ok(())
}

#[tokio::test]
async fn engine_failure_wraps_into_persistence_error() -> AnyResult<()> {
    let store = Arc::new(BrokenStore::default());
    let mut repo = EventStoreRepository::new(
        Arc::clone(&store),
        SnapshotAggregateFactory,
        NullConflictDetector,
    );

    let mut writer = Tally::new("s-6");
    writer.add(1);
    let err = repo.save(&mut writer, Uuid::new_v4()).await.unwrap_err();

    match err {
        PersistError::Persistence { source } => {
            assert!(matches!(source, WriteError::Engine { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }

    // 本层不重试，未提交事件保留
    assert_eq!(*store.write_calls.lock().unwrap(), 1);
    assert_eq!(repo.counters().get("s-6"), None);
    assert_eq!(writer.uncommitted_events().len(), 1);
    Ok(())
}
