//! 基于内存的事件存储实现
//!
//! 面向测试与示例的 `EventStore` 实现：按流保存提交批次，
//! 提供重复提交识别与乐观并发校验。以 DashMap 按流条目加锁，
//! 可在多个仓储实例间通过 `Arc` 共享。
//!
use crate::commit::CommitAttempt;
use crate::error::PersistResult;
use crate::store::{EventStore, WriteError};
use crate::stream::{CommittedEventStream, EventMessage, Snapshot};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Default, Clone)]
struct StreamState {
    commits: Vec<CommitAttempt>,
    snapshot: Option<Snapshot>,
}

impl StreamState {
    /// 流当前的最高事件版本（无事件为 0）
    fn head_revision(&self) -> usize {
        self.commits
            .last()
            .and_then(|commit| commit.events().last())
            .map(EventMessage::version)
            .unwrap_or(0)
    }

    fn events_matching(&self, keep: impl Fn(&EventMessage) -> bool) -> Vec<EventMessage> {
        self.commits
            .iter()
            .flat_map(|commit| commit.events().iter())
            .filter(|event| keep(event))
            .cloned()
            .collect()
    }
}

/// 内存事件存储
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: DashMap<String, StreamState>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为流挂载快照（以快照自身的聚合标识为流标识）
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        let stream_id = snapshot.aggregate_id().to_string();
        self.streams.entry(stream_id).or_default().snapshot = Some(snapshot);
    }

    /// 流上已生效的提交批次（按提交顺序）
    pub fn commits(&self, stream_id: &str) -> Vec<CommitAttempt> {
        self.streams
            .get(stream_id)
            .map(|state| state.commits.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn read_until(
        &self,
        stream_id: &str,
        version: usize,
    ) -> PersistResult<Option<CommittedEventStream>> {
        let Some(state) = self.streams.get(stream_id) else {
            return Ok(None);
        };

        // 最新读（version == 0）只返回快照之后的增量；
        // 指定版本的历史读返回截断后的原始历史，快照覆盖部分由
        // 仓储的重放守卫跳过。
        let snapshot_floor = state
            .snapshot
            .as_ref()
            .map(Snapshot::aggregate_version)
            .unwrap_or(0);
        let events = state.events_matching(|e| {
            if version == 0 {
                e.version() > snapshot_floor
            } else {
                e.version() <= version
            }
        });
        Ok(Some(
            CommittedEventStream::builder()
                .stream_id(stream_id.to_string())
                .events(events)
                .commit_sequence(state.commits.len())
                .maybe_snapshot(state.snapshot.clone())
                .build(),
        ))
    }

    async fn read_from(
        &self,
        stream_id: &str,
        revision: usize,
    ) -> PersistResult<CommittedEventStream> {
        let (events, commit_sequence) = match self.streams.get(stream_id) {
            Some(state) => (
                state.events_matching(|e| e.version() >= revision),
                state.commits.len(),
            ),
            None => (Vec::new(), 0),
        };

        Ok(CommittedEventStream::builder()
            .stream_id(stream_id.to_string())
            .events(events)
            .commit_sequence(commit_sequence)
            .build())
    }

    async fn write(&self, attempt: &CommitAttempt) -> Result<(), WriteError> {
        let mut state = self
            .streams
            .entry(attempt.stream_id().to_string())
            .or_default();

        // 幂等重试：重复提交先于并发校验识别
        if state
            .commits
            .iter()
            .any(|commit| commit.commit_id() == attempt.commit_id())
        {
            return Err(WriteError::DuplicateCommit {
                stream_id: attempt.stream_id().to_string(),
                commit_id: attempt.commit_id(),
            });
        }

        let head = state.head_revision();
        let first_incoming = attempt.events().first().map(EventMessage::version);
        if first_incoming != Some(head + 1) {
            return Err(WriteError::Concurrency {
                stream_id: attempt.stream_id().to_string(),
                attempted_revision: attempt.stream_revision(),
                actual_revision: head,
            });
        }

        state.commits.push(attempt.clone());
        Ok(())
    }
}
