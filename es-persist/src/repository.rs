//! 聚合仓储编排（加载 / 保存 / 冲突和解）
//!
//! 组合事件存储、聚合工厂与冲突检测器实现聚合的事件溯源持久化：
//! - `load`：读取已提交流（可从快照起步）重建聚合，并登记流提交序号；
//! - `save`：以乐观并发控制追加未提交事件，遭遇并发冲突时读取介入
//!   提交并和解，可合并则推进修订版本后重新提交，语义冲突则失败。
//!
//! 仓储实例面向单个工作单元：单写入者、生命周期短，内部簿记不加锁。
//!
use crate::aggregate::{Aggregate, AggregateFactory};
use crate::commit::CommitAttempt;
use crate::conflict::ConflictDetector;
use crate::counters::StreamCounters;
use crate::error::{PersistError, PersistResult};
use crate::store::{EventStore, WriteError};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// 事件溯源聚合仓储
pub struct EventStoreRepository<S, F, D> {
    store: S,
    factory: F,
    detector: D,
    counters: StreamCounters,
}

impl<S, F, D> EventStoreRepository<S, F, D>
where
    S: EventStore,
    F: AggregateFactory,
    D: ConflictDetector,
{
    pub fn new(store: S, factory: F, detector: D) -> Self {
        Self {
            store,
            factory,
            detector,
            counters: StreamCounters::new(),
        }
    }

    /// 每流最近已知提交序号的簿记（随 `load`/`save` 更新）
    pub fn counters(&self) -> &StreamCounters {
        &self.counters
    }

    /// 按事件流重建聚合。
    ///
    /// `version_to_load == 0` 表示加载最新状态，否则流在该版本截断。
    /// 流不存在或从未有过成功提交时返回 `None`；已有提交的流即使读回
    /// 的事件为空（快照已覆盖到流头）也视为存在。由工厂（可选从快照）
    /// 构建实例后，仅当请求最新状态、或快照尚未达到请求版本时才重放
    /// 事件，避免快照已覆盖时的冗余重放。
    ///
    /// 副作用：以流的提交序号登记本仓储的簿记。
    pub async fn load<A>(
        &mut self,
        stream_id: &str,
        version_to_load: usize,
    ) -> PersistResult<Option<A>>
    where
        A: Aggregate,
    {
        let Some(stream) = self.store.read_until(stream_id, version_to_load).await? else {
            return Ok(None);
        };
        // 从未有过成功提交的流按“不存在”处理；提交序号大于零而事件为空
        // 说明快照已覆盖到读取窗口，流本身是存在的
        if stream.events().is_empty() && stream.commit_sequence() == 0 {
            return Ok(None);
        }

        let mut aggregate: A = self.factory.build(stream_id, stream.snapshot())?;

        if version_to_load == 0 || aggregate.version() < version_to_load {
            for event in stream.events() {
                aggregate.apply(event);
            }
        }

        self.counters.set(stream_id, stream.commit_sequence());
        Ok(Some(aggregate))
    }

    /// 保存聚合的未提交事件（无自定义提交头）
    pub async fn save<A>(&mut self, aggregate: &mut A, commit_id: Uuid) -> PersistResult<()>
    where
        A: Aggregate,
    {
        self.save_with_headers(aggregate, commit_id, |_| {}).await
    }

    /// 保存聚合的未提交事件。
    ///
    /// 无未提交事件时为空操作（不触达存储、不更新簿记）。否则构造
    /// 提交尝试（上一个提交序号取自簿记，未知按 0），标记版本后写入：
    /// - 成功：簿记推进为 `previous_commit_sequence + 1`，清空聚合的
    ///   未提交事件；
    /// - 重复提交：视为已成功，不报错、不改状态；
    /// - 并发冲突：读取自尝试修订版本起的介入提交，交由冲突检测器
    ///   判定——语义冲突则返回 `ConflictingCommand`（簿记不变）；可
    ///   合并则推进尝试的修订版本与提交序号、簿记对齐到介入流提交
    ///   序号 + 1，重新标记版本后再次提交，直到落盘或失败为止；
    /// - 其他存储失败：包装为 `Persistence` 返回，不重试。
    pub async fn save_with_headers<A, H>(
        &mut self,
        aggregate: &mut A,
        commit_id: Uuid,
        update_headers: H,
    ) -> PersistResult<()>
    where
        A: Aggregate,
        H: FnOnce(&mut HashMap<String, Value>),
    {
        let previous = self.counters.get(aggregate.id()).unwrap_or(0);
        let Some(mut attempt) =
            CommitAttempt::from_aggregate(aggregate, commit_id, previous, update_headers)
        else {
            return Ok(());
        };

        loop {
            attempt.stamp();

            match self.store.write(&attempt).await {
                Ok(()) => {
                    self.counters
                        .set(attempt.stream_id(), attempt.previous_commit_sequence() + 1);
                    aggregate.clear_uncommitted_events();
                    return Ok(());
                }
                Err(WriteError::DuplicateCommit { .. }) => {
                    // 该提交已经生效（如重试的网络调用），按成功处理
                    return Ok(());
                }
                Err(conflict @ WriteError::Concurrency { .. }) => {
                    let intervening = self
                        .store
                        .read_from(attempt.stream_id(), attempt.stream_revision())
                        .await?;

                    if self
                        .detector
                        .conflicts_with(attempt.events(), intervening.events())
                    {
                        return Err(PersistError::ConflictingCommand {
                            stream_id: attempt.stream_id().to_string(),
                            source: conflict,
                        });
                    }

                    // 良性交错：推进修订版本与提交序号，重新标记后再次提交
                    attempt.advance_past(&intervening);
                    self.counters
                        .set(attempt.stream_id(), intervening.commit_sequence() + 1);
                }
                Err(failure) => {
                    return Err(PersistError::Persistence { source: failure });
                }
            }
        }
    }
}
