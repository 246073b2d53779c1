//! 事件存储协作方契约
//!
//! 本层不实现存储引擎，只声明仓储编排所依赖的读写接口与写入信号。
//! 具体后端（内存、Postgres 等）由上层实现并注入。
//!
use crate::commit::CommitAttempt;
use crate::error::PersistResult;
use crate::stream::CommittedEventStream;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// 写入失败信号，由仓储按变体匹配处理（而非异常穿透）
#[derive(Debug, Error)]
pub enum WriteError {
    /// 乐观并发失败：另一写入者已将流推进过本次尝试的预期修订版本
    #[error(
        "concurrency conflict on stream {stream_id}: attempted revision {attempted_revision}, stream is at {actual_revision}"
    )]
    Concurrency {
        stream_id: String,
        attempted_revision: usize,
        actual_revision: usize,
    },
    /// 同一提交标识已经生效（如重试的网络调用），调用方视角非错误
    #[error("duplicate commit {commit_id} on stream {stream_id}")]
    DuplicateCommit { stream_id: String, commit_id: Uuid },
    /// 其他存储层失败，不在本层重试
    #[error("storage engine failure: {reason}")]
    Engine { reason: String },
}

/// 按流追加的事件存储。
///
/// 契约要求：
/// - 同一流的 `commit_sequence` 随成功提交单调递增；
/// - 写入报告并发冲突后，紧随其后的 `read_from` 必须能观测到
///   造成该冲突的全部已提交事件（"read your conflict"）。
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 读取截止到 `version` 的流（`version == 0` 表示不截断）；
    /// 流不存在时返回 `None`
    async fn read_until(
        &self,
        stream_id: &str,
        version: usize,
    ) -> PersistResult<Option<CommittedEventStream>>;

    /// 读取自 `revision` 起（含）的流事件，用于冲突和解
    async fn read_from(
        &self,
        stream_id: &str,
        revision: usize,
    ) -> PersistResult<CommittedEventStream>;

    /// 尝试追加一次提交，失败以 `WriteError` 变体报告
    async fn write(&self, attempt: &CommitAttempt) -> Result<(), WriteError>;
}

#[async_trait]
impl<T> EventStore for Arc<T>
where
    T: EventStore + ?Sized,
{
    async fn read_until(
        &self,
        stream_id: &str,
        version: usize,
    ) -> PersistResult<Option<CommittedEventStream>> {
        (**self).read_until(stream_id, version).await
    }

    async fn read_from(
        &self,
        stream_id: &str,
        revision: usize,
    ) -> PersistResult<CommittedEventStream> {
        (**self).read_from(stream_id, revision).await
    }

    async fn write(&self, attempt: &CommitAttempt) -> Result<(), WriteError> {
        (**self).write(attempt).await
    }
}
