//! 聚合能力边界与聚合工厂
//!
//! 仓储只通过这里声明的最小能力集读写聚合：标识、版本、事件应用、
//! 未提交事件集的读取与清空。聚合的业务逻辑（命令执行等）不在本层。
//!
use crate::error::PersistResult;
use crate::stream::{EventMessage, Snapshot};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

/// 聚合需要向持久化层暴露的能力集
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync {
    /// 聚合类型全名，写入保留提交头 `AggregateType`，
    /// 并用于快照还原时的类型校验
    const TYPE: &'static str;

    /// 以流标识创建空聚合（版本为 0，无未提交事件）
    fn new(stream_id: &str) -> Self;

    /// 聚合标识，同时作为事件流标识
    fn id(&self) -> &str;

    /// 当前版本：单调递增整数，初始为 0
    fn version(&self) -> usize;

    /// 应用一条已提交事件，更新聚合状态（用于重建）
    fn apply(&mut self, event: &EventMessage);

    /// 自上次保存以来产生的未提交事件载荷，按产生顺序排列
    fn uncommitted_events(&self) -> Vec<Value>;

    /// 持久化成功后清空未提交事件
    fn clear_uncommitted_events(&mut self);
}

/// 聚合工厂：按请求的聚合类型由流标识与可选快照构建实例
pub trait AggregateFactory: Send + Sync {
    /// 构建 `A` 的实例；快照类型与 `A::TYPE` 不符时返回
    /// `PersistError::TypeMismatch`
    fn build<A>(&self, stream_id: &str, snapshot: Option<&Snapshot>) -> PersistResult<A>
    where
        A: Aggregate;
}

impl<T> AggregateFactory for Arc<T>
where
    T: AggregateFactory + ?Sized,
{
    fn build<A>(&self, stream_id: &str, snapshot: Option<&Snapshot>) -> PersistResult<A>
    where
        A: Aggregate,
    {
        (**self).build(stream_id, snapshot)
    }
}

/// 默认聚合工厂：有快照时从快照还原，否则以流标识新建空聚合
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotAggregateFactory;

impl AggregateFactory for SnapshotAggregateFactory {
    fn build<A>(&self, stream_id: &str, snapshot: Option<&Snapshot>) -> PersistResult<A>
    where
        A: Aggregate,
    {
        match snapshot {
            Some(snapshot) => snapshot.to_aggregate(),
            None => Ok(A::new(stream_id)),
        }
    }
}
