//! 事件流持久化模型
//!
//! 定义事件在本层流转的标准形态：
//! - `EventMessage`：不透明事件载荷 + 版本标记；
//! - `Snapshot`：某一版本的聚合状态，用于跳过历史事件重放；
//! - `CommittedEventStream`：一次读取的结果（事件序列 + 提交序号 + 可选快照）。
//!
use crate::aggregate::Aggregate;
use crate::error::{PersistError, PersistResult};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件消息：不透明载荷与版本标记。
///
/// 由未提交事件包裹而来（此时版本未定），在落盘前由版本标记统一赋值，
/// 此后视为不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    version: usize,
    payload: Value,
}

impl EventMessage {
    /// 由未提交的事件载荷生成“外壳”，版本号留待落盘前赋值
    pub fn shell(payload: Value) -> Self {
        Self {
            version: 0,
            payload,
        }
    }

    /// 事件对应的聚合版本
    pub fn version(&self) -> usize {
        self.version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub(crate) fn set_version(&mut self, version: usize) {
        self.version = version;
    }
}

/// 聚合快照：某一版本的聚合完整状态
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct Snapshot {
    aggregate_id: String,
    aggregate_type: String,
    aggregate_version: usize,
    payload: Value,
}

impl Snapshot {
    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_version(&self) -> usize {
        self.aggregate_version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 从聚合实例生成快照
    pub fn from_aggregate<A>(aggregate: &A) -> PersistResult<Self>
    where
        A: Aggregate,
    {
        Ok(Self {
            aggregate_id: aggregate.id().to_string(),
            aggregate_type: A::TYPE.to_string(),
            aggregate_version: aggregate.version(),
            payload: serde_json::to_value(aggregate)?,
        })
    }

    /// 将快照还原为聚合实例；类型不匹配视为调用方契约违规，快速失败
    pub fn to_aggregate<A>(&self) -> PersistResult<A>
    where
        A: Aggregate,
    {
        if A::TYPE != self.aggregate_type {
            return Err(PersistError::TypeMismatch {
                expected: A::TYPE.to_string(),
                found: self.aggregate_type.clone(),
            });
        }

        let aggregate = serde_json::from_value(self.payload.clone())?;
        Ok(aggregate)
    }
}

/// 一次流读取的结果。
///
/// 不变式：`events` 按应用顺序排列；对同一流的多次读取，
/// `commit_sequence`（历史成功提交次数）单调不减。
#[derive(Debug, Clone, Builder)]
pub struct CommittedEventStream {
    stream_id: String,
    #[builder(default)]
    events: Vec<EventMessage>,
    #[builder(default)]
    commit_sequence: usize,
    snapshot: Option<Snapshot>,
}

impl CommittedEventStream {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn events(&self) -> &[EventMessage] {
        &self.events
    }

    pub fn commit_sequence(&self) -> usize {
        self.commit_sequence
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }
}
