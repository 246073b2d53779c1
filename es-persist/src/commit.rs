//! 提交尝试（CommitAttempt）与版本标记
//!
//! 从聚合的未提交事件构造一次提交尝试，并在落盘前为批次内事件
//! 赋连续版本号，保证重放序列无空洞。
//!
use crate::aggregate::Aggregate;
use crate::stream::{CommittedEventStream, EventMessage};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// 保留提交头：聚合类型全名，构造时强制写入，调用方回调不可覆盖
pub const AGGREGATE_TYPE_HEADER: &str = "AggregateType";

/// 一次提交尝试：对事件流的一批待追加事件及其簿记信息。
///
/// 不变式：事件数恒大于零（无事件时不构造、不提交）。
#[derive(Debug, Clone)]
pub struct CommitAttempt {
    stream_id: String,
    stream_revision: usize,
    commit_id: Uuid,
    previous_commit_sequence: usize,
    headers: HashMap<String, Value>,
    events: Vec<EventMessage>,
    attempted_at: DateTime<Utc>,
}

impl CommitAttempt {
    /// 从聚合构造提交尝试：
    /// - 无未提交事件时返回 `None`（保存为空操作，不触发头回调）；
    /// - 否则以聚合标识为流标识、聚合当前版本为流修订版本，
    ///   先执行调用方头回调，再强制写入 `AggregateType` 保留头。
    pub fn from_aggregate<A, H>(
        aggregate: &A,
        commit_id: Uuid,
        previous_commit_sequence: usize,
        update_headers: H,
    ) -> Option<Self>
    where
        A: Aggregate,
        H: FnOnce(&mut HashMap<String, Value>),
    {
        let pending = aggregate.uncommitted_events();
        if pending.is_empty() {
            return None;
        }

        let mut headers = HashMap::new();
        update_headers(&mut headers);
        headers.insert(
            AGGREGATE_TYPE_HEADER.to_string(),
            Value::String(A::TYPE.to_string()),
        );

        Some(Self {
            stream_id: aggregate.id().to_string(),
            stream_revision: aggregate.version(),
            commit_id,
            previous_commit_sequence,
            headers,
            events: pending.into_iter().map(EventMessage::shell).collect(),
            attempted_at: Utc::now(),
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// 本批事件计算所基于的聚合版本（批内最后一条事件的版本）
    pub fn stream_revision(&self) -> usize {
        self.stream_revision
    }

    /// 提交标识，用于写入的幂等重试
    pub fn commit_id(&self) -> Uuid {
        self.commit_id
    }

    /// 写入者已知的上一个流提交序号（未知为 0，即首个提交）
    pub fn previous_commit_sequence(&self) -> usize {
        self.previous_commit_sequence
    }

    pub fn headers(&self) -> &HashMap<String, Value> {
        &self.headers
    }

    pub fn events(&self) -> &[EventMessage] {
        &self.events
    }

    pub fn attempted_at(&self) -> DateTime<Utc> {
        self.attempted_at
    }

    /// 为批次内事件赋版本号（见 [`stamp_versions`]）
    pub(crate) fn stamp(&mut self) {
        stamp_versions(&mut self.events, self.stream_revision);
    }

    /// 和解：将修订版本推进过介入事件，提交序号对齐到介入流
    pub(crate) fn advance_past(&mut self, intervening: &CommittedEventStream) {
        self.stream_revision += intervening.events().len();
        self.previous_commit_sequence = intervening.commit_sequence();
    }
}

/// 版本标记：起始版本为 `stream_revision - 事件数 + 1`，
/// 按批次顺序赋连续整数，批内最后一条事件的版本即 `stream_revision`。
///
/// 契约：聚合的版本必须已计入全部未提交事件，即
/// `stream_revision >= 事件数`（版本从 0 起，每应用一条事件递增一）。
pub fn stamp_versions(events: &mut [EventMessage], stream_revision: usize) {
    debug_assert!(
        stream_revision + 1 >= events.len(),
        "stream revision {stream_revision} cannot cover a batch of {} events",
        events.len()
    );
    let start = stream_revision + 1 - events.len();
    for (offset, event) in events.iter_mut().enumerate() {
        event.set_version(start + offset);
    }
}
