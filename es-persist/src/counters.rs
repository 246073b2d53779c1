//! 流提交序号缓存
//!
//! 进程内的“流标识 → 最近已知提交序号”映射，用于避免保存前的冗余
//! 存储读取。生命周期与一次工作单元的仓储实例一致：不持久化、
//! 不跨进程共享、无内部加锁（单写入者）。
//!
use std::collections::HashMap;

/// 每流最近已知提交序号的簿记；条目缺失表示“未知，按 0（首个提交）处理”
#[derive(Debug, Clone, Default)]
pub struct StreamCounters {
    counters: HashMap<String, usize>,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream_id: &str) -> Option<usize> {
        self.counters.get(stream_id).copied()
    }

    pub fn set(&mut self, stream_id: &str, commit_sequence: usize) {
        self.counters
            .insert(stream_id.to_string(), commit_sequence);
    }
}
