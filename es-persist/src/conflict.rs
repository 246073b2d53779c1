//! 冲突检测协作方契约
//!
//! 判断两批事件是否语义不相容属于业务决策，本层只声明接口；
//! 检测算法内部由上层提供。
//!
use crate::stream::EventMessage;
use std::sync::Arc;

/// 业务级冲突检测：判断本次尝试的事件与其他写入者已提交的
/// 介入事件是否语义冲突
pub trait ConflictDetector: Send + Sync {
    fn conflicts_with(&self, attempted: &[EventMessage], committed: &[EventMessage]) -> bool;
}

impl<T> ConflictDetector for Arc<T>
where
    T: ConflictDetector + ?Sized,
{
    fn conflicts_with(&self, attempted: &[EventMessage], committed: &[EventMessage]) -> bool {
        (**self).conflicts_with(attempted, committed)
    }
}

/// 默认实现：任何并发交错都视为可合并（无语义冲突）
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConflictDetector;

impl ConflictDetector for NullConflictDetector {
    fn conflicts_with(&self, _attempted: &[EventMessage], _committed: &[EventMessage]) -> bool {
        false
    }
}
