//! 持久化层统一错误定义
//!
//! 聚焦加载/保存编排过程的最小必要集合：快照类型校验、语义冲突、
//! 存储失败与载荷序列化。存储写入的信号（并发/重复/引擎失败）由
//! `store::WriteError` 单独建模，仓储按变体匹配处理后再映射到这里。
//!
use crate::store::WriteError;
use thiserror::Error;

/// 统一错误类型（协调层最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PersistError {
    // --- 快照/载荷转换 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 保存（写路径） ---
    /// 与其他写入者已提交的事件存在语义冲突，不可自动重试，
    /// 携带触发和解的并发信号作为原因。
    #[error("conflicting command on stream {stream_id}: {source}")]
    ConflictingCommand {
        stream_id: String,
        source: WriteError,
    },
    /// 并发/重复之外的存储层写入失败，原样向调用方传播。
    #[error("persistence failure: {source}")]
    Persistence { source: WriteError },

    // --- 加载（读路径） ---
    #[error("event store error: {reason}")]
    Store { reason: String },
}

/// 统一 Result 类型别名
pub type PersistResult<T> = Result<T, PersistError>;
