//! 事件溯源聚合持久化层（es-persist）
//!
//! 提供位于领域聚合与抽象事件存储之间的协调逻辑：
//! - 按事件流重建聚合（可选从快照起步，`repository`）
//! - 以乐观并发控制保存新产生的事件（提交尝试与版本标记，`commit`）
//! - 并发写入冲突的检测与和解（`conflict`）
//! - 每流提交序号的进程内簿记（`counters`）
//!
//! 本 crate 不定义存储引擎与序列化格式，仅定义对协作方的最小契约
//! （`store`/`aggregate`/`conflict`），具体后端由上层提供实现并注入；
//! `store_inmemory` 提供一个用于测试与示例的内存实现。
//!
//! 典型用法：
//! 1. 为聚合实现 `Aggregate`（标识、版本、事件应用与未提交事件集）；
//! 2. 提供 `EventStore` 实现（或使用内存实现）；
//! 3. 以 `EventStoreRepository` 编排“加载 → 执行命令 → 保存”的单元工作流。
//!
pub mod aggregate;
pub mod commit;
pub mod conflict;
pub mod counters;
pub mod error;
pub mod repository;
pub mod store;
pub mod store_inmemory;
pub mod stream;
