//! 死信（Dead Letter）子系统
//!
//! 处理器耗尽重试后，失败会以 `DeadLetterEntry` 的形式落入 `DeadLetterStore`：
//! - 每个（事件, 处理器）失败恰好产生一条条目；
//! - 条目以 `metadata.event_id` 为键，供运维查看、清理与重放；
//! - 条目不会自动过期。
//!
mod entry;
mod inmemory;
mod store;

pub use entry::DeadLetterEntry;
pub use inmemory::InMemoryDeadLetterStore;
pub use store::DeadLetterStore;
