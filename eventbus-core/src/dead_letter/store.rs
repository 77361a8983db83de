use async_trait::async_trait;

use super::DeadLetterEntry;
use crate::error::EventResult;

/// 死信存储：进程内或外部持久化的失败条目列表
///
/// 实现需支持多个处理器同时失败时的并发 `append`，不得丢失写入。
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// 追加一条死信（调度器只记录该方法的失败，不会向上传播）
    async fn append(&self, entry: DeadLetterEntry) -> EventResult<()>;

    /// 按从新到旧的顺序返回至多 `limit` 条
    async fn list(&self, limit: usize) -> EventResult<Vec<DeadLetterEntry>>;

    /// 移除并返回该事件 ID 下的全部条目；不存在时返回空列表且不改动存储
    async fn remove(&self, event_id: &str) -> EventResult<Vec<DeadLetterEntry>>;

    /// 清空全部条目，返回移除数量
    async fn clear(&self) -> EventResult<usize>;

    async fn len(&self) -> EventResult<usize>;

    async fn is_empty(&self) -> EventResult<bool> {
        Ok(self.len().await? == 0)
    }
}
