//! 外部持久化的死信存储实现
//!
//! 内存实现位于 `eventbus_core::dead_letter`，这里提供需要外部资源的后端。

#[cfg(feature = "redis")]
mod redis_store;

#[cfg(feature = "redis")]
pub use redis_store::RedisDeadLetterStore;
