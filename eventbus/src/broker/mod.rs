//! 消息代理（Broker）协议
//!
//! 网络传输所依赖的最小能力：按通道名收发字节。代理本身只保证
//! “已连接的订阅者能收到连接期间发布的消息”，不提供持久化。
//!
use async_trait::async_trait;
use futures_core::stream::BoxStream;

use crate::error::BusResult;

mod inmemory;
#[cfg(feature = "redis")]
mod redis_broker;

pub use inmemory::InMemoryBroker;
#[cfg(feature = "redis")]
pub use redis_broker::RedisBroker;

/// 某个通道上收到的原始消息流，丢弃即取消订阅
pub type MessageStream = BoxStream<'static, Vec<u8>>;

#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> BusResult<()>;

    /// 向通道发送一条消息
    async fn send(&self, channel: &str, bytes: Vec<u8>) -> BusResult<()>;

    /// 订阅通道，返回 'static 生命周期的消息流，便于在 tokio::spawn 中消费
    async fn receive(&self, channel: &str) -> BusResult<MessageStream>;

    async fn close(&self) -> BusResult<()>;
}
