//! Redis pub/sub 消息代理（RedisBroker）
//!
//! - 发布走共享的 `ConnectionManager`（断线自动重连）；
//! - 每个订阅通道独占一条 pub/sub 连接，消息流被丢弃时连接随之关闭。

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{Broker, MessageStream};
use crate::error::BusResult;

pub struct RedisBroker {
    client: Client,
    publisher: OnceCell<ConnectionManager>,
}

impl RedisBroker {
    /// 创建 Redis 代理（惰性连接，首次使用或 `connect` 时建立）
    ///
    /// # Arguments
    /// * `url` - Redis 连接地址（如 redis://localhost:6379/0）
    pub fn open(url: &str) -> BusResult<Self> {
        Ok(Self {
            client: Client::open(url)?,
            publisher: OnceCell::new(),
        })
    }

    async fn publisher(&self) -> BusResult<ConnectionManager> {
        let conn = self
            .publisher
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn connect(&self) -> BusResult<()> {
        self.publisher().await?;
        info!("Connected to Redis broker");
        Ok(())
    }

    async fn send(&self, channel: &str, bytes: Vec<u8>) -> BusResult<()> {
        let mut conn = self.publisher().await?;
        let receivers: i64 = conn.publish(channel, bytes).await?;
        debug!(channel = %channel, receivers = receivers, "Published to Redis channel");
        Ok(())
    }

    async fn receive(&self, channel: &str) -> BusResult<MessageStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel = %channel, "Subscribed to Redis channel");

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> BusResult<()> {
        // 连接随 Drop 释放，这里仅作记录
        debug!("Redis broker closed");
        Ok(())
    }
}
