//! 内存版消息代理（InMemoryBroker）
//!
//! 基于 `tokio::sync::broadcast` 的按通道广播：
//! - 克隆后共享同一组通道，可模拟多个进程连接同一代理；
//! - 无订阅者时发送的消息被丢弃，与真实 pub/sub 一致；
//! - 可标记为不可达，用于验证连接错误的传播。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use super::{Broker, MessageStream};
use crate::error::{BusError, BusResult};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
    capacity: usize,
    reachable: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InMemoryBroker {
    /// 创建内存代理，`capacity` 为每个通道的广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: DashMap::new(),
                capacity,
                reachable: AtomicBool::new(true),
            }),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// 通道当前的订阅数量
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// 当前持有的通道数量
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// 断开通道：现有订阅流随即结束，模拟代理侧连接中断
    pub fn disconnect(&self, channel: &str) {
        if self.inner.channels.remove(channel).is_some() {
            warn!(channel = %channel, "Channel disconnected");
        }
    }

    fn ensure_reachable(&self) -> BusResult<()> {
        if self.inner.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::Connection("broker unreachable".to_string()))
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> BusResult<()> {
        self.ensure_reachable()
    }

    async fn send(&self, channel: &str, bytes: Vec<u8>) -> BusResult<()> {
        self.ensure_reachable()?;
        let orphaned = match self.inner.channels.get(channel) {
            // 无订阅者时 broadcast 的 send 返回错误，消息按 pub/sub 语义丢弃
            Some(tx) => tx.send(bytes).is_err(),
            None => false,
        };
        if orphaned {
            self.inner
                .channels
                .remove_if(channel, |_, tx| tx.receiver_count() == 0);
        }
        Ok(())
    }

    async fn receive(&self, channel: &str) -> BusResult<MessageStream> {
        self.ensure_reachable()?;
        self.inner.channels.retain(|_, tx| tx.receiver_count() > 0);
        let rx = self
            .inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(rx).filter_map(move |r| {
            let channel = channel.clone();
            async move {
                match r {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Subscriber lagged, messages dropped");
                        None
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> BusResult<()> {
        Ok(())
    }
}
