//! 网络传输（NetworkedTransport）
//!
//! 每个事件名在本进程内只开一个代理订阅（扇入），收到的消息各自在独立任务中调度，
//! 因此较早消息的重试可能与较晚消息的处理重叠。
//!
//! 注意：代理不提供持久化，无订阅者时发布的消息或退避期间进程崩溃的消息会永久丢失。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use eventbus_core::envelope::EventEnvelope;
use eventbus_core::eventing::{DispatchSummary, Dispatcher};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::{Transport, TransportKind};
use crate::broker::{Broker, MessageStream};
use crate::error::{BusError, BusResult};

const RESUBSCRIBE_BASE_DELAY: Duration = Duration::from_millis(100);
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(5);

pub struct NetworkedTransport {
    broker: Arc<dyn Broker>,
    channel_prefix: String,
    listeners: DashMap<String, Listener>,
    shutdown: CancellationToken,
    /// 进行中的远端调度任务
    inflight: TaskTracker,
    drain_guard: Mutex<()>,
}

struct Listener {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl NetworkedTransport {
    pub fn new(broker: Arc<dyn Broker>, channel_prefix: impl Into<String>) -> Self {
        Self {
            broker,
            channel_prefix: channel_prefix.into(),
            listeners: DashMap::new(),
            shutdown: CancellationToken::new(),
            inflight: TaskTracker::new(),
            drain_guard: Mutex::new(()),
        }
    }

    /// 事件名对应的代理通道名
    pub fn channel_for(&self, event_name: &str) -> String {
        format!("{}{}", self.channel_prefix, event_name)
    }

    /// 等待当前所有进行中的调度结束（并发调用依次执行）
    pub async fn drain(&self) {
        let _guard = self.drain_guard.lock().await;
        self.inflight.close();
        self.inflight.wait().await;
        self.inflight.reopen();
    }

    async fn listen(
        broker: Arc<dyn Broker>,
        channel: String,
        mut stream: MessageStream,
        token: CancellationToken,
        dispatcher: Arc<Dispatcher>,
        inflight: TaskTracker,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                maybe_msg = stream.next() => {
                    let Some(bytes) = maybe_msg else {
                        warn!(channel = %channel, "Broker subscription ended, resubscribing");
                        match Self::resubscribe(broker.as_ref(), &channel, &token).await {
                            Some(next) => {
                                stream = next;
                                continue;
                            }
                            None => break,
                        }
                    };
                    match EventEnvelope::from_bytes(&bytes) {
                        Ok(envelope) => {
                            let dispatcher = dispatcher.clone();
                            inflight.spawn(async move {
                                dispatcher.dispatch(&envelope).await;
                            });
                        }
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "Dropping undecodable message");
                        }
                    }
                }
            }
        }
        debug!(channel = %channel, "Listener stopped");
    }

    /// 以指数退避重新订阅，直到成功或被取消（取消时返回 `None`）
    async fn resubscribe(
        broker: &dyn Broker,
        channel: &str,
        token: &CancellationToken,
    ) -> Option<MessageStream> {
        let mut delay = RESUBSCRIBE_BASE_DELAY;
        loop {
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            match broker.receive(channel).await {
                Ok(stream) => {
                    info!(channel = %channel, "Resubscribed to broker channel");
                    return Some(stream);
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Resubscribe failed");
                    delay = (delay * 2).min(RESUBSCRIBE_MAX_DELAY);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for NetworkedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Networked
    }

    async fn connect(&self) -> BusResult<()> {
        self.broker.connect().await
    }

    async fn send(
        &self,
        envelope: EventEnvelope,
        _dispatcher: &Arc<Dispatcher>,
    ) -> BusResult<Option<DispatchSummary>> {
        let bytes = envelope.to_bytes()?;
        self.broker
            .send(&self.channel_for(envelope.event_name()), bytes)
            .await?;
        Ok(None)
    }

    async fn open_channel(&self, event_name: &str, dispatcher: Arc<Dispatcher>) -> BusResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(BusError::Closed);
        }
        if let Some(existing) = self.listeners.get(event_name) {
            if !existing.handle.is_finished() {
                return Ok(());
            }
        }

        let channel = self.channel_for(event_name);
        let stream = self.broker.receive(&channel).await?;
        let token = self.shutdown.child_token();
        let handle = tokio::spawn(Self::listen(
            self.broker.clone(),
            channel.clone(),
            stream,
            token.clone(),
            dispatcher,
            self.inflight.clone(),
        ));

        self.listeners
            .insert(event_name.to_string(), Listener { token, handle });
        debug!(channel = %channel, "Listening on broker channel");
        Ok(())
    }

    async fn close_channel(&self, event_name: &str) -> BusResult<()> {
        if let Some((_, listener)) = self.listeners.remove(event_name) {
            listener.token.cancel();
            // 等待监听任务退出，确保代理订阅已释放
            let _ = listener.handle.await;
            debug!(channel = %self.channel_for(event_name), "Closed broker channel");
        }
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        self.shutdown.cancel();
        let names: Vec<String> = self.listeners.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, listener)) = self.listeners.remove(&name) {
                let _ = listener.handle.await;
            }
        }
        self.broker.close().await?;
        info!("Networked transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use eventbus_core::dead_letter::InMemoryDeadLetterStore;
    use eventbus_core::envelope::PublishContext;
    use eventbus_core::eventing::{HandlerRegistry, handler_fn};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dispatcher(registry: Arc<HandlerRegistry>) -> Arc<Dispatcher> {
        Arc::new(
            Dispatcher::builder()
                .registry(registry)
                .dead_letters(Arc::new(InMemoryDeadLetterStore::new()))
                .build(),
        )
    }

    #[tokio::test]
    async fn one_broker_subscription_per_event_name() {
        let broker = InMemoryBroker::default();
        let transport = NetworkedTransport::new(Arc::new(broker.clone()), "test:");
        let d = dispatcher(Arc::new(HandlerRegistry::new()));

        transport.open_channel("x", d.clone()).await.unwrap();
        transport.open_channel("x", d.clone()).await.unwrap();
        assert_eq!(broker.subscriber_count("test:x"), 1);

        transport.close_channel("x").await.unwrap();
        assert_eq!(broker.subscriber_count("test:x"), 0);
        // 重复关闭为空操作
        transport.close_channel("x").await.unwrap();
    }

    #[tokio::test]
    async fn received_messages_reach_local_dispatcher() {
        let broker = InMemoryBroker::default();
        let transport = NetworkedTransport::new(Arc::new(broker.clone()), "test:");
        let registry = Arc::new(HandlerRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry
            .add(
                "x",
                handler_fn("count", move |_, _| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();
        let d = dispatcher(registry);
        transport.open_channel("x", d.clone()).await.unwrap();

        // 非法消息被丢弃，监听不中断
        broker.send("test:x", b"garbage".to_vec()).await.unwrap();
        let env = EventEnvelope::new("x", json!({"id": 1}), &PublishContext::default());
        assert_eq!(transport.send(env, &d).await.unwrap(), None);

        tokio::time::timeout(Duration::from_secs(2), async {
            while hits.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        transport.drain().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        transport.close().await.unwrap();
        assert_eq!(broker.subscriber_count("test:x"), 0);
        assert!(matches!(
            transport.open_channel("x", d).await,
            Err(BusError::Closed)
        ));
    }

    async fn wait_until(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn listener_resubscribes_after_stream_ends() {
        let broker = InMemoryBroker::default();
        let transport = NetworkedTransport::new(Arc::new(broker.clone()), "test:");
        let registry = Arc::new(HandlerRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry
            .add(
                "x",
                handler_fn("count", move |_, _| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();
        let d = dispatcher(registry);
        transport.open_channel("x", d.clone()).await.unwrap();

        broker.disconnect("test:x");
        wait_until(|| broker.subscriber_count("test:x") == 1).await;

        let env = EventEnvelope::new("x", json!({}), &PublishContext::default());
        transport.send(env, &d).await.unwrap();
        wait_until(|| hits.load(Ordering::SeqCst) == 1).await;

        transport.close_channel("x").await.unwrap();
        assert_eq!(broker.subscriber_count("test:x"), 0);
    }

    #[tokio::test]
    async fn concurrent_drains_both_return() {
        let broker = InMemoryBroker::default();
        let transport = NetworkedTransport::new(Arc::new(broker.clone()), "test:");
        let registry = Arc::new(HandlerRegistry::new());
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        registry
            .add(
                "x",
                handler_fn("slow", move |_, _| {
                    let counter = counter.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();
        let d = dispatcher(registry);
        transport.open_channel("x", d.clone()).await.unwrap();

        for _ in 0..3 {
            let env = EventEnvelope::new("x", json!({}), &PublishContext::default());
            transport.send(env, &d).await.unwrap();
        }
        wait_until(|| transport.inflight.len() == 3).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(transport.drain(), transport.drain());
        })
        .await
        .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }
}
