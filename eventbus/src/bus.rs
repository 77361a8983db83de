//! 事件总线门面（EventBus）
//!
//! 每个总线实例独占自己的注册表、调度器、死信存储与传输，不存在进程级单例：
//! - `publish`：构造信封并交给传输；本地传输在全部处理器成功或进入死信后才返回；
//! - `subscribe`/`unsubscribe`：串行执行，保证通道的打开/关闭在返回前完成；
//! - 死信运维：查看、清空与按事件 ID 重放。
//!
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bon::bon;
use chrono::Utc;
use eventbus_core::dead_letter::{DeadLetterEntry, DeadLetterStore, InMemoryDeadLetterStore};
use eventbus_core::envelope::{EventEnvelope, PublishContext};
use eventbus_core::error::EventError;
use eventbus_core::eventing::{
    DispatchSummary, Dispatcher, EventHandler, HandlerRegistry, Registration, Removal, RetryPolicy,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::{BusConfig, DeadLetterBackend, ReplayScope};
use crate::error::{BusError, BusResult};
use crate::transport::{LocalTransport, NetworkedTransport, Transport, TransportKind};

/// 发布回执
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: String,
    pub trace_id: String,
    /// 本地传输的调度结果；网络传输由远端调度，为 `None`
    pub dispatch: Option<DispatchSummary>,
}

pub struct EventBus {
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    replay_scope: ReplayScope,
    /// 串行化订阅变更与通道开关
    channel_guard: Mutex<()>,
    closed: AtomicBool,
}

#[bon]
impl EventBus {
    #[builder]
    pub fn new(
        transport: Arc<dyn Transport>,
        dead_letters: Option<Arc<dyn DeadLetterStore>>,
        retry_policy: Option<RetryPolicy>,
        handler_concurrency: Option<usize>,
        replay_scope: Option<ReplayScope>,
    ) -> Self {
        let dead_letters =
            dead_letters.unwrap_or_else(|| Arc::new(InMemoryDeadLetterStore::new()));
        let dispatcher = Dispatcher::builder()
            .registry(Arc::new(HandlerRegistry::new()))
            .dead_letters(dead_letters)
            .retry_policy(retry_policy.unwrap_or_default())
            .maybe_handler_concurrency(handler_concurrency)
            .build();

        Self {
            dispatcher: Arc::new(dispatcher),
            transport,
            replay_scope: replay_scope.unwrap_or_default(),
            channel_guard: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }
}

impl EventBus {
    /// 使用默认配置的进程内总线
    pub fn local() -> Self {
        Self::builder().transport(Arc::new(LocalTransport)).build()
    }

    /// 按配置构建总线（尚未连接，需调用 `connect`）
    pub async fn from_config(config: &BusConfig) -> BusResult<Self> {
        let transport: Arc<dyn Transport> = match config.transport.kind {
            TransportKind::Local => Arc::new(LocalTransport),
            TransportKind::Networked => Arc::new(networked_transport(config)?),
        };
        let dead_letters = dead_letter_store(config).await?;

        Ok(Self::builder()
            .transport(transport)
            .dead_letters(dead_letters)
            .retry_policy(config.retry_policy())
            .maybe_handler_concurrency(config.handler_concurrency)
            .replay_scope(config.replay_scope)
            .build())
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub async fn connect(&self) -> BusResult<()> {
        self.ensure_open()?;
        self.transport.connect().await?;
        info!(transport = ?self.transport.kind(), "Event bus connected");
        Ok(())
    }

    pub async fn publish(
        &self,
        event_name: &str,
        payload: Value,
        context: PublishContext,
    ) -> BusResult<PublishReceipt> {
        self.ensure_open()?;
        let envelope = EventEnvelope::new(event_name, payload, &context);
        let event_id = envelope.metadata().event_id().to_string();
        let trace_id = envelope.metadata().trace_id().to_string();

        debug!(
            event_name = %event_name,
            event_id = %event_id,
            trace_id = %trace_id,
            "Publishing event"
        );
        let dispatch = self.transport.send(envelope, &self.dispatcher).await?;

        Ok(PublishReceipt {
            event_id,
            trace_id,
            dispatch,
        })
    }

    /// 序列化任意载荷后发布
    pub async fn publish_json<T>(
        &self,
        event_name: &str,
        payload: &T,
        context: PublishContext,
    ) -> BusResult<PublishReceipt>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload).map_err(EventError::from)?;
        self.publish(event_name, payload, context).await
    }

    pub async fn subscribe(&self, event_name: &str, handler: Arc<dyn EventHandler>) -> BusResult<()> {
        self.ensure_open()?;
        let _guard = self.channel_guard.lock().await;

        if self.registry().add(event_name, handler.clone())? == Registration::First {
            if let Err(err) = self
                .transport
                .open_channel(event_name, self.dispatcher.clone())
                .await
            {
                // 通道未能打开，回滚注册
                self.registry().remove(event_name, &handler);
                return Err(err);
            }
            debug!(event_name = %event_name, "Opened channel for first handler");
        }
        Ok(())
    }

    pub async fn unsubscribe(&self, event_name: &str, handler: &Arc<dyn EventHandler>) -> BusResult<()> {
        let _guard = self.channel_guard.lock().await;

        if self.registry().remove(event_name, handler) == Removal::Last {
            self.transport.close_channel(event_name).await?;
            debug!(event_name = %event_name, "Closed channel after last handler left");
        }
        Ok(())
    }

    /// 停止接收新的工作，不中断进行中的处理器调用
    pub async fn close(&self) -> BusResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.channel_guard.lock().await;
        self.transport.close().await?;
        info!("Event bus closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn registered_events(&self) -> Vec<String> {
        self.registry().event_names()
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        self.registry().handler_count(event_name)
    }

    pub async fn dead_letter_queue(&self, limit: usize) -> BusResult<Vec<DeadLetterEntry>> {
        Ok(self.dead_letters().list(limit).await?)
    }

    pub async fn dead_letter_count(&self) -> BusResult<usize> {
        Ok(self.dead_letters().len().await?)
    }

    pub async fn clear_dead_letter_queue(&self) -> BusResult<usize> {
        let count = self.dead_letters().clear().await?;
        info!(count = count, "Dead letter queue cleared");
        Ok(count)
    }

    /// 重放死信：移除该事件 ID 的全部条目，并以 `retry_count = 0` 重新发布
    ///
    /// 重放会生成新的 `event_id`，沿用原 `trace_id` 与 `source`，并写入 `replayed_at`。
    /// `FailedHandlers` 范围下，只有当失败的处理器名称仍全部在册时才定向投递，
    /// 否则（例如失败的处理器已被替换）回退为投递给全部处理器。
    /// 本地传输下该事件名已无处理器，或重新发布失败（如代理不可达）时，
    /// 条目会被放回死信存储。
    pub async fn replay_from_dead_letter_queue(&self, event_id: &str) -> BusResult<PublishReceipt> {
        self.ensure_open()?;
        let entries = self.dead_letters().remove(event_id).await?;
        let Some(first) = entries.first() else {
            return Err(BusError::ReplayNotFound {
                event_id: event_id.to_string(),
            });
        };
        let event_name = first.event_name().to_string();
        let payload = first.payload().clone();

        let registered: Vec<String> = self
            .registry()
            .handlers_for(&event_name)
            .iter()
            .map(|h| h.handler_name().to_string())
            .collect();
        if registered.is_empty() && self.transport.kind() == TransportKind::Local {
            self.restore_dead_letters(entries).await;
            return Err(BusError::ReplayNoHandlers {
                event_id: event_id.to_string(),
                event_name,
            });
        }

        let targets = self.replay_targets(&entries, &registered);
        let context = PublishContext::builder()
            .source(first.metadata().source())
            .trace_id(first.metadata().trace_id())
            .retry_count(0)
            .replayed_at(Utc::now())
            .maybe_replay_targets(targets.clone())
            .build();

        info!(
            event_name = %event_name,
            event_id = %event_id,
            entries = entries.len(),
            scope = ?self.replay_scope,
            targets = ?targets,
            "Replaying dead letter"
        );

        match self.publish(&event_name, payload, context).await {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                self.restore_dead_letters(entries).await;
                Err(err)
            }
        }
    }

    /// 计算重放目标；`None` 表示投递给全部处理器
    fn replay_targets(&self, entries: &[DeadLetterEntry], registered: &[String]) -> Option<Vec<String>> {
        if self.replay_scope == ReplayScope::AllHandlers {
            return None;
        }

        let mut failed: Vec<String> = entries.iter().map(|e| e.handler_name().to_string()).collect();
        failed.sort();
        failed.dedup();

        let missing: Vec<&String> = failed.iter().filter(|n| !registered.contains(*n)).collect();
        if !missing.is_empty() && !registered.is_empty() {
            info!(
                missing = ?missing,
                "Failed handlers are no longer registered, replaying to all handlers"
            );
            return None;
        }
        Some(failed)
    }

    async fn restore_dead_letters(&self, entries: Vec<DeadLetterEntry>) {
        for entry in entries {
            if let Err(store_err) = self.dead_letters().append(entry).await {
                error!(error = %store_err, "Failed to restore dead letter after replay failure");
            }
        }
    }

    fn registry(&self) -> &Arc<HandlerRegistry> {
        self.dispatcher.registry()
    }

    fn dead_letters(&self) -> &Arc<dyn DeadLetterStore> {
        self.dispatcher.dead_letters()
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

#[cfg(feature = "redis")]
fn networked_transport(config: &BusConfig) -> BusResult<NetworkedTransport> {
    let broker = &config.transport.broker;
    let redis = crate::broker::RedisBroker::open(&broker.url())?;
    Ok(NetworkedTransport::new(
        Arc::new(redis),
        broker.channel_prefix.clone(),
    ))
}

#[cfg(not(feature = "redis"))]
fn networked_transport(_config: &BusConfig) -> BusResult<NetworkedTransport> {
    Err(BusError::Config(
        "networked transport requires the `redis` feature".to_string(),
    ))
}

async fn dead_letter_store(config: &BusConfig) -> BusResult<Arc<dyn DeadLetterStore>> {
    match config.dead_letter_backend {
        DeadLetterBackend::Memory => Ok(Arc::new(InMemoryDeadLetterStore::new())),
        #[cfg(feature = "redis")]
        DeadLetterBackend::Redis => {
            let broker = &config.transport.broker;
            let store =
                crate::store::RedisDeadLetterStore::new(&broker.url(), &broker.channel_prefix)
                    .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        DeadLetterBackend::Redis => Err(BusError::Config(
            "redis dead letter backend requires the `redis` feature".to_string(),
        )),
    }
}
