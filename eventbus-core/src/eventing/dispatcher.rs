//! 事件调度器（Dispatcher）
//!
//! 将一个信封并发扇出给该事件名下的全部处理器：
//! - 每个处理器拥有独立的重试循环，退避只挂起自身，不影响其他处理器；
//! - 耗尽重试后写入死信存储，写入失败只记录日志；
//! - `dispatch` 在所有分支成功或进入死信后才返回，且永不失败。
//!
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use bon::Builder;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, stream};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{EventHandler, HandlerRegistry, RetryPolicy};
use crate::dead_letter::{DeadLetterEntry, DeadLetterStore};
use crate::envelope::{EventEnvelope, Metadata};

#[derive(Builder)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    dead_letters: Arc<dyn DeadLetterStore>,
    #[builder(default)]
    retry_policy: RetryPolicy,
    /// 单事件的处理并发上限，缺省不限
    handler_concurrency: Option<usize>,
}

/// 单次调度的统计结果（仅用于诊断）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// 参与调度的处理器数量
    pub handlers: usize,
    /// 最终成功的处理器数量（含重试后成功）
    pub delivered: usize,
    /// 经过重试才成功的处理器数量
    pub recovered: usize,
    pub dead_lettered: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: HandlerOutcome) {
        match outcome {
            HandlerOutcome::Delivered => self.delivered += 1,
            HandlerOutcome::Recovered => {
                self.delivered += 1;
                self.recovered += 1;
            }
            HandlerOutcome::DeadLettered => self.dead_lettered += 1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum HandlerOutcome {
    Delivered,
    Recovered,
    DeadLettered,
}

impl Dispatcher {
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterStore> {
        &self.dead_letters
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    pub async fn dispatch(&self, envelope: &EventEnvelope) -> DispatchSummary {
        let metadata = envelope.metadata();
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .registry
            .handlers_for(envelope.event_name())
            .into_iter()
            .filter(|h| metadata.targets(h.handler_name()))
            .collect();

        if handlers.is_empty() {
            debug!(
                event_name = %envelope.event_name(),
                event_id = %metadata.event_id(),
                "No handlers registered, dispatch is a no-op"
            );
            return DispatchSummary::default();
        }

        let mut summary = DispatchSummary {
            handlers: handlers.len(),
            ..Default::default()
        };
        let concurrency = self.handler_concurrency.unwrap_or(handlers.len()).max(1);

        // 先装箱再驱动，避免闭包生命周期推断阻碍 `Send`
        let branches: Vec<BoxFuture<'_, HandlerOutcome>> = handlers
            .into_iter()
            .map(|h| self.deliver(h, envelope).boxed())
            .collect();
        let outcomes: Vec<HandlerOutcome> = stream::iter(branches)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }
        summary
    }

    async fn deliver(&self, handler: Arc<dyn EventHandler>, envelope: &EventEnvelope) -> HandlerOutcome {
        let name = handler.handler_name();
        let mut attempt = 0u32;

        loop {
            let metadata = envelope.metadata().with_retry_count(attempt);
            let err = match invoke(handler.as_ref(), envelope.payload(), &metadata).await {
                Ok(()) if attempt > 0 => {
                    info!(
                        handler = %name,
                        event_name = %envelope.event_name(),
                        event_id = %metadata.event_id(),
                        attempts = attempt + 1,
                        "Handler recovered after retry"
                    );
                    return HandlerOutcome::Recovered;
                }
                Ok(()) => return HandlerOutcome::Delivered,
                Err(err) => err,
            };

            if self.retry_policy.should_retry(attempt) {
                let delay = self.retry_policy.delay_for(attempt);
                warn!(
                    handler = %name,
                    event_name = %envelope.event_name(),
                    event_id = %metadata.event_id(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Handler failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            error!(
                handler = %name,
                event_name = %envelope.event_name(),
                event_id = %metadata.event_id(),
                attempts = attempt + 1,
                error = %err,
                "Handler exhausted retries, moving to dead letter queue"
            );
            let entry = DeadLetterEntry::new(name, envelope.payload().clone(), metadata, &err);
            if let Err(store_err) = self.dead_letters.append(entry).await {
                error!(
                    handler = %name,
                    event_name = %envelope.event_name(),
                    error = %store_err,
                    "Failed to record dead letter"
                );
            }
            return HandlerOutcome::DeadLettered;
        }
    }
}

/// 调用处理器，panic 视为一次失败的尝试
async fn invoke(handler: &dyn EventHandler, payload: &Value, metadata: &Metadata) -> anyhow::Result<()> {
    match AssertUnwindSafe(handler.handle(payload, metadata))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(anyhow!("handler panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
