//! 事件处理器（EventHandler）
//!
//! 定义消费某个事件名的处理逻辑与元信息（名称）。处理器接收载荷与元数据，
//! 返回成功或失败；失败由调度器的重试循环消化。
//!
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::Metadata;

/// 事件处理器：处理某一事件名下的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志、死信条目与定向重放）
    fn handler_name(&self) -> &str;
    /// 处理事件
    async fn handle(&self, payload: &Value, metadata: &Metadata) -> anyhow::Result<()>;
}

/// 闭包处理器，由 [`handler_fn`] 构造
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Value, Metadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, payload: &Value, metadata: &Metadata) -> anyhow::Result<()> {
        (self.f)(payload.clone(), metadata.clone()).await
    }
}

/// 将异步闭包包装为可注册的处理器
///
/// ```rust
/// use eventbus_core::eventing::{EventHandler, handler_fn};
///
/// let handler = handler_fn("mailer", |payload, _metadata| async move {
///     anyhow::ensure!(payload["to"].is_string(), "missing recipient");
///     Ok(())
/// });
/// assert_eq!(handler.handler_name(), "mailer");
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Value, Metadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}
