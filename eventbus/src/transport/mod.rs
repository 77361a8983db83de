//! 传输层（Transport）
//!
//! 总线与投递介质之间的可替换边界：
//! - `LocalTransport`：进程内直接调用 `Dispatcher`，无序列化；
//! - `NetworkedTransport`：序列化信封并经 `Broker` 广播，远端监听者反序列化后
//!   交给本进程的 `Dispatcher`，重试与死信语义与本地完全一致。
//!
use std::sync::Arc;

use async_trait::async_trait;
use eventbus_core::envelope::EventEnvelope;
use eventbus_core::eventing::{DispatchSummary, Dispatcher};
use serde::Deserialize;

use crate::error::BusResult;

mod local;
mod networked;

pub use local::LocalTransport;
pub use networked::NetworkedTransport;

/// 传输类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Local,
    Networked,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn connect(&self) -> BusResult<()>;

    /// 投递信封；本地传输返回调度结果，网络传输在发送后即返回 `None`
    async fn send(
        &self,
        envelope: EventEnvelope,
        dispatcher: &Arc<Dispatcher>,
    ) -> BusResult<Option<DispatchSummary>>;

    /// 为事件名打开通道（该事件名出现第一个处理器时调用）
    async fn open_channel(&self, event_name: &str, dispatcher: Arc<Dispatcher>) -> BusResult<()>;

    /// 关闭事件名的通道（该事件名最后一个处理器移除时调用）
    async fn close_channel(&self, event_name: &str) -> BusResult<()>;

    /// 停止接收新消息，不中断进行中的处理
    async fn close(&self) -> BusResult<()>;
}
