//! 事件总线（eventbus）
//!
//! 在 `eventbus-core` 的调度核心之上提供总线门面与可替换的传输：
//! - `bus`：发布、订阅、关闭与死信运维（`EventBus`）；
//! - `transport`：本地传输与基于消息代理的网络传输；
//! - `broker`：代理协议及内存实现（`redis` 特性下提供 Redis 实现）；
//! - `store`：外部死信存储后端；
//! - `config`：文件与环境变量驱动的配置加载。
//!
pub mod broker;
pub mod bus;
pub mod config;
pub mod error;
pub mod store;
pub mod transport;

pub use bus::{EventBus, PublishReceipt};
pub use config::{BusConfig, ReplayScope};
pub use error::{BusError, BusResult};
pub use transport::{LocalTransport, NetworkedTransport, Transport, TransportKind};

pub use eventbus_core::dead_letter::{DeadLetterEntry, DeadLetterStore, InMemoryDeadLetterStore};
pub use eventbus_core::envelope::{EventEnvelope, Metadata, PublishContext};
pub use eventbus_core::eventing::{
    DispatchSummary, EventHandler, RetryPolicy, handler_fn,
};
