//! 事件子系统（eventing）
//!
//! 提供与传输无关的分发核心：
//! - `EventHandler`：消费事件的处理器能力；
//! - `HandlerRegistry`：事件名到处理器集合的并发安全映射；
//! - `RetryPolicy`：指数退避的纯函数策略；
//! - `Dispatcher`：并发扇出、逐处理器重试与死信落地。
//!
//! 该模块不绑定具体传输，本地与网络传输共享同一套调度语义。
//!
pub mod dispatcher;
pub mod handler;
pub mod registry;
pub mod retry;

pub use dispatcher::{DispatchSummary, Dispatcher};
pub use handler::{EventHandler, FnHandler, handler_fn};
pub use registry::{HandlerRegistry, Registration, Removal};
pub use retry::RetryPolicy;
