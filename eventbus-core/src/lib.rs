//! 事件分发核心（eventbus-core）
//!
//! 提供进程内发布/订阅总线的核心构件，供本地与网络两类传输共同复用：
//! - 事件信封（`envelope`）：载荷与总线生成的元数据；
//! - 事件子系统（`eventing`）：处理器、注册表、重试策略与调度器；
//! - 死信（`dead_letter`）：耗尽重试后的失败记录与存储协议。
//!
//! 本 crate 不涉及任何传输细节，具体传输（进程内直调、消息代理广播等）
//! 由上层 `eventbus` crate 基于 `Dispatcher` 组装。
//!
//! 典型用法：
//! 1. 构造 `HandlerRegistry` 与 `DeadLetterStore`；
//! 2. 以二者和 `RetryPolicy` 构建 `Dispatcher`；
//! 3. 为事件名注册处理器，再将 `EventEnvelope` 交给 `Dispatcher::dispatch`。
//!
pub mod dead_letter;
pub mod envelope;
pub mod error;
pub mod eventing;
