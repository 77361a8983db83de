//! 事件信封（Envelope）与元数据
//!
//! 定义发布方可提供的固定上下文（`PublishContext`）、由总线生成的元数据（`Metadata`），
//! 以及二者与载荷组合后的 `EventEnvelope`。信封同时是网络传输的线上格式。

mod event_envelope;
mod metadata;
mod publish_context;

pub use event_envelope::EventEnvelope;
pub use metadata::{DEFAULT_SOURCE, Metadata};
pub use publish_context::PublishContext;
