//! 事件核心统一错误定义
//!
//! 聚焦处理器注册、死信存储与序列化三类最小必要集合，
//! 便于上层（总线/传输实现）统一转换。
//!
//! 注意：处理器执行失败不在此列，它们由重试循环在本地消化，
//! 最终以死信条目的形式可见，而不会返回给发布方。
//!
use thiserror::Error;

/// 统一错误类型（核心最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 处理器注册 ---
    #[error("invalid handler: event={event_name}, reason={reason}")]
    InvalidHandler { event_name: String, reason: String },

    // --- 死信存储 ---
    #[error("dead letter store error: {reason}")]
    DeadLetterStore { reason: String },
}

impl EventError {
    pub fn invalid_handler(event_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHandler {
            event_name: event_name.into(),
            reason: reason.into(),
        }
    }

    pub fn dead_letter_store(reason: impl Into<String>) -> Self {
        Self::DeadLetterStore {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type EventResult<T> = Result<T, EventError>;
