use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Metadata;

/// 死信条目：某个处理器针对某次发布耗尽重试后的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    event_name: String,
    /// 失败的处理器名称
    handler_name: String,
    payload: Value,
    /// 元数据，`retry_count` 为最后一次尝试的序号
    metadata: Metadata,
    /// 错误信息（`Display`）
    error_message: String,
    /// 错误详情（含错误链的 `Debug` 输出）
    error_detail: String,
    enqueued_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(
        handler_name: &str,
        payload: Value,
        metadata: Metadata,
        error: &anyhow::Error,
    ) -> Self {
        Self {
            event_name: metadata.event_name().to_string(),
            handler_name: handler_name.to_string(),
            payload,
            metadata,
            error_message: error.to_string(),
            error_detail: format!("{error:?}"),
            enqueued_at: Utc::now(),
        }
    }

    pub fn event_id(&self) -> &str {
        self.metadata.event_id()
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn error_detail(&self) -> &str {
        &self.error_detail
    }

    pub fn enqueued_at(&self) -> &DateTime<Utc> {
        &self.enqueued_at
    }
}
