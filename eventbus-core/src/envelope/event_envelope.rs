use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Metadata, PublishContext};
use crate::error::EventResult;

/// 事件信封，包含调用方载荷与总线生成的元数据
///
/// 序列化后的形态 `{ payload, metadata }` 即网络传输的线上格式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    payload: Value,
    metadata: Metadata,
}

impl EventEnvelope {
    pub fn new(event_name: &str, payload: Value, context: &PublishContext) -> Self {
        Self {
            payload,
            metadata: Metadata::enrich(event_name, context),
        }
    }

    pub fn from_parts(payload: Value, metadata: Metadata) -> Self {
        Self { payload, metadata }
    }

    pub fn event_name(&self) -> &str {
        self.metadata.event_name()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn to_bytes(&self) -> EventResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> EventResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
