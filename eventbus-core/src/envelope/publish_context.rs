use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// 发布上下文：调用方在 `publish` 时可选提供的横切信息
///
/// 字段固定，反序列化时拒绝未知字段，避免静默接收任意键。
#[derive(Builder, Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PublishContext {
    /// 事件来源（模块/服务名），缺省为 `unknown`
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    /// 链路追踪 ID，跨因果链继承；缺省时重新生成
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    /// 初始重试计数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_count: Option<u32>,
    /// 死信重放时间（仅由重放流程设置）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replayed_at: Option<DateTime<Utc>>,
    /// 重放目标处理器名称（仅由重放流程设置）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replay_targets: Option<Vec<String>>,
}

impl PublishContext {
    /// 以上游事件为因，继承其 trace_id 与 source
    pub fn caused_by(metadata: &Metadata) -> Self {
        Self {
            source: Some(metadata.source().to_string()),
            trace_id: Some(metadata.trace_id().to_string()),
            ..Default::default()
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn retry_count(&self) -> Option<u32> {
        self.retry_count
    }

    pub fn replayed_at(&self) -> Option<DateTime<Utc>> {
        self.replayed_at
    }

    pub fn replay_targets(&self) -> Option<&[String]> {
        self.replay_targets.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_fields() {
        let ok: PublishContext =
            serde_json::from_value(serde_json::json!({"source": "matches", "traceId": "t-1"}))
                .unwrap();
        assert_eq!(ok.source(), Some("matches"));
        assert_eq!(ok.trace_id(), Some("t-1"));

        let err = serde_json::from_value::<PublishContext>(serde_json::json!({"tenant": "x"}));
        assert!(err.is_err());
    }
}
