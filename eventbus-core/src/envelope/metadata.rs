use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PublishContext;

/// 未提供来源时的缺省值
pub const DEFAULT_SOURCE: &str = "unknown";

/// 元数据：由总线在发布时生成，随信封一同投递给处理器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// 事件唯一标识，每次 `publish` 生成
    event_id: String,
    /// 事件名称（形如 `domain.action`）
    event_name: String,
    /// 事件创建时间
    timestamp: DateTime<Utc>,
    /// 事件来源
    source: String,
    /// 链路追踪 ID
    trace_id: String,
    /// 当前尝试的重试序号（首次为 0）
    retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replayed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replay_targets: Option<Vec<String>>,
}

impl Metadata {
    /// 由事件名与发布上下文生成完整元数据（纯函数，无 I/O）
    pub fn enrich(event_name: &str, context: &PublishContext) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_name: event_name.to_string(),
            timestamp: Utc::now(),
            source: context.source().unwrap_or(DEFAULT_SOURCE).to_string(),
            trace_id: context
                .trace_id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            retry_count: context.retry_count().unwrap_or(0),
            replayed_at: context.replayed_at(),
            replay_targets: context.replay_targets().map(<[String]>::to_vec),
        }
    }

    /// 返回一份独立的副本，并写入本次尝试的重试序号
    pub fn with_retry_count(&self, retry_count: u32) -> Self {
        Self {
            retry_count,
            ..self.clone()
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn replayed_at(&self) -> Option<&DateTime<Utc>> {
        self.replayed_at.as_ref()
    }

    pub fn replay_targets(&self) -> Option<&[String]> {
        self.replay_targets.as_deref()
    }

    /// 该事件是否应投递给指定处理器（重放时可能只针对失败的处理器）
    pub fn targets(&self, handler_name: &str) -> bool {
        match &self.replay_targets {
            Some(names) => names.iter().any(|n| n == handler_name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrich_fills_defaults() {
        let m = Metadata::enrich("order.created", &PublishContext::default());
        assert_eq!(m.event_name(), "order.created");
        assert_eq!(m.source(), DEFAULT_SOURCE);
        assert_eq!(m.retry_count(), 0);
        assert!(!m.event_id().is_empty());
        assert!(!m.trace_id().is_empty());
        assert_ne!(m.event_id(), m.trace_id());
        assert!(m.replayed_at().is_none());
    }

    #[test]
    fn enrich_inherits_context() {
        let ctx = PublishContext::builder()
            .source("bookings")
            .trace_id("trace-42")
            .retry_count(2)
            .build();
        let a = Metadata::enrich("booking.approved", &ctx);
        let b = Metadata::enrich("booking.approved", &ctx);

        assert_eq!(a.source(), "bookings");
        assert_eq!(a.trace_id(), "trace-42");
        assert_eq!(a.retry_count(), 2);
        // trace_id 共享，event_id 每次不同
        assert_eq!(a.trace_id(), b.trace_id());
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn caused_by_keeps_trace_chain() {
        let root = Metadata::enrich("match.finished", &PublishContext::default());
        let child = Metadata::enrich("ranking.updated", &PublishContext::caused_by(&root));
        assert_eq!(child.trace_id(), root.trace_id());
        assert_ne!(child.event_id(), root.event_id());
    }

    #[test]
    fn replay_targets_filter_handlers() {
        let plain = Metadata::enrich("x", &PublishContext::default());
        assert!(plain.targets("anyone"));

        let ctx = PublishContext::builder()
            .replay_targets(vec!["mailer".to_string()])
            .build();
        let replay = Metadata::enrich("x", &ctx);
        assert!(replay.targets("mailer"));
        assert!(!replay.targets("audit"));
    }
}
