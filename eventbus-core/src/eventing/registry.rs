//! 处理器注册表（HandlerRegistry）
//!
//! 事件名 → 处理器集合的映射，支持并发读写：
//! - `add`：按 `Arc` 指针判重，重复注册不会重复调用；同一事件名下处理器名称唯一；
//! - `remove`：不存在时为空操作，移除最后一个处理器时整条映射一并删除；
//! - `handlers_for`：返回快照，迭代期间的订阅变更不会影响本次调度。
//!
use std::sync::Arc;

use dashmap::DashMap;

use super::EventHandler;
use crate::error::{EventError, EventResult};

/// 注册结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// 该事件名下的第一个处理器（传输层需打开通道）
    First,
    Added,
    /// 同一处理器已注册，保持幂等
    AlreadyRegistered,
}

/// 注销结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
    /// 移除的是该事件名下最后一个处理器（传输层需关闭通道）
    Last,
    Removed,
    NotFound,
}

#[derive(Default)]
pub struct HandlerRegistry {
    by_name: DashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event_name: &str, handler: Arc<dyn EventHandler>) -> EventResult<Registration> {
        if event_name.trim().is_empty() {
            return Err(EventError::invalid_handler(
                event_name,
                "event name must not be empty",
            ));
        }
        if handler.handler_name().trim().is_empty() {
            return Err(EventError::invalid_handler(
                event_name,
                "handler name must not be empty",
            ));
        }

        let mut list = self.by_name.entry(event_name.to_string()).or_default();
        if list.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return Ok(Registration::AlreadyRegistered);
        }
        // 名称是死信条目与定向重放的身份，同一事件名下必须唯一
        if list.iter().any(|h| h.handler_name() == handler.handler_name()) {
            return Err(EventError::invalid_handler(
                event_name,
                format!("handler name `{}` already registered", handler.handler_name()),
            ));
        }
        list.push(handler);

        Ok(if list.len() == 1 {
            Registration::First
        } else {
            Registration::Added
        })
    }

    pub fn remove(&self, event_name: &str, handler: &Arc<dyn EventHandler>) -> Removal {
        let Some(mut list) = self.by_name.get_mut(event_name) else {
            return Removal::NotFound;
        };

        let before = list.len();
        list.retain(|h| !Arc::ptr_eq(h, handler));
        if list.len() == before {
            return Removal::NotFound;
        }

        let emptied = list.is_empty();
        // 释放分片写锁后再删除键，避免 DashMap 自锁
        drop(list);

        if emptied {
            self.by_name.remove_if(event_name, |_, v| v.is_empty());
            Removal::Last
        } else {
            Removal::Removed
        }
    }

    /// 处理器快照（不暴露内部集合）
    pub fn handlers_for(&self, event_name: &str) -> Vec<Arc<dyn EventHandler>> {
        self.by_name
            .get(event_name)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// 已注册的事件名（按字典序）
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_name
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        self.by_name.get(event_name).map(|l| l.len()).unwrap_or(0)
    }
}
