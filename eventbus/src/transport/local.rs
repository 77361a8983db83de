use std::sync::Arc;

use async_trait::async_trait;
use eventbus_core::envelope::EventEnvelope;
use eventbus_core::eventing::{DispatchSummary, Dispatcher};

use super::{Transport, TransportKind};
use crate::error::BusResult;

/// 进程内传输：发布即调度，可靠性与进程一致（崩溃即丢失）
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalTransport;

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn connect(&self) -> BusResult<()> {
        Ok(())
    }

    async fn send(
        &self,
        envelope: EventEnvelope,
        dispatcher: &Arc<Dispatcher>,
    ) -> BusResult<Option<DispatchSummary>> {
        Ok(Some(dispatcher.dispatch(&envelope).await))
    }

    async fn open_channel(&self, _event_name: &str, _dispatcher: Arc<Dispatcher>) -> BusResult<()> {
        Ok(())
    }

    async fn close_channel(&self, _event_name: &str) -> BusResult<()> {
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        Ok(())
    }
}
