use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eventbus::{BusConfig, EventBus, EventHandler, Metadata, PublishContext, handler_fn};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountOpened {
    account_id: String,
    initial_balance: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deposited {
    account_id: String,
    amount: i64,
}

/// 余额投影：对象方法形式的处理器
#[derive(Default)]
struct BalanceProjection {
    balance: AtomicI64,
}

#[async_trait]
impl EventHandler for BalanceProjection {
    fn handler_name(&self) -> &str {
        "balance-projection"
    }

    async fn handle(&self, payload: &Value, metadata: &Metadata) -> anyhow::Result<()> {
        let delta = match metadata.event_name() {
            "account.opened" => payload["initialBalance"].as_i64(),
            "account.deposited" => payload["amount"].as_i64(),
            other => anyhow::bail!("unexpected event {other}"),
        };
        let Some(delta) = delta else {
            anyhow::bail!("payload without amount");
        };
        let balance = self.balance.fetch_add(delta, Ordering::SeqCst) + delta;
        info!(event_id = %metadata.event_id(), balance, "Balance updated");
        Ok(())
    }
}

async fn wait_for_dead_letter(bus: &EventBus, timeout: Duration) -> anyhow::Result<()> {
    tokio::time::timeout(timeout, async {
        while bus.dead_letter_count().await? == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok::<_, eventbus::BusError>(())
    })
    .await
    .map_err(|_| anyhow::anyhow!("no dead letter within {timeout:?}"))??;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // 读取 ./eventbus.yaml 与 EVENTBUS__* 环境变量；演示中缩短退避
    let mut config = BusConfig::load(None)?;
    config.base_delay_ms = config.base_delay_ms.min(50);
    let bus = EventBus::from_config(&config).await?;
    bus.connect().await?;

    let projection = Arc::new(BalanceProjection::default());
    let projection_handler: Arc<dyn EventHandler> = projection.clone();
    bus.subscribe("account.opened", projection_handler.clone()).await?;
    bus.subscribe("account.deposited", projection_handler).await?;

    // 邮件服务暂时不可用，存款通知会进入死信
    let mailer_up = Arc::new(AtomicBool::new(false));
    let up = mailer_up.clone();
    bus.subscribe(
        "account.deposited",
        handler_fn("mailer", move |payload, _| {
            let up = up.clone();
            async move {
                anyhow::ensure!(up.load(Ordering::SeqCst), "smtp connection refused");
                info!(account_id = %payload["accountId"], "Deposit receipt sent");
                Ok(())
            }
        }),
    )
    .await?;

    let ctx = PublishContext::builder().source("accounts").build();
    let opened = bus
        .publish_json(
            "account.opened",
            &AccountOpened {
                account_id: "acc-1".into(),
                initial_balance: 100,
            },
            ctx,
        )
        .await?;

    let deposit = bus
        .publish_json(
            "account.deposited",
            &Deposited {
                account_id: "acc-1".into(),
                amount: 25,
            },
            PublishContext::builder()
                .source("accounts")
                .trace_id(opened.trace_id.clone())
                .build(),
        )
        .await?;
    info!(summary = ?deposit.dispatch, "Deposit dispatched");

    // 网络传输下由监听任务异步调度，死信稍后才出现
    wait_for_dead_letter(&bus, Duration::from_secs(30)).await?;
    for entry in bus.dead_letter_queue(10).await? {
        info!(
            event_id = %entry.event_id(),
            handler = %entry.handler_name(),
            error = %entry.error_message(),
            "Dead letter"
        );
    }

    mailer_up.store(true, Ordering::SeqCst);
    let replayed = bus.replay_from_dead_letter_queue(&deposit.event_id).await?;
    let remaining = bus.dead_letter_count().await?;
    info!(
        event_id = %replayed.event_id,
        remaining,
        balance = projection.balance.load(Ordering::SeqCst),
        "Replay finished"
    );

    bus.close().await?;
    Ok(())
}
