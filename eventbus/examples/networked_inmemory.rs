use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eventbus::broker::InMemoryBroker;
use eventbus::{EventBus, NetworkedTransport, PublishContext, RetryPolicy, handler_fn};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn networked_bus(broker: &InMemoryBroker) -> EventBus {
    EventBus::builder()
        .transport(Arc::new(NetworkedTransport::new(
            Arc::new(broker.clone()),
            "demo:",
        )))
        .retry_policy(RetryPolicy::new(2, Duration::from_millis(20)))
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // 两个总线共享同一个代理，模拟两个进程
    let broker = InMemoryBroker::default();
    let publisher = networked_bus(&broker);
    let consumer = networked_bus(&broker);
    publisher.connect().await?;
    consumer.connect().await?;

    consumer
        .subscribe(
            "order.created",
            handler_fn("audit", |payload, metadata| async move {
                println!(
                    "audit: event_id={} trace_id={} payload={}",
                    metadata.event_id(),
                    metadata.trace_id(),
                    payload
                );
                Ok(())
            }),
        )
        .await?;

    // 第一次运行总是失败，重放后成功
    let healed = Arc::new(AtomicBool::new(false));
    let flag = healed.clone();
    consumer
        .subscribe(
            "order.created",
            handler_fn("billing", move |payload, _| {
                let flag = flag.clone();
                async move {
                    if !flag.load(Ordering::SeqCst) {
                        anyhow::bail!("billing backend offline");
                    }
                    println!("billing: charged {}", payload["amount"]);
                    Ok(())
                }
            }),
        )
        .await?;

    let receipt = publisher
        .publish(
            "order.created",
            json!({"orderId": "o-1", "amount": 42}),
            PublishContext::builder().source("checkout").build(),
        )
        .await?;
    println!("published: {receipt:?}");

    // 等待远端重试耗尽（20ms + 40ms）
    tokio::time::sleep(Duration::from_millis(300)).await;
    for entry in consumer.dead_letter_queue(10).await? {
        println!(
            "dead letter: handler={} error={} retry_count={}",
            entry.handler_name(),
            entry.error_message(),
            entry.metadata().retry_count()
        );
    }

    healed.store(true, Ordering::SeqCst);
    let replayed = consumer
        .replay_from_dead_letter_queue(&receipt.event_id)
        .await?;
    println!("replayed as {}", replayed.event_id);

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("dead letters left: {}", consumer.dead_letter_count().await?);

    publisher.close().await?;
    consumer.close().await?;
    Ok(())
}
