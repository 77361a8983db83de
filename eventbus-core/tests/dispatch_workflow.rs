use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use eventbus_core::dead_letter::{DeadLetterStore, InMemoryDeadLetterStore};
use eventbus_core::envelope::{EventEnvelope, PublishContext};
use eventbus_core::eventing::{Dispatcher, EventHandler, HandlerRegistry, RetryPolicy, handler_fn};
use serde_json::json;

fn dispatcher(registry: Arc<HandlerRegistry>, store: Arc<InMemoryDeadLetterStore>) -> Dispatcher {
    Dispatcher::builder()
        .registry(registry)
        .dead_letters(store)
        .retry_policy(RetryPolicy::new(1, Duration::from_millis(5)))
        .build()
}

fn failing(name: String) -> Arc<dyn EventHandler> {
    handler_fn(name, |_, _| async { Err(anyhow::anyhow!("down")) })
}

#[tokio::test(start_paused = true)]
async fn simultaneous_failures_are_all_dead_lettered() {
    let registry = Arc::new(HandlerRegistry::new());
    let store = Arc::new(InMemoryDeadLetterStore::new());
    for i in 0..16 {
        registry.add("x", failing(format!("h{i}"))).unwrap();
    }
    let dispatcher = dispatcher(registry, store.clone());

    let envelope = EventEnvelope::new("x", json!({"seq": 1}), &PublishContext::default());
    let summary = dispatcher.dispatch(&envelope).await;

    assert_eq!(summary.handlers, 16);
    assert_eq!(summary.dead_lettered, 16);
    assert_eq!(store.len().await.unwrap(), 16);

    let mut names: Vec<String> = store
        .list(usize::MAX)
        .await
        .unwrap()
        .iter()
        .map(|e| e.handler_name().to_string())
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 16);
}

#[tokio::test]
async fn envelope_survives_the_wire_before_dispatch() {
    let registry = Arc::new(HandlerRegistry::new());
    let store = Arc::new(InMemoryDeadLetterStore::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    registry
        .add(
            "order.created",
            handler_fn("count", move |payload, metadata| {
                let counter = counter.clone();
                async move {
                    anyhow::ensure!(payload["id"] == 1, "payload mangled");
                    anyhow::ensure!(metadata.source() == "orders", "source lost");
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();
    let dispatcher = dispatcher(registry, store.clone());

    let ctx = PublishContext::builder().source("orders").build();
    let sent = EventEnvelope::new("order.created", json!({"id": 1}), &ctx);
    let received = EventEnvelope::from_bytes(&sent.to_bytes().unwrap()).unwrap();
    assert_eq!(received.metadata().event_id(), sent.metadata().event_id());

    let summary = dispatcher.dispatch(&received).await;
    assert_eq!(summary.delivered, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registry_mutation_during_dispatch_is_safe() {
    let registry = Arc::new(HandlerRegistry::new());
    let store = Arc::new(InMemoryDeadLetterStore::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let stable = handler_fn("stable", move |_, _| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(())
        }
    });
    registry.add("x", stable).unwrap();
    let dispatcher = Arc::new(dispatcher(registry.clone(), store.clone()));

    let churn = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let h = handler_fn(format!("churn{i}"), |_, _| async { Ok(()) });
                registry.add("x", h.clone()).unwrap();
                tokio::task::yield_now().await;
                registry.remove("x", &h);
            }
        })
    };

    let mut publishes = Vec::new();
    for seq in 0..50 {
        let dispatcher = dispatcher.clone();
        publishes.push(tokio::spawn(async move {
            let envelope = EventEnvelope::new("x", json!({"seq": seq}), &PublishContext::default());
            dispatcher.dispatch(&envelope).await
        }));
    }
    for p in publishes {
        let summary = p.await.unwrap();
        assert_eq!(summary.dead_lettered, 0);
    }
    churn.await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 50);
    assert_eq!(registry.handler_count("x"), 1);
}
