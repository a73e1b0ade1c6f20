/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use topicbus::prelude::*;
use topicbus_test::prelude::*;

use crate::setup::*;

mod setup;

fn queue_of<M: BusMessage>() -> String {
    QueueOptions::default()
        .descriptor_for(&M::type_info())
        .name()
        .to_string()
}

#[bus_test]
async fn sent_messages_reach_the_queue_receiver() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = memory_bus(&broker)?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bus.receive(move |order: OrderPlaced| {
        let tx = tx.clone();
        async move {
            tx.send(order)?;
            anyhow::Ok(())
        }
    })
    .await?;

    let order = OrderPlaced {
        id: 7,
        lines: vec![
            OrderLine { sku: "A-1".into(), quantity: 1 },
            OrderLine { sku: "B-2".into(), quantity: 3 },
        ],
    };
    bus.send(&order).await?;

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await?;
    assert_eq!(received, Some(order));
    let queue = queue_of::<OrderPlaced>();
    assert_eq!(broker.queue_creations(&queue), 1);
    assert_eq!(broker.queue_stats(&queue).map(|s| s.delivered), Some(1));
    Ok(())
}

#[bus_test]
async fn queue_handler_errors_are_logged_not_retried() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = memory_bus(&broker)?;
    let attempts = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&attempts);
    bus.receive(move |_: SampleMessage| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("rejected")
        }
    })
    .await?;
    bus.send(&SampleMessage { value: "a".into() }).await?;
    bus.send(&SampleMessage { value: "b".into() }).await?;

    assert!(eventually(|| attempts.load(Ordering::SeqCst) == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = broker.queue_stats(&queue_of::<SampleMessage>()).unwrap_or_default();
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.abandoned + stats.dead_lettered, 0);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    Ok(())
}

#[bus_test]
async fn repeated_content_is_dropped_by_the_queue() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = TopicBus::builder(broker.clone())
        .with_publish_options(|o| o.with_message_id(MessageIdStrategy::ContentHash))
        .build()?;
    let attempts = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&attempts);
    bus.receive(move |_: SampleMessage| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .await?;
    let first = bus.send(&SampleMessage { value: "same".into() }).await?;
    let second = bus.send(&SampleMessage { value: "same".into() }).await?;

    assert_eq!(first, second);
    assert!(eventually(|| attempts.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[bus_test]
async fn messages_without_a_receiver_wait_in_the_queue() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = memory_bus(&broker)?;

    bus.send_with(&PaymentEvent::Authorized { amount: 100 }, QueueOptions::without_duplicate_detection)
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.receive(move |event: PaymentEvent| {
        let tx = tx.clone();
        async move {
            tx.send(event)?;
            anyhow::Ok(())
        }
    })
    .await?;

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await?;
    assert_eq!(received, Some(PaymentEvent::Authorized { amount: 100 }));
    Ok(())
}

#[bus_test]
async fn send_after_dispose_is_refused() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = memory_bus(&InMemoryBroker::new())?;
    bus.dispose().await;

    let result = bus.send(&SampleMessage { value: "late".into() }).await;
    assert!(matches!(result, Err(BusError::Closed)));
    Ok(())
}
