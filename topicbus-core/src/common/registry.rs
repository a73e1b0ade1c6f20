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

//! Process-lifetime cache of broker entities and client links.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, error, instrument, trace};

use crate::message::{
    EntityPath, QueueDescriptor, ReceiveOptions, ReceiveSource, SubscriptionDescriptor,
    SubscriptionKey, TopicDescriptor, TransportError,
};
use crate::traits::{BrokerTransport, ReceiverLink, SenderLink};

/// A cache slot shared by every caller asking for the same key.
type Slot<T> = Arc<OnceCell<T>>;

fn slot<K, V>(map: &DashMap<K, Slot<V>>, key: K) -> Slot<V>
where
    K: Eq + Hash,
{
    // The shard guard is released before the caller awaits the cell.
    map.entry(key).or_default().clone()
}

/// Ensures broker entities exist and owns every open link.
///
/// Each entity is created at most once: concurrent first callers share one
/// [`OnceCell`], the first to arrive issues the remote call and the others wait
/// for its result. A failed creation leaves the slot empty so the next caller
/// tries again. Once a slot is filled the registry never checks the broker again.
pub(crate) struct ResourceRegistry {
    transport: Arc<dyn BrokerTransport>,
    topics: DashMap<String, Slot<TopicDescriptor>>,
    queues: DashMap<String, Slot<QueueDescriptor>>,
    subscriptions: DashMap<SubscriptionKey, Slot<SubscriptionDescriptor>>,
    senders: DashMap<EntityPath, Slot<Arc<dyn SenderLink>>>,
    receivers: DashMap<ReceiveSource, Slot<Arc<dyn ReceiverLink>>>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("topics", &self.topics.len())
            .field("queues", &self.queues.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("senders", &self.senders.len())
            .field("receivers", &self.receivers.len())
            .finish()
    }
}

impl ResourceRegistry {
    pub(crate) fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self {
            transport,
            topics: DashMap::new(),
            queues: DashMap::new(),
            subscriptions: DashMap::new(),
            senders: DashMap::new(),
            receivers: DashMap::new(),
        }
    }

    /// Returns the cached topic, creating it on first use.
    #[instrument(skip(self, descriptor), fields(topic = descriptor.name()))]
    pub(crate) async fn ensure_topic(
        &self,
        descriptor: TopicDescriptor,
    ) -> Result<TopicDescriptor, TransportError> {
        let cell = slot(&self.topics, descriptor.name().to_string());
        let topic = cell
            .get_or_try_init(|| async {
                debug!("creating topic if absent");
                self.transport.create_topic_if_absent(&descriptor).await?;
                Ok::<_, TransportError>(descriptor.clone())
            })
            .await?;
        Ok(topic.clone())
    }

    /// Returns the cached subscription, creating it on first use.
    ///
    /// The filter of the first successful creation sticks.
    #[instrument(skip(self, descriptor), fields(subscription = %descriptor.key()))]
    pub(crate) async fn ensure_subscription(
        &self,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionDescriptor, TransportError> {
        let cell = slot(&self.subscriptions, descriptor.key().clone());
        let subscription = cell
            .get_or_try_init(|| async {
                debug!(filter = ?descriptor.filter(), "creating subscription if absent");
                self.transport
                    .create_subscription_if_absent(&descriptor)
                    .await?;
                Ok::<_, TransportError>(descriptor.clone())
            })
            .await?;
        Ok(subscription.clone())
    }

    /// Returns the cached queue, creating it on first use.
    #[instrument(skip(self, descriptor), fields(queue = descriptor.name()))]
    pub(crate) async fn ensure_queue(
        &self,
        descriptor: QueueDescriptor,
    ) -> Result<QueueDescriptor, TransportError> {
        let cell = slot(&self.queues, descriptor.name().to_string());
        let queue = cell
            .get_or_try_init(|| async {
                debug!("creating queue if absent");
                self.transport.create_queue_if_absent(&descriptor).await?;
                Ok::<_, TransportError>(descriptor.clone())
            })
            .await?;
        Ok(queue.clone())
    }

    /// The single sending link for `destination`.
    pub(crate) async fn sender(
        &self,
        destination: &EntityPath,
    ) -> Result<Arc<dyn SenderLink>, TransportError> {
        let cell = slot(&self.senders, destination.clone());
        let link = cell
            .get_or_try_init(|| async {
                trace!(%destination, "opening sender");
                self.transport.open_sender(destination).await
            })
            .await?;
        Ok(Arc::clone(link))
    }

    /// The single receiving link for `source`.
    pub(crate) async fn receiver(
        &self,
        source: &ReceiveSource,
        options: ReceiveOptions,
    ) -> Result<Arc<dyn ReceiverLink>, TransportError> {
        let cell = slot(&self.receivers, source.clone());
        let link = cell
            .get_or_try_init(|| async {
                trace!(%source, "opening receiver");
                self.transport.open_receiver(source, options).await
            })
            .await?;
        Ok(Arc::clone(link))
    }

    /// Closes every open link, receivers first. Returns how many closes failed.
    #[instrument(skip(self))]
    pub(crate) async fn close_all(&self) -> usize {
        let receivers: Vec<(ReceiveSource, Arc<dyn ReceiverLink>)> = self
            .receivers
            .iter()
            .filter_map(|entry| entry.value().get().map(|link| (entry.key().clone(), Arc::clone(link))))
            .collect();
        let senders: Vec<(EntityPath, Arc<dyn SenderLink>)> = self
            .senders
            .iter()
            .filter_map(|entry| entry.value().get().map(|link| (entry.key().clone(), Arc::clone(link))))
            .collect();
        self.receivers.clear();
        self.senders.clear();

        let mut failures = 0;
        for (source, link) in receivers {
            if let Err(e) = link.close().await {
                failures += 1;
                error!(%source, error = %e, "failed to close receiver");
            }
        }
        for (destination, link) in senders {
            if let Err(e) = link.close().await {
                failures += 1;
                error!(%destination, error = %e, "failed to close sender");
            }
        }
        debug!(failures, "closed client links");
        failures
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future::join_all;

    use super::*;
    use crate::message::DuplicateDetection;

    /// Counts creation calls and fails the first `failures` of them.
    #[derive(Default)]
    struct CountingTransport {
        topic_calls: AtomicUsize,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl BrokerTransport for CountingTransport {
        async fn create_topic_if_absent(&self, topic: &TopicDescriptor) -> Result<(), TransportError> {
            self.topic_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::new("create", topic.name(), "throttled"));
            }
            Ok(())
        }

        async fn create_subscription_if_absent(
            &self,
            _subscription: &SubscriptionDescriptor,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn create_queue_if_absent(&self, _queue: &QueueDescriptor) -> Result<(), TransportError> {
            Ok(())
        }

        async fn open_sender(
            &self,
            destination: &EntityPath,
        ) -> Result<Arc<dyn SenderLink>, TransportError> {
            Err(TransportError::new("open", destination.to_string(), "unsupported"))
        }

        async fn open_receiver(
            &self,
            source: &ReceiveSource,
            _options: ReceiveOptions,
        ) -> Result<Arc<dyn ReceiverLink>, TransportError> {
            Err(TransportError::new("open", source.to_string(), "unsupported"))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_creates_once() {
        let transport = Arc::new(CountingTransport::default());
        let registry = Arc::new(ResourceRegistry::new(transport.clone()));

        let calls = (0..16).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .ensure_topic(TopicDescriptor::new("orders", DuplicateDetection::default()))
                    .await
            })
        });
        for result in join_all(calls).await {
            let topic = result.expect("task").expect("topic");
            assert_eq!(topic.name(), "orders");
        }
        assert_eq!(transport.topic_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_creation_is_retried_by_the_next_caller() {
        let transport = Arc::new(CountingTransport::default());
        transport.failures.store(1, Ordering::SeqCst);
        let registry = ResourceRegistry::new(transport.clone());
        let descriptor = TopicDescriptor::new("orders", DuplicateDetection::default());

        assert!(registry.ensure_topic(descriptor.clone()).await.is_err());
        assert!(registry.ensure_topic(descriptor.clone()).await.is_ok());
        assert!(registry.ensure_topic(descriptor).await.is_ok());
        assert_eq!(transport.topic_calls.load(Ordering::SeqCst), 2);
    }
}
