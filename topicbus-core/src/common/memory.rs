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

//! An in-process broker with topic fan-out, peek-lock settlement, duplicate
//! detection and dead-lettering.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use super::ConnectionInfo;
use crate::message::{
    DuplicateDetection, EntityPath, MessageEnvelope, QueueDescriptor, ReceiveMode,
    ReceiveOptions, ReceiveSource, SubscriptionDescriptor, SubscriptionFilter, SubscriptionKey,
    TopicDescriptor, TransportError,
};
use crate::traits::{
    Acknowledge, BrokerTransport, Connect, Delivery, DeliveryHandler, ReceiverLink, SenderLink,
};

/// Settlement counters of one subscription or queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityStats {
    /// Deliveries handed to a receiver, redeliveries included.
    pub delivered: usize,
    /// Deliveries completed.
    pub completed: usize,
    /// Deliveries abandoned.
    pub abandoned: usize,
    /// Deliveries dropped while still locked.
    pub expired: usize,
    /// Messages moved to the dead-letter list.
    pub dead_lettered: usize,
}

/// Send counters of one topic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TopicStats {
    /// Sends accepted and fanned out.
    pub accepted: usize,
    /// Sends dropped by duplicate detection.
    pub duplicates: usize,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicUsize,
    completed: AtomicUsize,
    abandoned: AtomicUsize,
    expired: AtomicUsize,
    dead_lettered: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> EntityStats {
        EntityStats {
            delivered: self.delivered.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            abandoned: self.abandoned.load(Ordering::SeqCst),
            expired: self.expired.load(Ordering::SeqCst),
            dead_lettered: self.dead_lettered.load(Ordering::SeqCst),
        }
    }
}

/// Remembers message ids for the detection window.
struct Dedup {
    detection: DuplicateDetection,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Dedup {
    fn new(detection: DuplicateDetection) -> Self {
        Self {
            detection,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `message_id` is new within the window. Records it if so.
    fn admit(&self, message_id: &str) -> bool {
        if !self.detection.enabled {
            return true;
        }
        let now = Instant::now();
        let window = self.detection.window;
        let mut seen = self.seen.lock();
        seen.retain(|_, at| now.duration_since(*at) < window);
        if seen.contains_key(message_id) {
            return false;
        }
        seen.insert(message_id.to_string(), now);
        true
    }
}

struct Stored {
    envelope: MessageEnvelope,
    delivery_count: u32,
}

/// Message storage of a subscription or queue.
struct Entity {
    filter: SubscriptionFilter,
    sender: mpsc::UnboundedSender<Stored>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Stored>>,
    counters: Counters,
    dead_letters: Mutex<Vec<MessageEnvelope>>,
}

impl Entity {
    fn new(filter: SubscriptionFilter) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            filter,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            counters: Counters::default(),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    fn enqueue(&self, stored: Stored) {
        // The entity owns both channel halves, so the send cannot fail.
        let _ = self.sender.send(stored);
    }

    /// Puts a released message back, or dead-letters it once it has been
    /// delivered `max_delivery_count` times.
    fn release(&self, stored: Stored, max_delivery_count: u32) {
        if stored.delivery_count >= max_delivery_count {
            warn!(
                message_id = stored.envelope.message_id(),
                delivery_count = stored.delivery_count,
                "moving message to dead letters"
            );
            self.counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
            self.dead_letters.lock().push(stored.envelope);
        } else {
            self.enqueue(stored);
        }
    }
}

struct Topic {
    dedup: Dedup,
    accepted: AtomicUsize,
    duplicates: AtomicUsize,
    subscriptions: DashMap<String, Arc<Entity>>,
}

struct Queue {
    dedup: Dedup,
    entity: Arc<Entity>,
}

struct BrokerState {
    creation_latency: Duration,
    max_delivery_count: u32,
    topics: DashMap<String, Arc<Topic>>,
    queues: DashMap<String, Arc<Queue>>,
    topic_creations: DashMap<String, usize>,
    subscription_creations: DashMap<SubscriptionKey, usize>,
    queue_creations: DashMap<String, usize>,
    opened_links: AtomicUsize,
    closed_links: AtomicUsize,
}

impl BrokerState {
    fn entity(&self, source: &ReceiveSource) -> Option<Arc<Entity>> {
        match source {
            ReceiveSource::Subscription(key) => self
                .topics
                .get(key.topic())
                .and_then(|topic| topic.subscriptions.get(key.subscription()).map(|s| Arc::clone(&s))),
            ReceiveSource::Queue(name) => self.queues.get(name).map(|q| Arc::clone(&q.entity)),
        }
    }

    fn accept(&self, destination: &EntityPath, envelope: MessageEnvelope) -> Result<(), TransportError> {
        match destination {
            EntityPath::Topic(name) => {
                let topic = self
                    .topics
                    .get(name)
                    .map(|t| Arc::clone(&t))
                    .ok_or_else(|| TransportError::new("send", destination.to_string(), "topic does not exist"))?;
                if !topic.dedup.admit(envelope.message_id()) {
                    topic.duplicates.fetch_add(1, Ordering::SeqCst);
                    debug!(message_id = envelope.message_id(), topic = %name, "duplicate dropped");
                    return Ok(());
                }
                topic.accepted.fetch_add(1, Ordering::SeqCst);
                for subscription in topic.subscriptions.iter() {
                    if subscription.filter.matches(&envelope) {
                        subscription.enqueue(Stored {
                            envelope: envelope.clone(),
                            delivery_count: 0,
                        });
                    }
                }
                Ok(())
            }
            EntityPath::Queue(name) => {
                let queue = self
                    .queues
                    .get(name)
                    .map(|q| Arc::clone(&q))
                    .ok_or_else(|| TransportError::new("send", destination.to_string(), "queue does not exist"))?;
                if queue.dedup.admit(envelope.message_id()) {
                    queue.entity.enqueue(Stored {
                        envelope,
                        delivery_count: 0,
                    });
                } else {
                    debug!(message_id = envelope.message_id(), queue = %name, "duplicate dropped");
                }
                Ok(())
            }
        }
    }
}

/// A broker that lives inside the process.
///
/// Topics fan out to every subscription whose filter matches. Peek-lock
/// deliveries that are abandoned, or dropped without settlement, go back to the
/// entity until they reach the maximum delivery count, then move to a
/// dead-letter list. Every creation call is counted so callers can check how
/// often an entity was requested.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("topics", &self.state.topics.len())
            .field("queues", &self.state.queues.len())
            .field("open_links", &self.open_links())
            .finish()
    }
}

impl InMemoryBroker {
    /// Maximum deliveries before a message is dead-lettered, unless configured.
    pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

    /// An empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Duration::ZERO, Self::DEFAULT_MAX_DELIVERY_COUNT)
    }

    fn with_settings(creation_latency: Duration, max_delivery_count: u32) -> Self {
        Self {
            state: Arc::new(BrokerState {
                creation_latency,
                max_delivery_count: max_delivery_count.max(1),
                topics: DashMap::new(),
                queues: DashMap::new(),
                topic_creations: DashMap::new(),
                subscription_creations: DashMap::new(),
                queue_creations: DashMap::new(),
                opened_links: AtomicUsize::new(0),
                closed_links: AtomicUsize::new(0),
            }),
        }
    }

    /// Delays every creation call, widening the window for concurrent callers.
    #[must_use]
    pub fn with_creation_latency(self, latency: Duration) -> Self {
        Self::with_settings(latency, self.state.max_delivery_count)
    }

    /// Sets how many deliveries a message gets before it is dead-lettered.
    #[must_use]
    pub fn with_max_delivery_count(self, count: u32) -> Self {
        Self::with_settings(self.state.creation_latency, count)
    }

    /// Creation calls received for `topic`.
    #[must_use]
    pub fn topic_creations(&self, topic: &str) -> usize {
        self.state.topic_creations.get(topic).map_or(0, |n| *n)
    }

    /// Creation calls received for the subscription.
    #[must_use]
    pub fn subscription_creations(&self, topic: &str, subscription: &str) -> usize {
        let key = SubscriptionKey::new(topic, subscription.to_lowercase());
        self.state.subscription_creations.get(&key).map_or(0, |n| *n)
    }

    /// Creation calls received for `queue`.
    #[must_use]
    pub fn queue_creations(&self, queue: &str) -> usize {
        self.state.queue_creations.get(queue).map_or(0, |n| *n)
    }

    /// Whether `topic` exists.
    #[must_use]
    pub fn topic_exists(&self, topic: &str) -> bool {
        self.state.topics.contains_key(topic)
    }

    /// Whether the subscription exists.
    #[must_use]
    pub fn subscription_exists(&self, topic: &str, subscription: &str) -> bool {
        self.subscription(topic, subscription).is_some()
    }

    /// Whether `queue` exists.
    #[must_use]
    pub fn queue_exists(&self, queue: &str) -> bool {
        self.state.queues.contains_key(queue)
    }

    /// The filter the subscription was created with.
    #[must_use]
    pub fn subscription_filter(&self, topic: &str, subscription: &str) -> Option<SubscriptionFilter> {
        self.subscription(topic, subscription).map(|s| s.filter.clone())
    }

    /// Settlement counters of the subscription.
    #[must_use]
    pub fn subscription_stats(&self, topic: &str, subscription: &str) -> Option<EntityStats> {
        self.subscription(topic, subscription)
            .map(|s| s.counters.snapshot())
    }

    /// Messages dead-lettered on the subscription.
    #[must_use]
    pub fn dead_letters(&self, topic: &str, subscription: &str) -> Vec<MessageEnvelope> {
        self.subscription(topic, subscription)
            .map(|s| s.dead_letters.lock().clone())
            .unwrap_or_default()
    }

    /// Send counters of the topic.
    #[must_use]
    pub fn topic_stats(&self, topic: &str) -> Option<TopicStats> {
        self.state.topics.get(topic).map(|t| TopicStats {
            accepted: t.accepted.load(Ordering::SeqCst),
            duplicates: t.duplicates.load(Ordering::SeqCst),
        })
    }

    /// Settlement counters of the queue.
    #[must_use]
    pub fn queue_stats(&self, queue: &str) -> Option<EntityStats> {
        self.state
            .queues
            .get(queue)
            .map(|q| q.entity.counters.snapshot())
    }

    /// Links opened and not yet closed.
    #[must_use]
    pub fn open_links(&self) -> usize {
        self.state
            .opened_links
            .load(Ordering::SeqCst)
            .saturating_sub(self.state.closed_links.load(Ordering::SeqCst))
    }

    fn subscription(&self, topic: &str, subscription: &str) -> Option<Arc<Entity>> {
        self.state.entity(&ReceiveSource::Subscription(SubscriptionKey::new(
            topic,
            subscription.to_lowercase(),
        )))
    }

    async fn simulate_latency(&self) {
        if !self.state.creation_latency.is_zero() {
            tokio::time::sleep(self.state.creation_latency).await;
        }
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn create_topic_if_absent(&self, topic: &TopicDescriptor) -> Result<(), TransportError> {
        self.simulate_latency().await;
        *self
            .state
            .topic_creations
            .entry(topic.name().to_string())
            .or_default() += 1;
        self.state
            .topics
            .entry(topic.name().to_string())
            .or_insert_with(|| {
                debug!(topic = topic.name(), "topic created");
                Arc::new(Topic {
                    dedup: Dedup::new(topic.duplicate_detection()),
                    accepted: AtomicUsize::new(0),
                    duplicates: AtomicUsize::new(0),
                    subscriptions: DashMap::new(),
                })
            });
        Ok(())
    }

    async fn create_subscription_if_absent(
        &self,
        subscription: &SubscriptionDescriptor,
    ) -> Result<(), TransportError> {
        self.simulate_latency().await;
        let topic = self
            .state
            .topics
            .get(subscription.topic())
            .map(|t| Arc::clone(&t))
            .ok_or_else(|| {
                TransportError::new("create", subscription.key().to_string(), "topic does not exist")
            })?;
        *self
            .state
            .subscription_creations
            .entry(subscription.key().clone())
            .or_default() += 1;
        topic
            .subscriptions
            .entry(subscription.name().to_string())
            .or_insert_with(|| {
                debug!(subscription = %subscription.key(), filter = ?subscription.filter(), "subscription created");
                Arc::new(Entity::new(subscription.filter().clone()))
            });
        Ok(())
    }

    async fn create_queue_if_absent(&self, queue: &QueueDescriptor) -> Result<(), TransportError> {
        self.simulate_latency().await;
        *self
            .state
            .queue_creations
            .entry(queue.name().to_string())
            .or_default() += 1;
        self.state
            .queues
            .entry(queue.name().to_string())
            .or_insert_with(|| {
                debug!(queue = queue.name(), "queue created");
                Arc::new(Queue {
                    dedup: Dedup::new(queue.duplicate_detection()),
                    entity: Arc::new(Entity::new(SubscriptionFilter::All)),
                })
            });
        Ok(())
    }

    async fn open_sender(
        &self,
        destination: &EntityPath,
    ) -> Result<Arc<dyn SenderLink>, TransportError> {
        self.state.opened_links.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySender {
            state: Arc::clone(&self.state),
            destination: destination.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_receiver(
        &self,
        source: &ReceiveSource,
        options: ReceiveOptions,
    ) -> Result<Arc<dyn ReceiverLink>, TransportError> {
        let entity = self
            .state
            .entity(source)
            .ok_or_else(|| TransportError::new("open", source.to_string(), "entity does not exist"))?;
        self.state.opened_links.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryReceiver {
            state: Arc::clone(&self.state),
            source: source.clone(),
            entity,
            options,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
        }))
    }
}

impl Connect for InMemoryBroker {
    fn connect(connection: &ConnectionInfo) -> Result<Self, TransportError> {
        if connection.scheme() != "memory" {
            return Err(TransportError::new(
                "connect",
                connection.endpoint(),
                "the in-memory broker only serves memory:// endpoints",
            ));
        }
        Ok(Self::new())
    }
}

struct MemorySender {
    state: Arc<BrokerState>,
    destination: EntityPath,
    closed: AtomicBool,
}

#[async_trait]
impl SenderLink for MemorySender {
    async fn send(&self, envelope: MessageEnvelope) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::new("send", self.destination.to_string(), "link is closed"));
        }
        trace!(destination = %self.destination, message_id = envelope.message_id(), "accepting send");
        self.state.accept(&self.destination, envelope)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.closed_links.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct MemoryReceiver {
    state: Arc<BrokerState>,
    source: ReceiveSource,
    entity: Arc<Entity>,
    options: ReceiveOptions,
    token: CancellationToken,
    tracker: TaskTracker,
    closed: AtomicBool,
}

#[async_trait]
impl ReceiverLink for MemoryReceiver {
    /// Each call starts another competing pump on the same entity.
    async fn start(&self, handler: DeliveryHandler) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::new("start", self.source.to_string(), "link is closed"));
        }
        let pump = Pump {
            entity: Arc::clone(&self.entity),
            mode: self.options.receive_mode,
            max_delivery_count: self.state.max_delivery_count,
            permits: Arc::new(Semaphore::new(self.options.max_concurrent_calls.max(1))),
            token: self.token.clone(),
            tracker: self.tracker.clone(),
        };
        trace!(source = %self.source, "starting receive pump");
        self.tracker.spawn(pump.run(handler));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.token.cancel();
            self.tracker.close();
            self.state.closed_links.fetch_add(1, Ordering::SeqCst);
            trace!(source = %self.source, "receiver closed");
        }
        Ok(())
    }
}

struct Pump {
    entity: Arc<Entity>,
    mode: ReceiveMode,
    max_delivery_count: u32,
    permits: Arc<Semaphore>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Pump {
    async fn run(self, handler: DeliveryHandler) {
        loop {
            let permit = tokio::select! {
                () = self.token.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let next = {
                let mut receiver = self.entity.receiver.lock().await;
                tokio::select! {
                    () = self.token.cancelled() => None,
                    next = receiver.recv() => next,
                }
            };
            let Some(stored) = next else { break };

            let delivery_count = stored.delivery_count + 1;
            self.entity.counters.delivered.fetch_add(1, Ordering::SeqCst);
            let lock: Box<dyn Acknowledge> = match self.mode {
                ReceiveMode::ReceiveAndDelete => Box::new(Deleted),
                ReceiveMode::PeekLock => Box::new(MessageLock {
                    pending: Mutex::new(Some(Stored {
                        envelope: stored.envelope.clone(),
                        delivery_count,
                    })),
                    entity: Arc::clone(&self.entity),
                    max_delivery_count: self.max_delivery_count,
                }),
            };
            let call = handler(Delivery::new(stored.envelope, delivery_count, lock));
            self.tracker.spawn(async move {
                call.await;
                drop(permit);
            });
        }
    }
}

/// Lock of a receive-and-delete delivery; there is nothing left to settle.
struct Deleted;

#[async_trait]
impl Acknowledge for Deleted {
    async fn complete(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn abandon(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Peek lock on one delivery. Dropping it unsettled counts as lock expiry.
struct MessageLock {
    pending: Mutex<Option<Stored>>,
    entity: Arc<Entity>,
    max_delivery_count: u32,
}

impl MessageLock {
    fn take(&self, operation: &'static str) -> Result<Stored, TransportError> {
        self.pending
            .lock()
            .take()
            .ok_or_else(|| TransportError::new(operation, "lock", "lock already released"))
    }
}

#[async_trait]
impl Acknowledge for MessageLock {
    async fn complete(&self) -> Result<(), TransportError> {
        let stored = self.take("complete")?;
        self.entity.counters.completed.fetch_add(1, Ordering::SeqCst);
        trace!(message_id = stored.envelope.message_id(), "completed");
        Ok(())
    }

    async fn abandon(&self) -> Result<(), TransportError> {
        let stored = self.take("abandon")?;
        self.entity.counters.abandoned.fetch_add(1, Ordering::SeqCst);
        trace!(message_id = stored.envelope.message_id(), "abandoned");
        self.entity.release(stored, self.max_delivery_count);
        Ok(())
    }
}

impl Drop for MessageLock {
    fn drop(&mut self) {
        if let Some(stored) = self.pending.get_mut().take() {
            self.entity.counters.expired.fetch_add(1, Ordering::SeqCst);
            trace!(message_id = stored.envelope.message_id(), "lock expired");
            self.entity.release(stored, self.max_delivery_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use topicbus_test::prelude::*;

    use super::*;
    use crate::message::MessageBody;

    fn envelope(id: &str, topic: &str) -> MessageEnvelope {
        MessageEnvelope::new(
            id.to_string(),
            MessageBody::Text("{}".to_string()),
            BTreeMap::new(),
            EntityPath::Topic(topic.to_string()),
        )
    }

    async fn broker_with_subscription(filter: SubscriptionFilter) -> anyhow::Result<InMemoryBroker> {
        let broker = InMemoryBroker::new();
        broker
            .create_topic_if_absent(&TopicDescriptor::new("orders", DuplicateDetection::default()))
            .await?;
        broker
            .create_subscription_if_absent(&SubscriptionDescriptor::new(
                "orders",
                "audit",
                filter,
                ReceiveOptions {
                    receive_mode: ReceiveMode::PeekLock,
                    max_concurrent_calls: 1,
                    lock_auto_renew_timeout: Duration::from_secs(1),
                },
            ))
            .await?;
        Ok(broker)
    }

    #[bus_test]
    async fn duplicate_ids_are_dropped_within_the_window() -> anyhow::Result<()> {
        let broker = broker_with_subscription(SubscriptionFilter::All).await?;
        let sender = broker.open_sender(&EntityPath::Topic("orders".into())).await?;

        sender.send(envelope("a", "orders")).await?;
        sender.send(envelope("a", "orders")).await?;
        sender.send(envelope("b", "orders")).await?;

        let stats = broker.topic_stats("orders").unwrap_or_default();
        assert_eq!(stats, TopicStats { accepted: 2, duplicates: 1 });
        Ok(())
    }

    #[bus_test]
    async fn sends_to_missing_entities_fail() -> anyhow::Result<()> {
        let broker = InMemoryBroker::new();
        let sender = broker.open_sender(&EntityPath::Queue("nowhere".into())).await?;
        let error = sender
            .send(envelope("a", "nowhere"))
            .await
            .err()
            .map(|e| e.operation());
        assert_eq!(error, Some("send"));
        Ok(())
    }

    #[bus_test]
    async fn subscriptions_need_their_topic() {
        let broker = InMemoryBroker::new();
        let result = broker
            .create_subscription_if_absent(&SubscriptionDescriptor::new(
                "missing",
                "audit",
                SubscriptionFilter::All,
                ReceiveOptions {
                    receive_mode: ReceiveMode::PeekLock,
                    max_concurrent_calls: 1,
                    lock_auto_renew_timeout: Duration::from_secs(1),
                },
            ))
            .await;
        assert!(result.is_err());
        assert_eq!(broker.subscription_creations("missing", "audit"), 0);
    }

    #[test]
    fn dropped_locks_expire_and_dead_letter_at_the_limit() {
        let entity = Arc::new(Entity::new(SubscriptionFilter::All));
        let lock = MessageLock {
            pending: Mutex::new(Some(Stored {
                envelope: envelope("a", "orders"),
                delivery_count: 2,
            })),
            entity: Arc::clone(&entity),
            max_delivery_count: 2,
        };
        drop(lock);

        let stats = entity.counters.snapshot();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(entity.dead_letters.lock().len(), 1);
    }

    #[test]
    fn connect_accepts_only_memory_endpoints() {
        let memory = ConnectionInfo::parse("Endpoint=memory://local").map_err(|e| e.to_string());
        assert!(memory.is_ok_and(|c| InMemoryBroker::connect(&c).is_ok()));

        let remote = ConnectionInfo::parse("Endpoint=sb://example.net/;SharedAccessKeyName=root;SharedAccessKey=abc")
            .map_err(|e| e.to_string());
        assert!(remote.is_ok_and(|c| InMemoryBroker::connect(&c).is_err()));
    }
}
