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

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info, instrument, trace, warn};

use super::registry::ResourceRegistry;
use super::router::{DispatchRouter, Disposition, HandlerRegistration, Route};
use super::BusConfig;
use crate::message::{BusError, EntityPath, MessageCodec, ReceiveMode, ReceiveSource};
use crate::options::{PublishOptions, QueueOptions, Resolver, SubscribeOptions, TopicOptions};
use crate::traits::{BrokerTransport, BusMessage, Connect, Delivery, DeliveryHandler};

/// A typed publish/subscribe bus over a broker transport.
///
/// `TopicBus` is cheap to clone; clones share the same caches, routes and
/// links. Topics and subscriptions are created on first use.
///
/// ```rust,ignore
/// let bus = TopicBus::connect::<InMemoryBroker>(BusConfig::load()?)?;
///
/// bus.subscribe("billing", |order: OrderPlaced| async move {
///     tracing::info!(id = order.id, "billing order");
///     Ok(())
/// })
/// .await?;
///
/// bus.publish(&OrderPlaced { id: 7 }).await?;
/// bus.dispose().await;
/// ```
#[derive(Clone)]
pub struct TopicBus {
    pub(crate) inner: Arc<BusInner>,
}

pub(crate) struct BusInner {
    pub(crate) registry: ResourceRegistry,
    pub(crate) router: DispatchRouter,
    pub(crate) codec: MessageCodec,
    pub(crate) publish: Resolver<PublishOptions>,
    pub(crate) subscribe: Resolver<SubscribeOptions>,
    pub(crate) queue: Resolver<QueueOptions>,
    pub(crate) closed: AtomicBool,
}

impl fmt::Debug for TopicBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicBus")
            .field("registry", &self.inner.registry)
            .field("router", &self.inner.router)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Builds a [`TopicBus`].
///
/// Defaults come from the [`BusConfig`]; every `with_*` override is applied on
/// top of them, in the order given, before the per-call configuration.
pub struct BusBuilder {
    transport: Arc<dyn BrokerTransport>,
    config: BusConfig,
    topic: Vec<Arc<dyn Fn(TopicOptions) -> TopicOptions + Send + Sync>>,
    publish: Vec<Arc<dyn Fn(PublishOptions) -> PublishOptions + Send + Sync>>,
    subscribe: Vec<Arc<dyn Fn(SubscribeOptions) -> SubscribeOptions + Send + Sync>>,
    queue: Vec<Arc<dyn Fn(QueueOptions) -> QueueOptions + Send + Sync>>,
}

impl fmt::Debug for BusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BusBuilder {
    /// Starts a builder over `transport` with default configuration.
    pub fn new(transport: impl BrokerTransport) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    /// Starts a builder over an already shared transport.
    #[must_use]
    pub fn from_shared(transport: Arc<dyn BrokerTransport>) -> Self {
        Self {
            transport,
            config: BusConfig::default(),
            topic: Vec::new(),
            publish: Vec::new(),
            subscribe: Vec::new(),
            queue: Vec::new(),
        }
    }

    /// Replaces the configuration the defaults are taken from.
    #[must_use]
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides topic options for both publishing and subscribing.
    #[must_use]
    pub fn with_topic_options(
        mut self,
        apply: impl Fn(TopicOptions) -> TopicOptions + Send + Sync + 'static,
    ) -> Self {
        self.topic.push(Arc::new(apply));
        self
    }

    /// Overrides publish options for every publish.
    #[must_use]
    pub fn with_publish_options(
        mut self,
        apply: impl Fn(PublishOptions) -> PublishOptions + Send + Sync + 'static,
    ) -> Self {
        self.publish.push(Arc::new(apply));
        self
    }

    /// Overrides subscribe options for every subscribe.
    #[must_use]
    pub fn with_subscribe_options(
        mut self,
        apply: impl Fn(SubscribeOptions) -> SubscribeOptions + Send + Sync + 'static,
    ) -> Self {
        self.subscribe.push(Arc::new(apply));
        self
    }

    /// Overrides queue options for every send and receive.
    #[must_use]
    pub fn with_queue_options(
        mut self,
        apply: impl Fn(QueueOptions) -> QueueOptions + Send + Sync + 'static,
    ) -> Self {
        self.queue.push(Arc::new(apply));
        self
    }

    /// Validates the configuration and builds the bus.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the configuration is invalid.
    pub fn build(self) -> Result<TopicBus, BusError> {
        self.config.validate()?;

        let mut publish = Resolver::new(self.config.publish_options());
        let mut subscribe = Resolver::new(self.config.subscribe_options());
        let mut queue = Resolver::new(self.config.queue_options());

        for apply in self.topic {
            let for_subscribe = Arc::clone(&apply);
            publish = publish.with_override(move |o: PublishOptions| o.with_topic(|t| apply(t)));
            subscribe =
                subscribe.with_override(move |o: SubscribeOptions| o.with_topic(|t| for_subscribe(t)));
        }
        for apply in self.publish {
            publish = publish.with_override(move |o| apply(o));
        }
        for apply in self.subscribe {
            subscribe = subscribe.with_override(move |o| apply(o));
        }
        for apply in self.queue {
            queue = queue.with_override(move |o| apply(o));
        }

        debug!("topic bus built");
        Ok(TopicBus {
            inner: Arc::new(BusInner {
                registry: ResourceRegistry::new(self.transport),
                router: DispatchRouter::default(),
                codec: MessageCodec,
                publish,
                subscribe,
                queue,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl TopicBus {
    /// Starts a builder over `transport`.
    pub fn builder(transport: impl BrokerTransport) -> BusBuilder {
        BusBuilder::new(transport)
    }

    /// Connects a transport of type `T` using the connection string in `config`.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the connection string is missing or
    /// invalid, [`BusError::Transport`] when the transport refuses it.
    pub fn connect<T: Connect>(config: BusConfig) -> Result<Self, BusError> {
        let connection = config.connection()?.ok_or_else(|| {
            BusError::Configuration("no connection string configured".to_string())
        })?;
        info!(endpoint = connection.endpoint(), "connecting topic bus");
        let transport = T::connect(&connection)?;
        BusBuilder::new(transport).with_config(config).build()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), BusError> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Publishes `message` with the bus defaults. Returns the message id.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the topic, encoding or sending.
    pub async fn publish<M: BusMessage>(&self, message: &M) -> Result<String, BusError> {
        self.publish_with(message, |options| options).await
    }

    /// Publishes `message`, applying `configure` to this call's options.
    ///
    /// Returns once the transport has accepted the send.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the topic, encoding or sending.
    #[instrument(skip(self, message, configure), fields(message_type = std::any::type_name::<M>()))]
    pub async fn publish_with<M: BusMessage>(
        &self,
        message: &M,
        configure: impl FnOnce(PublishOptions) -> PublishOptions,
    ) -> Result<String, BusError> {
        self.ensure_open()?;
        let options = self.inner.publish.resolve_with(configure);
        let type_info = M::type_info();

        let topic = self
            .inner
            .registry
            .ensure_topic(options.topic().descriptor_for(&type_info))
            .await?;
        let destination = EntityPath::Topic(topic.name().to_string());
        let sender = self.inner.registry.sender(&destination).await?;
        let envelope = self.inner.codec.encode(message, destination, &options)?;
        let message_id = envelope.message_id().to_string();

        sender.send(envelope).await?;
        info!(
            "Message of type {} was sent to topic {} with message id {}",
            type_info.full_name(),
            topic.name(),
            message_id
        );
        Ok(message_id)
    }

    /// Subscribes `handler` to `M` on the named subscription.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the topic and subscription or
    /// starting the receive loop.
    pub async fn subscribe<M, F, Fut>(
        &self,
        subscription: impl Into<String>,
        handler: F,
    ) -> Result<HandlerRegistration, BusError>
    where
        M: BusMessage,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let subscription = subscription.into();
        self.subscribe_with(move |options| options.with_subscription(subscription), handler)
            .await
    }

    /// Subscribes `handler` to `M`, applying `configure` to this call's options.
    ///
    /// Several handlers, for one or several message types, may share a
    /// subscription. The receive loop starts with the first registration.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the topic and subscription or
    /// starting the receive loop.
    #[instrument(skip(self, configure, handler), fields(message_type = std::any::type_name::<M>()))]
    pub async fn subscribe_with<M, F, Fut>(
        &self,
        configure: impl FnOnce(SubscribeOptions) -> SubscribeOptions,
        handler: F,
    ) -> Result<HandlerRegistration, BusError>
    where
        M: BusMessage,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.ensure_open()?;
        let options = self.inner.subscribe.resolve_with(configure);
        let type_info = M::type_info();

        let topic = self
            .inner
            .registry
            .ensure_topic(options.topic().descriptor_for(&type_info))
            .await?;
        let descriptor = self
            .inner
            .registry
            .ensure_subscription(options.descriptor(topic.name(), &type_info))
            .await?;

        let route = self.inner.router.route(&descriptor);
        route.mark_created();
        let registration = route.register::<M, F, Fut>(handler)?;

        if let Err(e) = self.ensure_receiving(&route).await {
            route.unregister(&registration);
            return Err(e);
        }
        Ok(registration)
    }

    /// Starts the receive loop of `route` unless it is already running.
    ///
    /// Concurrent callers queue behind the first; if its start fails, the next
    /// one in line tries again.
    async fn ensure_receiving(&self, route: &Arc<Route>) -> Result<(), BusError> {
        let _guard = route.start_guard().await;
        if !route.try_activate() {
            return Ok(());
        }
        if let Err(e) = self.start_receiving(route).await {
            route.deactivate();
            return Err(e);
        }
        info!(subscription = %route.descriptor().key(), "subscription is listening");
        Ok(())
    }

    async fn start_receiving(&self, route: &Arc<Route>) -> Result<(), BusError> {
        let descriptor = route.descriptor();
        let source = ReceiveSource::Subscription(descriptor.key().clone());
        let receive_options = descriptor.receive_options();
        let receiver = self.inner.registry.receiver(&source, receive_options).await?;

        let route = Arc::clone(route);
        let codec = self.inner.codec;
        let mode = receive_options.receive_mode;
        let handler: DeliveryHandler = Arc::new(move |delivery: Delivery| -> BoxFuture<'static, ()> {
            let route = Arc::clone(&route);
            Box::pin(async move {
                let disposition = route.dispatch(&codec, delivery.envelope()).await;
                settle(delivery, disposition, mode).await;
            })
        });
        receiver.start(handler).await?;
        Ok(())
    }

    /// Closes every subscription and link.
    ///
    /// Handlers already running are not awaited; their settlement may fail
    /// silently. Every later operation returns [`BusError::Closed`].
    #[instrument(skip(self))]
    pub async fn dispose(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            trace!("bus already disposed");
            return;
        }
        self.inner.router.close_all();
        let failures = self.inner.registry.close_all().await;
        if failures > 0 {
            warn!(failures, "some links failed to close");
        }
        info!("topic bus disposed");
    }

    /// Whether [`TopicBus::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

async fn settle(delivery: Delivery, disposition: Disposition, mode: ReceiveMode) {
    if mode == ReceiveMode::ReceiveAndDelete {
        return;
    }
    let message_id = delivery.envelope().message_id().to_string();
    let result = match disposition {
        Disposition::Complete => delivery.complete().await,
        Disposition::Abandon => delivery.abandon().await,
        // The lock expires on the broker.
        Disposition::Unhandled => return,
    };
    if let Err(e) = result {
        error!(%message_id, ?disposition, error = %e, "failed to settle delivery");
    }
}
