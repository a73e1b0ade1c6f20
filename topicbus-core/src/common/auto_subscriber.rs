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

//! Registration of statically declared consumers.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use super::{HandlerRegistration, TopicBus};
use crate::message::BusError;
use crate::traits::{BusMessage, Consume, TypeInfo};

type Binding =
    Box<dyn FnOnce(TopicBus, String) -> BoxFuture<'static, Result<HandlerRegistration, BusError>> + Send>;
type Factory = Box<dyn FnOnce() -> anyhow::Result<Binding> + Send>;

/// Builds a [`ConsumerSet`] from `Consumer => Message` pairs.
///
/// ```rust,ignore
/// let consumers = consumer_set![
///     AuditLog => OrderPlaced,
///     AuditLog => OrderCancelled,
///     Mailer => OrderPlaced,
/// ];
/// ```
#[macro_export]
macro_rules! consumer_set {
    ($($consumer:ty => $message:ty),* $(,)?) => {
        $crate::prelude::ConsumerSet::new()$(.consumer::<$consumer, $message>())*
    };
}

struct ConsumerEntry {
    consumer: TypeInfo,
    message: TypeInfo,
    factory: Factory,
}

/// An explicit list of (consumer, message type) pairs.
#[derive(Default)]
pub struct ConsumerSet {
    entries: Vec<ConsumerEntry>,
}

impl ConsumerSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `C` as a consumer of `M`, constructed with [`Default`].
    #[must_use]
    pub fn consumer<C, M>(self) -> Self
    where
        C: Consume<M> + Default,
        M: BusMessage,
    {
        self.consumer_with::<C, M, _>(|| Ok(C::default()))
    }

    /// Adds `C` as a consumer of `M`, constructed by `factory`.
    ///
    /// The factory runs during [`AutoSubscriber::subscribe`]; an error there
    /// aborts registration before anything is subscribed.
    #[must_use]
    pub fn consumer_with<C, M, F>(mut self, factory: F) -> Self
    where
        C: Consume<M>,
        M: BusMessage,
        F: FnOnce() -> anyhow::Result<C> + Send + 'static,
    {
        let factory: Factory = Box::new(move || {
            let consumer = Arc::new(factory()?);
            let binding: Binding = Box::new(
                move |bus: TopicBus, subscription_id: String| -> BoxFuture<'static, Result<HandlerRegistration, BusError>> {
                    Box::pin(async move {
                        bus.subscribe::<M, _, _>(subscription_id, move |message: M| {
                            let consumer = Arc::clone(&consumer);
                            async move { <C as Consume<M>>::consume(&consumer, message).await }
                        })
                        .await
                    })
                },
            );
            Ok(binding)
        });
        self.entries.push(ConsumerEntry {
            consumer: TypeInfo::of::<C>(),
            message: TypeInfo::of::<M>(),
            factory,
        });
        self
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The (consumer, message) pairs in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&TypeInfo, &TypeInfo)> {
        self.entries.iter().map(|entry| (&entry.consumer, &entry.message))
    }
}

impl fmt::Debug for ConsumerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.pairs()
                    .map(|(consumer, message)| format!("{} => {}", consumer.full_name(), message.full_name())),
            )
            .finish()
    }
}

/// How subscription ids are derived for consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubscriptionIdStrategy {
    /// `{root}.{ConsumerName}`. Readable; consumers with the same short name
    /// in different modules collide.
    #[default]
    ConsumerName,
    /// `{root}_` plus a 32-character hex digest of root, consumer and message
    /// full names. Stable across runs and collision resistant.
    Hashed,
}

/// One consumer pair bound by an [`AutoSubscriber`].
#[derive(Clone, Debug)]
pub struct AutoRegistration {
    consumer: TypeInfo,
    subscription_id: String,
    handler: HandlerRegistration,
}

impl AutoRegistration {
    /// The consumer type.
    #[must_use]
    pub const fn consumer(&self) -> &TypeInfo {
        &self.consumer
    }

    /// The message type.
    #[must_use]
    pub const fn message(&self) -> &TypeInfo {
        self.handler.message_type()
    }

    /// The subscription id passed to [`TopicBus::subscribe`].
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// The handler registration on the bus.
    #[must_use]
    pub const fn handler(&self) -> &HandlerRegistration {
        &self.handler
    }
}

/// Subscribes a [`ConsumerSet`] under a common root id.
#[derive(Clone, Debug)]
pub struct AutoSubscriber {
    bus: TopicBus,
    root: String,
    strategy: SubscriptionIdStrategy,
}

impl AutoSubscriber {
    /// An auto-subscriber for `bus` with subscription ids under `root`.
    pub fn new(bus: &TopicBus, root: impl Into<String>) -> Self {
        Self {
            bus: bus.clone(),
            root: root.into(),
            strategy: SubscriptionIdStrategy::ConsumerName,
        }
    }

    /// Replaces the id strategy.
    #[must_use]
    pub fn with_strategy(self, strategy: SubscriptionIdStrategy) -> Self {
        Self { strategy, ..self }
    }

    /// Uses [`SubscriptionIdStrategy::Hashed`].
    #[must_use]
    pub fn with_hashed_ids(self) -> Self {
        self.with_strategy(SubscriptionIdStrategy::Hashed)
    }

    /// Subscription id for the pair.
    #[must_use]
    pub fn subscription_id(&self, consumer: &TypeInfo, message: &TypeInfo) -> String {
        match self.strategy {
            SubscriptionIdStrategy::ConsumerName => format!("{}.{}", self.root, consumer.name()),
            SubscriptionIdStrategy::Hashed => {
                let digest = Sha256::digest(
                    format!("{}:{}:{}", self.root, consumer.full_name(), message.full_name())
                        .as_bytes(),
                );
                format!("{}_{}", self.root, hex::encode(&digest[..16]))
            }
        }
    }

    /// Validates and constructs every consumer, then subscribes each pair.
    ///
    /// Nothing is subscribed unless the whole set validates.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] for an empty root, [`BusError::Resolution`]
    /// for a repeated pair or a failing factory, and any error from
    /// [`TopicBus::subscribe`].
    #[instrument(skip(self, consumers), fields(root = %self.root, consumers = consumers.len()))]
    pub async fn subscribe(&self, consumers: ConsumerSet) -> Result<Vec<AutoRegistration>, BusError> {
        if self.root.trim().is_empty() {
            return Err(BusError::Configuration(
                "auto-subscriber root id must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (consumer, message) in consumers.pairs() {
            if !seen.insert((consumer.type_id(), message.type_id())) {
                return Err(BusError::Resolution {
                    consumer: consumer.full_name().to_string(),
                    message: message.full_name().to_string(),
                    reason: "pair is declared more than once".to_string(),
                });
            }
        }

        let mut bound = Vec::with_capacity(consumers.len());
        for entry in consumers.entries {
            let binding = (entry.factory)().map_err(|e| BusError::Resolution {
                consumer: entry.consumer.full_name().to_string(),
                message: entry.message.full_name().to_string(),
                reason: format!("consumer could not be constructed: {e}"),
            })?;
            bound.push((entry.consumer, entry.message, binding));
        }

        let mut registrations = Vec::with_capacity(bound.len());
        for (consumer, message, binding) in bound {
            let subscription_id = self.subscription_id(&consumer, &message);
            let handler = binding(self.bus.clone(), subscription_id.clone()).await?;
            info!(
                consumer = consumer.full_name(),
                message = message.full_name(),
                %subscription_id,
                "consumer subscribed"
            );
            registrations.push(AutoRegistration {
                consumer,
                subscription_id,
                handler,
            });
        }
        Ok(registrations)
    }
}
