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

//! The seam between the bus and a concrete broker.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::common::ConnectionInfo;
use crate::message::{
    EntityPath, MessageEnvelope, QueueDescriptor, ReceiveOptions, ReceiveSource,
    SubscriptionDescriptor, TopicDescriptor, TransportError,
};

/// Callback a receiver link invokes once per delivery.
pub type DeliveryHandler = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Management and link operations of a topic broker.
///
/// Creation calls must be idempotent on the broker side ("create if absent"). The
/// bus guarantees it issues at most one successful creation call per entity.
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Creates the topic unless it already exists.
    async fn create_topic_if_absent(&self, topic: &TopicDescriptor) -> Result<(), TransportError>;

    /// Creates the subscription, with its filter, unless it already exists.
    async fn create_subscription_if_absent(
        &self,
        subscription: &SubscriptionDescriptor,
    ) -> Result<(), TransportError>;

    /// Creates the queue unless it already exists.
    async fn create_queue_if_absent(&self, queue: &QueueDescriptor) -> Result<(), TransportError>;

    /// Opens a sending link to a topic or queue.
    async fn open_sender(
        &self,
        destination: &EntityPath,
    ) -> Result<Arc<dyn SenderLink>, TransportError>;

    /// Opens a receiving link to a subscription or queue.
    async fn open_receiver(
        &self,
        source: &ReceiveSource,
        options: ReceiveOptions,
    ) -> Result<Arc<dyn ReceiverLink>, TransportError>;
}

/// An open sending link.
#[async_trait]
pub trait SenderLink: Send + Sync {
    /// Sends one envelope and returns once the broker has accepted it.
    async fn send(&self, envelope: MessageEnvelope) -> Result<(), TransportError>;

    /// Closes the link.
    async fn close(&self) -> Result<(), TransportError>;
}

/// An open receiving link.
#[async_trait]
pub trait ReceiverLink: Send + Sync {
    /// Starts pumping deliveries into `handler`, at most
    /// [`ReceiveOptions::max_concurrent_calls`] at a time. Returns once the
    /// pump is running.
    async fn start(&self, handler: DeliveryHandler) -> Result<(), TransportError>;

    /// Stops the pump. In-flight handler calls are not awaited.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Settlement primitives of a locked delivery.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Removes the message from the entity.
    async fn complete(&self) -> Result<(), TransportError>;

    /// Releases the lock so the broker can redeliver the message.
    async fn abandon(&self) -> Result<(), TransportError>;
}

/// One message handed out by a receiver link.
///
/// Settling consumes the delivery, so a message is completed or abandoned at
/// most once. Dropping it unsettled leaves the lock to expire on the broker.
pub struct Delivery {
    envelope: MessageEnvelope,
    delivery_count: u32,
    lock: Box<dyn Acknowledge>,
}

impl Delivery {
    /// Wraps an envelope and its lock.
    #[must_use]
    pub fn new(envelope: MessageEnvelope, delivery_count: u32, lock: Box<dyn Acknowledge>) -> Self {
        Self {
            envelope,
            delivery_count,
            lock,
        }
    }

    /// The received envelope.
    #[must_use]
    pub const fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }

    /// How many times the broker has handed this message out, starting at one.
    #[must_use]
    pub const fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// Completes the message.
    ///
    /// # Errors
    ///
    /// The transport's error when settlement fails.
    pub async fn complete(self) -> Result<(), TransportError> {
        self.lock.complete().await
    }

    /// Abandons the message.
    ///
    /// # Errors
    ///
    /// The transport's error when settlement fails.
    pub async fn abandon(self) -> Result<(), TransportError> {
        self.lock.abandon().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.envelope.message_id())
            .field("delivery_count", &self.delivery_count)
            .finish_non_exhaustive()
    }
}

/// A transport that can be built from connection information.
pub trait Connect: BrokerTransport + Sized {
    /// Connects to the broker described by `connection`.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] when the endpoint is unsupported or unreachable.
    fn connect(connection: &ConnectionInfo) -> Result<Self, TransportError>;
}
