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

#![forbid(unsafe_code)]
#![forbid(missing_docs)]

//! # Topicbus Core
//!
//! The message-routing engine behind Topicbus. It sits in front of a managed
//! topic broker and takes care of everything between a typed Rust value and a
//! delivery on the wire:
//!
//! - **Options** (`PublishOptions`, `SubscribeOptions`, `QueueOptions`): immutable
//!   per-call snapshots built from defaults plus ordered override functions.
//! - **Registry**: creates topics, subscriptions and queues on first use, exactly
//!   once per descriptor, and owns every open client handle.
//! - **Codec** (`MessageCodec`): JSON bodies plus type metadata headers.
//! - **Router**: per-subscription dispatch tables keyed by message `TypeId`.
//! - **Auto-subscriber** (`AutoSubscriber`, `ConsumerSet`): statically declared
//!   consumers bound to deterministic subscription ids.
//!
//! The broker itself is reached through the [`BrokerTransport`](prelude::BrokerTransport)
//! trait. [`InMemoryBroker`](prelude::InMemoryBroker) implements it in-process.

/// Bus runtime: configuration, registry, router, queues and the in-memory broker.
pub(crate) mod common;

/// Envelopes, descriptors, the codec and error types.
pub(crate) mod message;

/// Option snapshots and their resolver.
pub(crate) mod options;

/// Core traits: message identity, transport seams and consumers.
pub(crate) mod traits;

/// Commonly used items, re-exported for glob import.
pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::common::{
        AutoRegistration, AutoSubscriber, BusBuilder, BusConfig, ConnectionInfo,
        ConsumerSet, Disposition, EntityStats, HandlerRegistration, InMemoryBroker,
        QueueConfig, RouteState, SubscriptionConfig, SubscriptionIdStrategy, TopicBus,
        TopicConfig, TopicNamingConfig, TopicStats,
    };
    pub use crate::message::{
        BodyEncoding, BusError, CodecError, DuplicateDetection, EntityPath, MessageBody,
        MessageCodec, MessageEnvelope, QueueDescriptor, ReceiveMode, ReceiveOptions,
        ReceiveSource, SubscriptionDescriptor, SubscriptionFilter, SubscriptionKey,
        TopicDescriptor, TransportError, BODY_ENCODING_KEY, FULL_NAME_KEY, MODULE_KEY,
        NAMESPACE_KEY,
    };
    pub use crate::options::{
        EntityNaming, MessageIdStrategy, OutgoingMessage, PublishOptions, QueueOptions,
        Resolver, SubscribeOptions, TopicOptions,
    };
    pub use crate::traits::{
        Acknowledge, BrokerTransport, BusMessage, Connect, Consume, Delivery,
        DeliveryHandler, ReceiverLink, SenderLink, TypeInfo,
    };
}
