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

//! Descriptors for the broker entities the bus creates.

use std::fmt;
use std::time::Duration;

use derive_new::new;
use serde::{Deserialize, Serialize};

use super::MessageEnvelope;

/// Broker-side duplicate suppression policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuplicateDetection {
    /// Whether the broker drops repeated message ids.
    pub enabled: bool,
    /// How long a message id is remembered.
    pub window: Duration,
}

impl DuplicateDetection {
    /// One day, the window used unless configured otherwise.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    /// Detection switched off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            window: Self::DEFAULT_WINDOW,
        }
    }

    /// Detection switched on with the given window.
    #[must_use]
    pub const fn within(window: Duration) -> Self {
        Self {
            enabled: true,
            window,
        }
    }
}

impl Default for DuplicateDetection {
    fn default() -> Self {
        Self::within(Self::DEFAULT_WINDOW)
    }
}

/// A topic as created on the broker.
#[derive(Clone, Debug, PartialEq, Eq, new)]
pub struct TopicDescriptor {
    #[new(into)]
    name: String,
    duplicate_detection: DuplicateDetection,
}

impl TopicDescriptor {
    /// Topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Duplicate detection requested at creation.
    #[must_use]
    pub const fn duplicate_detection(&self) -> DuplicateDetection {
        self.duplicate_detection
    }
}

/// A queue as created on the broker.
#[derive(Clone, Debug, PartialEq, Eq, new)]
pub struct QueueDescriptor {
    #[new(into)]
    name: String,
    duplicate_detection: DuplicateDetection,
}

impl QueueDescriptor {
    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Duplicate detection requested at creation.
    #[must_use]
    pub const fn duplicate_detection(&self) -> DuplicateDetection {
        self.duplicate_detection
    }
}

/// How a receiver takes messages off an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveMode {
    /// The message stays locked until it is completed or abandoned.
    #[default]
    PeekLock,
    /// The message is deleted as soon as it is handed out.
    ReceiveAndDelete,
}

/// Receive-loop settings passed to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Acknowledgement mode.
    pub receive_mode: ReceiveMode,
    /// Upper bound on deliveries handled at the same time. Never below one.
    pub max_concurrent_calls: usize,
    /// How long the transport keeps renewing a message lock while a handler runs.
    pub lock_auto_renew_timeout: Duration,
}

/// Server-side filter attached to a subscription when it is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SubscriptionFilter {
    /// Every message published to the topic.
    #[default]
    All,
    /// Only messages whose reported type full name equals this value.
    MessageType(String),
}

impl SubscriptionFilter {
    /// Whether the broker should forward `envelope` to the subscription.
    #[must_use]
    pub fn matches(&self, envelope: &MessageEnvelope) -> bool {
        match self {
            Self::All => true,
            Self::MessageType(full_name) => envelope.message_type() == Some(full_name.as_str()),
        }
    }
}

/// Identifies one subscription on one topic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct SubscriptionKey {
    #[new(into)]
    topic: String,
    #[new(into)]
    subscription: String,
}

impl SubscriptionKey {
    /// Owning topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscription name.
    #[must_use]
    pub fn subscription(&self) -> &str {
        &self.subscription
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.subscription)
    }
}

/// A subscription as created on the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionDescriptor {
    key: SubscriptionKey,
    filter: SubscriptionFilter,
    receive_options: ReceiveOptions,
}

impl SubscriptionDescriptor {
    /// Builds a descriptor. The subscription name is lower-cased.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        name: &str,
        filter: SubscriptionFilter,
        receive_options: ReceiveOptions,
    ) -> Self {
        Self {
            key: SubscriptionKey::new(topic, name.to_lowercase()),
            filter,
            receive_options,
        }
    }

    /// Topic and subscription name.
    #[must_use]
    pub const fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Owning topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.key.topic()
    }

    /// Subscription name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.key.subscription()
    }

    /// Server-side filter fixed at creation.
    #[must_use]
    pub const fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Receive-loop settings.
    #[must_use]
    pub const fn receive_options(&self) -> ReceiveOptions {
        self.receive_options
    }
}

/// An entity a receiver can read from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReceiveSource {
    /// A subscription on a topic.
    Subscription(SubscriptionKey),
    /// A queue.
    Queue(String),
}

impl fmt::Display for ReceiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscription(key) => {
                write!(f, "topics/{}/subscriptions/{}", key.topic(), key.subscription())
            }
            Self::Queue(name) => write!(f, "queues/{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_names_are_lower_cased() {
        let options = ReceiveOptions {
            receive_mode: ReceiveMode::PeekLock,
            max_concurrent_calls: 1,
            lock_auto_renew_timeout: Duration::from_secs(300),
        };
        let descriptor =
            SubscriptionDescriptor::new("orders", "Billing.Audit", SubscriptionFilter::All, options);
        assert_eq!(descriptor.name(), "billing.audit");
        assert_eq!(descriptor.key().to_string(), "orders:billing.audit");
    }

    #[test]
    fn duplicate_detection_defaults_to_one_day() {
        let policy = DuplicateDetection::default();
        assert!(policy.enabled);
        assert_eq!(policy.window, Duration::from_secs(86_400));
    }
}
