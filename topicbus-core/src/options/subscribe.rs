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

use std::time::Duration;

use super::{EntityNaming, TopicOptions};
use crate::message::{ReceiveMode, ReceiveOptions, SubscriptionDescriptor, SubscriptionFilter};
use crate::traits::TypeInfo;

/// Options for a single subscribe call.
#[derive(Clone, Debug)]
pub struct SubscribeOptions {
    topic: TopicOptions,
    subscription: String,
    receive_mode: ReceiveMode,
    max_concurrent_calls: usize,
    lock_auto_renew_timeout: Duration,
    type_filter: bool,
}

impl SubscribeOptions {
    /// Subscription used when none is named.
    pub const DEFAULT_SUBSCRIPTION: &'static str = "default";
    /// Lock renewal window used unless configured otherwise.
    pub const DEFAULT_LOCK_AUTO_RENEW: Duration = Duration::from_secs(5 * 60);

    /// Applies `configure` to the topic options.
    #[must_use]
    pub fn with_topic(self, configure: impl FnOnce(TopicOptions) -> TopicOptions) -> Self {
        Self {
            topic: configure(self.topic),
            ..self
        }
    }

    /// Replaces the topic naming strategy.
    #[must_use]
    pub fn with_topic_naming(self, naming: EntityNaming) -> Self {
        self.with_topic(|topic| topic.with_naming(naming))
    }

    /// Subscribes to the topic named after the message namespace.
    #[must_use]
    pub fn topic_by_namespace(self) -> Self {
        self.with_topic(TopicOptions::by_namespace)
    }

    /// Names the subscription. Names are lower-cased when the subscription is created.
    #[must_use]
    pub fn with_subscription(self, subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ..self
        }
    }

    /// Replaces the receive mode.
    #[must_use]
    pub fn with_receive_mode(self, receive_mode: ReceiveMode) -> Self {
        Self {
            receive_mode,
            ..self
        }
    }

    /// Deletes messages on receipt instead of locking them.
    #[must_use]
    pub fn receive_and_delete(self) -> Self {
        self.with_receive_mode(ReceiveMode::ReceiveAndDelete)
    }

    /// Bounds concurrent deliveries. Values below one are raised to one.
    #[must_use]
    pub fn with_max_concurrent_calls(self, max_concurrent_calls: usize) -> Self {
        Self {
            max_concurrent_calls: max_concurrent_calls.max(1),
            ..self
        }
    }

    /// Replaces the lock renewal window.
    #[must_use]
    pub fn with_lock_auto_renew_timeout(self, lock_auto_renew_timeout: Duration) -> Self {
        Self {
            lock_auto_renew_timeout,
            ..self
        }
    }

    /// Creates the subscription with a server-side filter on the message type.
    ///
    /// The filter is fixed when the subscription is first created. Leave it off
    /// for subscriptions shared by several message types.
    #[must_use]
    pub fn with_type_filter(self) -> Self {
        Self {
            type_filter: true,
            ..self
        }
    }

    /// Topic options.
    #[must_use]
    pub const fn topic(&self) -> &TopicOptions {
        &self.topic
    }

    /// Subscription name as given.
    #[must_use]
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Receive mode.
    #[must_use]
    pub const fn receive_mode(&self) -> ReceiveMode {
        self.receive_mode
    }

    /// Concurrency bound.
    #[must_use]
    pub const fn max_concurrent_calls(&self) -> usize {
        self.max_concurrent_calls
    }

    /// Lock renewal window.
    #[must_use]
    pub const fn lock_auto_renew_timeout(&self) -> Duration {
        self.lock_auto_renew_timeout
    }

    /// Whether a type filter is requested.
    #[must_use]
    pub const fn type_filter(&self) -> bool {
        self.type_filter
    }

    /// Receive-loop settings.
    #[must_use]
    pub const fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            receive_mode: self.receive_mode,
            max_concurrent_calls: self.max_concurrent_calls,
            lock_auto_renew_timeout: self.lock_auto_renew_timeout,
        }
    }

    /// The subscription on `topic` for messages of `type_info`.
    #[must_use]
    pub fn descriptor(&self, topic: &str, type_info: &TypeInfo) -> SubscriptionDescriptor {
        let filter = if self.type_filter {
            SubscriptionFilter::MessageType(type_info.full_name().to_string())
        } else {
            SubscriptionFilter::All
        };
        SubscriptionDescriptor::new(topic, &self.subscription, filter, self.receive_options())
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            topic: TopicOptions::default(),
            subscription: Self::DEFAULT_SUBSCRIPTION.to_string(),
            receive_mode: ReceiveMode::PeekLock,
            max_concurrent_calls: 1,
            lock_auto_renew_timeout: Self::DEFAULT_LOCK_AUTO_RENEW,
            type_filter: false,
        }
    }
}
