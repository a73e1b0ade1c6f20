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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::naming::MetadataHook;
use super::{EntityNaming, MessageIdStrategy, OutgoingMessage};
use crate::message::{BodyEncoding, DuplicateDetection, TopicDescriptor};
use crate::traits::TypeInfo;

/// How topics are named and created. Shared by publishing and subscribing so
/// both sides land on the same topic.
#[derive(Clone, Debug, Default)]
pub struct TopicOptions {
    naming: EntityNaming,
    duplicate_detection: DuplicateDetection,
}

impl TopicOptions {
    /// Replaces the naming strategy.
    #[must_use]
    pub fn with_naming(self, naming: EntityNaming) -> Self {
        Self { naming, ..self }
    }

    /// Names topics after the message namespace.
    #[must_use]
    pub fn by_namespace(self) -> Self {
        self.with_naming(EntityNaming::Namespace)
    }

    /// Enables duplicate detection with `window`.
    #[must_use]
    pub fn with_duplicate_detection(self, window: Duration) -> Self {
        Self {
            duplicate_detection: DuplicateDetection::within(window),
            ..self
        }
    }

    /// Disables duplicate detection.
    #[must_use]
    pub fn without_duplicate_detection(self) -> Self {
        Self {
            duplicate_detection: DuplicateDetection::disabled(),
            ..self
        }
    }

    /// The naming strategy.
    #[must_use]
    pub const fn naming(&self) -> &EntityNaming {
        &self.naming
    }

    /// The duplicate detection policy.
    #[must_use]
    pub const fn duplicate_detection(&self) -> DuplicateDetection {
        self.duplicate_detection
    }

    /// Topic for messages of `type_info`.
    #[must_use]
    pub fn descriptor_for(&self, type_info: &TypeInfo) -> TopicDescriptor {
        TopicDescriptor::new(
            self.naming.entity_name(type_info),
            self.duplicate_detection,
        )
    }
}

/// Options for a single publish.
///
/// ```rust,ignore
/// bus.publish_with(&order, |options| {
///     options
///         .with_message_id(MessageIdStrategy::ContentHash)
///         .with_metadata(|_, headers| {
///             headers.insert("tenant".into(), "blue".into());
///         })
/// })
/// .await?;
/// ```
#[derive(Clone, Default)]
pub struct PublishOptions {
    topic: TopicOptions,
    message_id: MessageIdStrategy,
    metadata: Option<MetadataHook>,
    body_encoding: BodyEncoding,
}

impl PublishOptions {
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

    /// Publishes to the topic named after the message namespace.
    #[must_use]
    pub fn topic_by_namespace(self) -> Self {
        self.with_topic(TopicOptions::by_namespace)
    }

    /// Replaces the message id strategy.
    #[must_use]
    pub fn with_message_id(self, message_id: MessageIdStrategy) -> Self {
        Self { message_id, ..self }
    }

    /// Replaces the hook that adds custom headers to each message.
    #[must_use]
    pub fn with_metadata(
        self,
        hook: impl Fn(&OutgoingMessage<'_>, &mut BTreeMap<String, String>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            metadata: Some(Arc::new(hook)),
            ..self
        }
    }

    /// Replaces the body encoding.
    #[must_use]
    pub fn with_body_encoding(self, body_encoding: BodyEncoding) -> Self {
        Self {
            body_encoding,
            ..self
        }
    }

    /// Topic options.
    #[must_use]
    pub const fn topic(&self) -> &TopicOptions {
        &self.topic
    }

    /// Message id strategy.
    #[must_use]
    pub const fn message_id(&self) -> &MessageIdStrategy {
        &self.message_id
    }

    pub(crate) fn metadata_hook(&self) -> Option<&MetadataHook> {
        self.metadata.as_ref()
    }

    /// Body encoding.
    #[must_use]
    pub const fn body_encoding(&self) -> BodyEncoding {
        self.body_encoding
    }
}

impl fmt::Debug for PublishOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishOptions")
            .field("topic", &self.topic)
            .field("message_id", &self.message_id)
            .field("metadata", &self.metadata.is_some())
            .field("body_encoding", &self.body_encoding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Invoice;

    #[test]
    fn defaults() {
        let options = PublishOptions::default();
        assert!(matches!(options.topic().naming(), EntityNaming::FullName));
        assert!(matches!(options.message_id(), MessageIdStrategy::Random));
        assert_eq!(options.topic().duplicate_detection(), DuplicateDetection::default());
        assert_eq!(options.body_encoding(), BodyEncoding::Text);
        assert!(options.metadata_hook().is_none());
    }

    #[test]
    fn each_override_touches_only_its_option() {
        let options = PublishOptions::default()
            .topic_by_namespace()
            .with_body_encoding(BodyEncoding::Base64);
        assert!(matches!(options.topic().naming(), EntityNaming::Namespace));
        assert!(matches!(options.message_id(), MessageIdStrategy::Random));
        assert!(options.topic().duplicate_detection().enabled);
    }

    #[test]
    fn topic_descriptor_carries_dedup_policy() {
        let topic = TopicOptions::default().with_duplicate_detection(Duration::from_secs(60));
        let descriptor = topic.descriptor_for(&TypeInfo::of::<Invoice>());
        assert_eq!(descriptor.name(), "topicbus_core.options.publish.tests.invoice");
        assert_eq!(
            descriptor.duplicate_detection(),
            DuplicateDetection::within(Duration::from_secs(60))
        );
    }
}
