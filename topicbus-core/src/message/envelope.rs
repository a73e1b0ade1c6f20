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

use derive_new::new;
use static_assertions::assert_impl_all;

/// Metadata key carrying the full name of the message type.
pub const FULL_NAME_KEY: &str = "Message.Type.FullName";
/// Metadata key carrying the namespace (module path) of the message type.
pub const NAMESPACE_KEY: &str = "Message.Type.Namespace";
/// Metadata key carrying the crate that declares the message type.
pub const MODULE_KEY: &str = "Message.Type.Module";
/// Metadata key set to `base64` when a binary body holds base64 text.
pub const BODY_ENCODING_KEY: &str = "Message.Body.Encoding";

/// Body of an envelope as carried by the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    /// A text body, normally JSON.
    Text(String),
    /// Raw bytes. See [`BODY_ENCODING_KEY`] for how they are framed.
    Binary(Vec<u8>),
}

impl MessageBody {
    /// Size of the body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A broker entity that can receive sends.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityPath {
    /// A topic, fanned out to its subscriptions.
    Topic(String),
    /// A point-to-point queue.
    Queue(String),
}

impl EntityPath {
    /// Name of the entity without its kind.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Topic(name) | Self::Queue(name) => name,
        }
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic(name) => write!(f, "topics/{name}"),
            Self::Queue(name) => write!(f, "queues/{name}"),
        }
    }
}

/// The unit of transmission: a body plus metadata headers.
///
/// Envelopes are built by [`MessageCodec::encode`](super::MessageCodec::encode) and
/// never modified afterwards; a transport receives them by value and hands clones
/// to each subscription it fans out to.
#[derive(Clone, Debug, PartialEq, Eq, new)]
pub struct MessageEnvelope {
    message_id: String,
    body: MessageBody,
    metadata: BTreeMap<String, String>,
    destination: EntityPath,
}

impl MessageEnvelope {
    /// Unique id used by the broker for duplicate detection.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// The encoded body.
    #[must_use]
    pub const fn body(&self) -> &MessageBody {
        &self.body
    }

    /// All metadata headers.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// A single metadata header.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The full name of the message type reported by the sender.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.header(FULL_NAME_KEY)
    }

    /// The entity the envelope was sent to.
    #[must_use]
    pub const fn destination(&self) -> &EntityPath {
        &self.destination
    }
}

assert_impl_all!(MessageEnvelope: Send, Sync, Clone);
