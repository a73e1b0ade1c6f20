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

//! Naming and id strategies.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use derive_new::new;
use mti::prelude::*;
use sha2::{Digest, Sha256};

use crate::traits::TypeInfo;

type NameFn = Arc<dyn Fn(&TypeInfo) -> String + Send + Sync>;
type IdFn = Arc<dyn Fn(&OutgoingMessage<'_>) -> String + Send + Sync>;
pub(crate) type MetadataHook =
    Arc<dyn Fn(&OutgoingMessage<'_>, &mut BTreeMap<String, String>) + Send + Sync>;

/// A message on its way out, as seen by id strategies and metadata hooks.
#[derive(Clone, Copy, new)]
pub struct OutgoingMessage<'a> {
    type_info: &'a TypeInfo,
    json: &'a str,
    message: &'a dyn Any,
}

impl<'a> OutgoingMessage<'a> {
    /// Identity of the message type.
    #[must_use]
    pub const fn type_info(&self) -> &'a TypeInfo {
        self.type_info
    }

    /// The serialized body text.
    #[must_use]
    pub const fn json(&self) -> &'a str {
        self.json
    }

    /// The message itself, for strategies that need typed access.
    #[must_use]
    pub fn downcast<M: 'static>(&self) -> Option<&'a M> {
        self.message.downcast_ref::<M>()
    }
}

impl fmt::Debug for OutgoingMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingMessage")
            .field("type", &self.type_info.full_name())
            .field("json", &self.json)
            .finish_non_exhaustive()
    }
}

/// Derives a broker entity name from a message type.
#[derive(Clone, Default)]
pub enum EntityNaming {
    /// Lower-cased full name. One entity per message type.
    #[default]
    FullName,
    /// Lower-cased namespace. Every type in a module shares one entity.
    /// Types without a namespace fall back to their full name.
    Namespace,
    /// Caller-supplied function. The result is used verbatim.
    Custom(NameFn),
}

impl EntityNaming {
    /// A custom naming function.
    pub fn custom(name: impl Fn(&TypeInfo) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(name))
    }

    /// Name of the entity for `type_info`.
    #[must_use]
    pub fn entity_name(&self, type_info: &TypeInfo) -> String {
        match self {
            Self::FullName => type_info.full_name().to_lowercase(),
            Self::Namespace if !type_info.namespace().is_empty() => {
                type_info.namespace().to_lowercase()
            }
            Self::Namespace => type_info.full_name().to_lowercase(),
            Self::Custom(name) => name(type_info),
        }
    }
}

impl fmt::Debug for EntityNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullName => f.write_str("FullName"),
            Self::Namespace => f.write_str("Namespace"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Chooses the id of an outgoing message.
#[derive(Clone, Default)]
pub enum MessageIdStrategy {
    /// A fresh time-ordered unique id for every send.
    #[default]
    Random,
    /// Hex sha-256 of the body, so the broker drops repeated payloads.
    ContentHash,
    /// Caller-supplied function.
    Custom(IdFn),
}

impl MessageIdStrategy {
    /// A custom id function.
    pub fn custom(id: impl Fn(&OutgoingMessage<'_>) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(id))
    }

    /// Id for `message`.
    #[must_use]
    pub fn generate(&self, message: &OutgoingMessage<'_>) -> String {
        match self {
            Self::Random => "msg".create_type_id::<V7>().to_string(),
            Self::ContentHash => hex::encode(Sha256::digest(message.json().as_bytes())),
            Self::Custom(id) => id(message),
        }
    }
}

impl fmt::Debug for MessageIdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("Random"),
            Self::ContentHash => f.write_str("ContentHash"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OrderPlaced;

    #[test]
    fn full_name_naming_is_lower_cased_and_stable() {
        let info = TypeInfo::of::<OrderPlaced>();
        let first = EntityNaming::FullName.entity_name(&info);
        assert_eq!(first, "topicbus_core.options.naming.tests.orderplaced");
        assert_eq!(first, EntityNaming::FullName.entity_name(&info));
    }

    #[test]
    fn namespace_naming_groups_a_module() {
        let info = TypeInfo::of::<OrderPlaced>();
        assert_eq!(
            EntityNaming::Namespace.entity_name(&info),
            "topicbus_core.options.naming.tests"
        );
        assert_eq!(EntityNaming::Namespace.entity_name(&TypeInfo::of::<u8>()), "u8");
    }

    #[test]
    fn custom_naming_is_used_verbatim() {
        let naming = EntityNaming::custom(|info| format!("Prod-{}", info.name()));
        assert_eq!(naming.entity_name(&TypeInfo::of::<OrderPlaced>()), "Prod-OrderPlaced");
    }

    #[test]
    fn random_ids_differ() {
        let info = TypeInfo::of::<OrderPlaced>();
        let outgoing = OutgoingMessage::new(&info, "{}", &0_u8);
        let first = MessageIdStrategy::Random.generate(&outgoing);
        let second = MessageIdStrategy::Random.generate(&outgoing);
        assert_ne!(first, second);
        assert!(first.starts_with("msg"));
    }

    #[test]
    fn custom_ids_can_read_the_message() {
        let info = TypeInfo::of::<u32>();
        let value = 42_u32;
        let outgoing = OutgoingMessage::new(&info, "42", &value);
        let strategy = MessageIdStrategy::custom(|m| {
            m.downcast::<u32>().map_or_else(String::new, |v| format!("n-{v}"))
        });
        assert_eq!(strategy.generate(&outgoing), "n-42");
    }
}
