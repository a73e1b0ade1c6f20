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

//! Conversion between typed messages and envelopes.

use std::borrow::Cow;
use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::trace;

use super::{
    CodecError, EntityPath, MessageBody, MessageEnvelope, BODY_ENCODING_KEY, FULL_NAME_KEY,
    MODULE_KEY, NAMESPACE_KEY,
};
use crate::options::{OutgoingMessage, PublishOptions};
use crate::traits::BusMessage;

const BASE64_ENCODING: &str = "base64";

/// How the JSON text of a message is placed in the envelope body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyEncoding {
    /// A text body.
    #[default]
    Text,
    /// The UTF-8 bytes of the text, for transports that only carry binary bodies.
    Utf8Bytes,
    /// Base64 of the UTF-8 bytes, flagged with [`BODY_ENCODING_KEY`].
    Base64,
}

/// Encodes messages to envelopes and decodes envelope bodies back to messages.
///
/// Bodies are JSON. Decoding always targets a type chosen by the caller; the
/// codec never looks at the type headers to decide what to produce.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Encodes `message` for `destination`.
    ///
    /// The message id comes from the configured strategy. Headers set by the
    /// metadata hook are applied first so the type headers always win.
    ///
    /// # Errors
    ///
    /// [`CodecError::Serialize`] when the message cannot be serialized.
    pub fn encode<M: BusMessage>(
        &self,
        message: &M,
        destination: EntityPath,
        options: &PublishOptions,
    ) -> Result<MessageEnvelope, CodecError> {
        let type_info = M::type_info();
        let json = serde_json::to_string(message).map_err(|source| CodecError::Serialize {
            message_type: type_info.full_name().to_string(),
            source,
        })?;

        let outgoing = OutgoingMessage::new(&type_info, &json, message);
        let message_id = options.message_id().generate(&outgoing);

        let mut metadata = BTreeMap::new();
        if let Some(hook) = options.metadata_hook() {
            hook(&outgoing, &mut metadata);
        }
        metadata.insert(FULL_NAME_KEY.to_string(), type_info.full_name().to_string());
        metadata.insert(NAMESPACE_KEY.to_string(), type_info.namespace().to_string());
        metadata.insert(MODULE_KEY.to_string(), type_info.module().to_string());

        let body = match options.body_encoding() {
            BodyEncoding::Text => MessageBody::Text(json),
            BodyEncoding::Utf8Bytes => MessageBody::Binary(json.into_bytes()),
            BodyEncoding::Base64 => {
                metadata.insert(BODY_ENCODING_KEY.to_string(), BASE64_ENCODING.to_string());
                MessageBody::Binary(STANDARD.encode(json.as_bytes()).into_bytes())
            }
        };

        trace!(message_type = type_info.full_name(), %message_id, bytes = body.len(), "encoded message");
        Ok(MessageEnvelope::new(message_id, body, metadata, destination))
    }

    /// Decodes the body of `envelope` into `M`.
    ///
    /// Binary bodies are first turned back into text: base64 when the encoding
    /// header says so, then UTF-8.
    ///
    /// # Errors
    ///
    /// A [`CodecError`] when the body cannot be unwrapped or does not deserialize into `M`.
    pub fn decode<M: BusMessage>(&self, envelope: &MessageEnvelope) -> Result<M, CodecError> {
        let type_info = M::type_info();
        let text = Self::body_text(envelope, type_info.full_name())?;
        serde_json::from_str(&text).map_err(|source| CodecError::Deserialize {
            message_type: type_info.full_name().to_string(),
            source,
        })
    }

    fn body_text<'a>(
        envelope: &'a MessageEnvelope,
        message_type: &str,
    ) -> Result<Cow<'a, str>, CodecError> {
        let bytes = match envelope.body() {
            MessageBody::Text(text) => return Ok(Cow::Borrowed(text)),
            MessageBody::Binary(bytes) => bytes,
        };
        let bytes = if envelope.header(BODY_ENCODING_KEY) == Some(BASE64_ENCODING) {
            STANDARD
                .decode(bytes)
                .map_err(|source| CodecError::Base64 {
                    message_type: message_type.to_string(),
                    source,
                })?
        } else {
            bytes.clone()
        };
        String::from_utf8(bytes)
            .map(Cow::Owned)
            .map_err(|source| CodecError::Utf8 {
                message_type: message_type.to_string(),
                source,
            })
    }
}
