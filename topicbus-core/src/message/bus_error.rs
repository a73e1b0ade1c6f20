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

//! Error types surfaced by the bus.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error carried by transport and dispatch failures.
pub(crate) type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors returned by bus operations.
///
/// Setup-time variants ([`BusError::Configuration`], [`BusError::Resolution`]) are
/// returned eagerly from construction and registration calls. [`BusError::Codec`] and
/// [`BusError::Dispatch`] raised while a delivery is being handled never reach a
/// caller; the router logs them and abandons that one message.
#[derive(Debug, Error)]
pub enum BusError {
    /// Missing or invalid connection information or configuration values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A consumer could not be bound during auto-registration.
    #[error("cannot register consumer {consumer} for {message}: {reason}")]
    Resolution {
        /// Full name of the consumer type.
        consumer: String,
        /// Full name of the message type.
        message: String,
        /// Why registration was refused.
        reason: String,
    },

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A handler returned an error.
    #[error("handler for {message_type} failed: {source}")]
    Dispatch {
        /// Full name of the message type being handled.
        message_type: String,
        /// The handler's error.
        #[source]
        source: BoxError,
    },

    /// The broker rejected a call. Propagated without further wrapping.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The bus has been disposed and accepts no further operations.
    #[error("the bus has been disposed")]
    Closed,
}

impl BusError {
    pub(crate) fn dispatch(message_type: &str, error: anyhow::Error) -> Self {
        Self::Dispatch {
            message_type: message_type.to_string(),
            source: error.into(),
        }
    }
}

/// Encoding and decoding failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message could not be serialized.
    #[error("failed to serialize {message_type}: {source}")]
    Serialize {
        /// Full name of the message type.
        message_type: String,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// The body could not be deserialized into the requested type.
    #[error("failed to deserialize body as {message_type}: {source}")]
    Deserialize {
        /// Full name of the requested type.
        message_type: String,
        /// Deserializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A base64-framed body did not contain valid base64.
    #[error("body for {message_type} is not valid base64: {source}")]
    Base64 {
        /// Full name of the requested type.
        message_type: String,
        /// Decoder error.
        #[source]
        source: base64::DecodeError,
    },

    /// A binary body did not contain UTF-8 text.
    #[error("body for {message_type} is not valid UTF-8: {source}")]
    Utf8 {
        /// Full name of the requested type.
        message_type: String,
        /// Conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// A failed broker call.
///
/// Transports wrap their own error type in this struct; the bus hands it back
/// to callers unchanged.
#[derive(Debug, Error)]
#[error("{operation} on {entity} failed: {source}")]
pub struct TransportError {
    operation: &'static str,
    entity: String,
    #[source]
    source: BoxError,
}

impl TransportError {
    /// Creates a transport error for `operation` against `entity`.
    pub fn new(
        operation: &'static str,
        entity: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            operation,
            entity: entity.into(),
            source: source.into(),
        }
    }

    /// The broker operation that failed, such as `"send"`.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// The entity the operation targeted.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_not_rewrapped() {
        let error: BusError = TransportError::new("send", "orders", "link detached").into();
        assert_eq!(error.to_string(), "send on orders failed: link detached");
        assert!(matches!(error, BusError::Transport(ref e) if e.operation() == "send"));
    }

    #[test]
    fn dispatch_keeps_handler_error_as_source() {
        let error = BusError::dispatch("app.Sample", anyhow::anyhow!("boom"));
        let source = error.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("boom"));
    }
}
