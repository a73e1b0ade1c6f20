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

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::message::{BusError, DuplicateDetection, ReceiveMode};
use crate::options::{EntityNaming, PublishOptions, QueueOptions, SubscribeOptions, TopicOptions};

/// Configuration for a bus.
///
/// Loaded from TOML, typically `$XDG_CONFIG_HOME/topicbus/config.toml`, and
/// handed to [`TopicBus::connect`](crate::common::TopicBus::connect) or
/// [`BusBuilder::with_config`](crate::common::BusBuilder::with_config). Every
/// section is optional.
///
/// ```toml
/// connection_string = "Endpoint=sb://shop.servicebus.windows.net/;SharedAccessKeyName=app;SharedAccessKey=c2VjcmV0"
///
/// [topics]
/// naming = "namespace"
/// duplicate_detection_window_secs = 600
///
/// [subscriptions]
/// name = "billing"
/// max_concurrent_calls = 8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BusConfig {
    /// Broker connection string.
    pub connection_string: Option<String>,
    /// Topic defaults
    pub topics: TopicConfig,
    /// Subscription defaults
    pub subscriptions: SubscriptionConfig,
    /// Queue defaults
    pub queues: QueueConfig,
}

/// Topic naming choices available from configuration files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopicNamingConfig {
    /// Lower-cased full type name.
    #[default]
    FullName,
    /// Lower-cased namespace.
    Namespace,
}

/// Topic defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TopicConfig {
    /// How topics are named.
    pub naming: TopicNamingConfig,
    /// Whether new topics drop duplicate message ids.
    pub duplicate_detection: bool,
    /// Duplicate detection window in seconds.
    pub duplicate_detection_window_secs: u64,
}

/// Subscription defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Subscription name when a subscribe call names none.
    pub name: String,
    /// Receive mode.
    pub receive_mode: ReceiveMode,
    /// Concurrent deliveries per subscription.
    pub max_concurrent_calls: usize,
    /// Lock renewal window in seconds.
    pub lock_auto_renew_timeout_secs: u64,
    /// Create subscriptions with a message type filter.
    pub type_filter: bool,
}

/// Queue defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Whether new queues drop duplicate message ids.
    pub duplicate_detection: bool,
    /// Duplicate detection window in seconds.
    pub duplicate_detection_window_secs: u64,
    /// Concurrent deliveries per queue receiver.
    pub max_concurrent_calls: usize,
    /// Lock renewal window in seconds.
    pub lock_auto_renew_timeout_secs: u64,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            naming: TopicNamingConfig::FullName,
            duplicate_detection: true,
            duplicate_detection_window_secs: DuplicateDetection::DEFAULT_WINDOW.as_secs(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            name: SubscribeOptions::DEFAULT_SUBSCRIPTION.to_string(),
            receive_mode: ReceiveMode::PeekLock,
            max_concurrent_calls: 1,
            lock_auto_renew_timeout_secs: SubscribeOptions::DEFAULT_LOCK_AUTO_RENEW.as_secs(),
            type_filter: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            duplicate_detection: true,
            duplicate_detection_window_secs: DuplicateDetection::DEFAULT_WINDOW.as_secs(),
            max_concurrent_calls: 1,
            lock_auto_renew_timeout_secs: QueueOptions::DEFAULT_LOCK_AUTO_RENEW.as_secs(),
        }
    }
}

fn dedup_policy(enabled: bool, window_secs: u64) -> DuplicateDetection {
    if enabled {
        DuplicateDetection::within(Duration::from_secs(window_secs))
    } else {
        DuplicateDetection::disabled()
    }
}

impl BusConfig {
    /// Loads configuration from XDG-compliant locations.
    ///
    /// Looks for `topicbus/config.toml` under the XDG config directories and
    /// returns the defaults when there is none.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, BusError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("topicbus").map_err(|e| {
            BusError::Configuration(format!("failed to resolve XDG directories: {e}"))
        })?;

        match xdg_dirs.find_config_file("config.toml") {
            Some(path) => Self::load_from(&path),
            None => {
                info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Loads configuration from `path`.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, BusError> {
        info!("Loading configuration from: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            BusError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, BusError> {
        toml::from_str(text)
            .map_err(|e| BusError::Configuration(format!("failed to parse configuration: {e}")))
    }

    /// Parsed connection string, if one is configured.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the connection string is malformed.
    pub fn connection(&self) -> Result<Option<ConnectionInfo>, BusError> {
        self.connection_string
            .as_deref()
            .map(ConnectionInfo::parse)
            .transpose()
    }

    /// Checks values that have no sensible fallback.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] naming the first offending value.
    pub fn validate(&self) -> Result<(), BusError> {
        self.connection()?;
        if self.subscriptions.name.trim().is_empty() {
            return Err(BusError::Configuration(
                "subscriptions.name must not be empty".to_string(),
            ));
        }
        if self.subscriptions.max_concurrent_calls == 0 {
            return Err(BusError::Configuration(
                "subscriptions.max_concurrent_calls must be at least 1".to_string(),
            ));
        }
        if self.queues.max_concurrent_calls == 0 {
            return Err(BusError::Configuration(
                "queues.max_concurrent_calls must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn topic_options(&self) -> TopicOptions {
        let naming = match self.topics.naming {
            TopicNamingConfig::FullName => EntityNaming::FullName,
            TopicNamingConfig::Namespace => EntityNaming::Namespace,
        };
        let topic = TopicOptions::default().with_naming(naming);
        let policy = dedup_policy(
            self.topics.duplicate_detection,
            self.topics.duplicate_detection_window_secs,
        );
        if policy.enabled {
            topic.with_duplicate_detection(policy.window)
        } else {
            topic.without_duplicate_detection()
        }
    }

    /// Publish defaults described by this configuration.
    #[must_use]
    pub fn publish_options(&self) -> PublishOptions {
        let topic = self.topic_options();
        PublishOptions::default().with_topic(|_| topic)
    }

    /// Subscribe defaults described by this configuration.
    #[must_use]
    pub fn subscribe_options(&self) -> SubscribeOptions {
        let topic = self.topic_options();
        let mut options = SubscribeOptions::default()
            .with_topic(|_| topic)
            .with_subscription(self.subscriptions.name.clone())
            .with_receive_mode(self.subscriptions.receive_mode)
            .with_max_concurrent_calls(self.subscriptions.max_concurrent_calls)
            .with_lock_auto_renew_timeout(Duration::from_secs(
                self.subscriptions.lock_auto_renew_timeout_secs,
            ));
        if self.subscriptions.type_filter {
            options = options.with_type_filter();
        }
        options
    }

    /// Queue defaults described by this configuration.
    #[must_use]
    pub fn queue_options(&self) -> QueueOptions {
        let options = QueueOptions::default()
            .with_max_concurrent_calls(self.queues.max_concurrent_calls)
            .with_lock_auto_renew_timeout(Duration::from_secs(
                self.queues.lock_auto_renew_timeout_secs,
            ));
        let policy = dedup_policy(
            self.queues.duplicate_detection,
            self.queues.duplicate_detection_window_secs,
        );
        if policy.enabled {
            options.with_duplicate_detection(policy.window)
        } else {
            options.without_duplicate_detection()
        }
    }
}

/// A parsed broker connection string.
///
/// The format is a `;`-separated list of `Key=Value` pairs. `Endpoint` is
/// required; `SharedAccessKeyName` and `SharedAccessKey` must appear together.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    endpoint: String,
    key_name: Option<String>,
    key: Option<String>,
    entity_path: Option<String>,
}

impl ConnectionInfo {
    /// Parses `text`.
    ///
    /// # Errors
    ///
    /// [`BusError::Configuration`] when the string is empty, lacks an endpoint,
    /// contains a segment without `=`, or carries half of a shared access key.
    pub fn parse(text: &str) -> Result<Self, BusError> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for segment in text.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, value) = segment.split_once('=').ok_or_else(|| {
                BusError::Configuration(format!("connection string segment `{segment}` has no value"))
            })?;
            let value = value.trim().to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value),
                "sharedaccesskeyname" => key_name = Some(value),
                "sharedaccesskey" => key = Some(value),
                "entitypath" => entity_path = Some(value),
                other => debug!(key = other, "ignoring connection string setting"),
            }
        }

        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| BusError::Configuration("connection string has no Endpoint".to_string()))?;
        if !endpoint.contains("://") {
            return Err(BusError::Configuration(format!(
                "connection string Endpoint `{endpoint}` is not a URI"
            )));
        }
        if key_name.is_some() != key.is_some() {
            return Err(BusError::Configuration(
                "SharedAccessKeyName and SharedAccessKey must be given together".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            key_name,
            key,
            entity_path,
        })
    }

    /// Broker endpoint URI.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URI scheme of the endpoint, such as `sb`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.endpoint.split("://").next().unwrap_or_default()
    }

    /// Shared access key name.
    #[must_use]
    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    /// Shared access key.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Entity the connection string is scoped to.
    #[must_use]
    pub fn entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }
}

impl FromStr for ConnectionInfo {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// The key never appears in logs.
impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("endpoint", &self.endpoint)
            .field("key_name", &self.key_name)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_connection_string() {
        let info = ConnectionInfo::parse(
            "Endpoint=sb://shop.servicebus.windows.net/;SharedAccessKeyName=app;SharedAccessKey=abc==",
        )
        .expect("valid connection string");
        assert_eq!(info.endpoint(), "sb://shop.servicebus.windows.net/");
        assert_eq!(info.scheme(), "sb");
        assert_eq!(info.key_name(), Some("app"));
        assert_eq!(info.key(), Some("abc=="));
        assert!(!format!("{info:?}").contains("abc=="));
    }

    #[test]
    fn rejects_broken_connection_strings() {
        for text in [
            "",
            "SharedAccessKeyName=app;SharedAccessKey=abc",
            "Endpoint=shop",
            "Endpoint=sb://shop/;SharedAccessKeyName=app",
            "Endpoint=sb://shop/;garbage",
        ] {
            assert!(
                matches!(ConnectionInfo::parse(text), Err(BusError::Configuration(_))),
                "accepted {text:?}"
            );
        }
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = BusConfig::from_toml_str(
            r#"
            [subscriptions]
            name = "billing"
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.subscriptions.name, "billing");
        assert_eq!(config.subscriptions.max_concurrent_calls, 1);
        assert_eq!(config.topics, TopicConfig::default());
        assert!(config.connection_string.is_none());
    }

    #[test]
    fn validation_rejects_zero_concurrency() {
        let mut config = BusConfig::default();
        config.subscriptions.max_concurrent_calls = 0;
        assert!(matches!(config.validate(), Err(BusError::Configuration(_))));
    }

    #[test]
    fn configured_defaults_flow_into_options() {
        let config = BusConfig::from_toml_str(
            r#"
            [topics]
            naming = "namespace"
            duplicate_detection = false

            [subscriptions]
            name = "Audit"
            receive_mode = "receive_and_delete"
            max_concurrent_calls = 4
            "#,
        )
        .expect("valid toml");

        let subscribe = config.subscribe_options();
        assert_eq!(subscribe.subscription(), "Audit");
        assert_eq!(subscribe.receive_mode(), ReceiveMode::ReceiveAndDelete);
        assert_eq!(subscribe.max_concurrent_calls(), 4);
        assert!(matches!(subscribe.topic().naming(), EntityNaming::Namespace));
        assert!(!config.publish_options().topic().duplicate_detection().enabled);
    }
}
