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

use super::EntityNaming;
use crate::message::{DuplicateDetection, QueueDescriptor, ReceiveMode, ReceiveOptions};
use crate::traits::TypeInfo;

/// Options for point-to-point queues.
///
/// Queue receivers always run in [`ReceiveMode::ReceiveAndDelete`]; handler
/// failures are logged and the message is gone.
#[derive(Clone, Debug)]
pub struct QueueOptions {
    naming: EntityNaming,
    duplicate_detection: DuplicateDetection,
    max_concurrent_calls: usize,
    lock_auto_renew_timeout: Duration,
}

impl QueueOptions {
    /// Lock renewal window used unless configured otherwise.
    pub const DEFAULT_LOCK_AUTO_RENEW: Duration = Duration::from_secs(10);

    /// Replaces the queue naming strategy.
    #[must_use]
    pub fn with_naming(self, naming: EntityNaming) -> Self {
        Self { naming, ..self }
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

    /// Naming strategy.
    #[must_use]
    pub const fn naming(&self) -> &EntityNaming {
        &self.naming
    }

    /// Receive-loop settings.
    #[must_use]
    pub const fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            receive_mode: ReceiveMode::ReceiveAndDelete,
            max_concurrent_calls: self.max_concurrent_calls,
            lock_auto_renew_timeout: self.lock_auto_renew_timeout,
        }
    }

    /// Queue for messages of `type_info`.
    #[must_use]
    pub fn descriptor_for(&self, type_info: &TypeInfo) -> QueueDescriptor {
        QueueDescriptor::new(self.naming.entity_name(type_info), self.duplicate_detection)
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            naming: EntityNaming::FullName,
            duplicate_detection: DuplicateDetection::default(),
            max_concurrent_calls: 1,
            lock_auto_renew_timeout: Self::DEFAULT_LOCK_AUTO_RENEW,
        }
    }
}
