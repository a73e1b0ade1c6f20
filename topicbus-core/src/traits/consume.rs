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

use async_trait::async_trait;

use super::BusMessage;

/// A consumer of one message type.
///
/// A type may implement `Consume<M>` for several message types; each pair is
/// registered separately with an [`AutoSubscriber`](crate::common::AutoSubscriber).
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct AuditLog;
///
/// #[async_trait]
/// impl Consume<OrderPlaced> for AuditLog {
///     async fn consume(&self, message: OrderPlaced) -> anyhow::Result<()> {
///         tracing::info!(order = message.id, "order placed");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Consume<M: BusMessage>: Send + Sync + 'static {
    /// Handles one message. An error abandons the delivery.
    async fn consume(&self, message: M) -> anyhow::Result<()>;
}
