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

//! Point-to-point queue operations.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{error, info, instrument, trace};

use super::TopicBus;
use crate::message::{BusError, EntityPath, ReceiveSource};
use crate::options::QueueOptions;
use crate::traits::{BusMessage, Delivery, DeliveryHandler};

impl TopicBus {
    /// Sends `message` to the queue for its type. Returns the message id.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the queue, encoding or sending.
    pub async fn send<M: BusMessage>(&self, message: &M) -> Result<String, BusError> {
        self.send_with(message, |options| options).await
    }

    /// Sends `message`, applying `configure` to this call's queue options.
    ///
    /// Message ids, metadata and body encoding follow the bus publish defaults.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the queue, encoding or sending.
    #[instrument(skip(self, message, configure), fields(message_type = std::any::type_name::<M>()))]
    pub async fn send_with<M: BusMessage>(
        &self,
        message: &M,
        configure: impl FnOnce(QueueOptions) -> QueueOptions,
    ) -> Result<String, BusError> {
        self.ensure_open()?;
        let options = self.inner.queue.resolve_with(configure);
        let type_info = M::type_info();

        let queue = self
            .inner
            .registry
            .ensure_queue(options.descriptor_for(&type_info))
            .await?;
        let destination = EntityPath::Queue(queue.name().to_string());
        let sender = self.inner.registry.sender(&destination).await?;
        let envelope = self
            .inner
            .codec
            .encode(message, destination, &self.inner.publish.resolve())?;
        let message_id = envelope.message_id().to_string();

        sender.send(envelope).await?;
        info!(
            "Message of type {} was sent to queue {} with message id {}",
            type_info.full_name(),
            queue.name(),
            message_id
        );
        Ok(message_id)
    }

    /// Receives `M` from its queue with the bus defaults.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the queue or starting the receiver.
    pub async fn receive<M, F, Fut>(&self, handler: F) -> Result<(), BusError>
    where
        M: BusMessage,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.receive_with(|options| options, handler).await
    }

    /// Receives `M` from its queue, applying `configure` to this call's options.
    ///
    /// Messages are deleted on receipt. Decode and handler errors are logged
    /// and not retried. Calling this more than once for a queue adds competing
    /// receivers.
    ///
    /// # Errors
    ///
    /// Any [`BusError`] raised while ensuring the queue or starting the receiver.
    #[instrument(skip(self, configure, handler), fields(message_type = std::any::type_name::<M>()))]
    pub async fn receive_with<M, F, Fut>(
        &self,
        configure: impl FnOnce(QueueOptions) -> QueueOptions,
        handler: F,
    ) -> Result<(), BusError>
    where
        M: BusMessage,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.ensure_open()?;
        let options = self.inner.queue.resolve_with(configure);
        let type_info = M::type_info();

        let queue = self
            .inner
            .registry
            .ensure_queue(options.descriptor_for(&type_info))
            .await?;
        let source = ReceiveSource::Queue(queue.name().to_string());
        let receiver = self
            .inner
            .registry
            .receiver(&source, options.receive_options())
            .await?;

        let codec = self.inner.codec;
        let expected = type_info.full_name().to_string();
        let handler = Arc::new(handler);
        let on_delivery: DeliveryHandler = Arc::new(move |delivery: Delivery| -> BoxFuture<'static, ()> {
            let handler = Arc::clone(&handler);
            let expected = expected.clone();
            Box::pin(async move {
                let envelope = delivery.envelope();
                if envelope.message_type() != Some(expected.as_str()) {
                    error!(
                        message_id = envelope.message_id(),
                        reported = envelope.message_type().unwrap_or_default(),
                        %expected,
                        "queue delivery has an unexpected message type"
                    );
                    return;
                }
                let message = match codec.decode::<M>(envelope) {
                    Ok(message) => message,
                    Err(e) => {
                        error!(message_id = envelope.message_id(), error = %e, "failed to decode queue delivery");
                        return;
                    }
                };
                if let Err(e) = handler(message).await {
                    let e = BusError::dispatch(&expected, e);
                    error!(message_id = envelope.message_id(), error = %e, "queue handler failed");
                    return;
                }
                trace!(message_id = envelope.message_id(), "queue delivery handled");
            })
        });
        receiver.start(on_delivery).await?;
        info!(queue = queue.name(), "queue receiver started");
        Ok(())
    }
}
