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

//! Type-based dispatch of deliveries to registered handlers.

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::{error, info, trace, warn};

use crate::message::{
    BusError, CodecError, MessageCodec, MessageEnvelope, SubscriptionDescriptor, SubscriptionKey,
};
use crate::traits::{BusMessage, TypeInfo};

type ErasedMessage = Arc<dyn Any + Send + Sync>;
type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;
type ErasedHandler = Arc<dyn Fn(ErasedMessage) -> HandlerFuture + Send + Sync>;
type Decoder =
    Arc<dyn Fn(&MessageCodec, &MessageEnvelope) -> Result<ErasedMessage, CodecError> + Send + Sync>;

/// Outcome of dispatching one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Every matching handler succeeded.
    Complete,
    /// Decoding or a handler failed.
    Abandon,
    /// No handler matched; the message is left to the broker.
    Unhandled,
}

/// Lifecycle of a subscription inside this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RouteState {
    /// Known locally, not yet confirmed on the broker.
    Unregistered = 0,
    /// Exists on the broker, no receive loop yet.
    Created = 1,
    /// Receive loop running.
    Active = 2,
    /// Disposed. Terminal.
    Closed = 3,
}

impl RouteState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unregistered,
            1 => Self::Created,
            2 => Self::Active,
            _ => Self::Closed,
        }
    }
}

/// A handler bound to one message type on one subscription.
#[derive(Clone)]
pub struct HandlerRegistration {
    message_type: TypeInfo,
    subscription: SubscriptionKey,
    handler: ErasedHandler,
}

impl HandlerRegistration {
    /// The declared message type.
    #[must_use]
    pub const fn message_type(&self) -> &TypeInfo {
        &self.message_type
    }

    /// The owning subscription.
    #[must_use]
    pub const fn subscription(&self) -> &SubscriptionKey {
        &self.subscription
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("message_type", &self.message_type.full_name())
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

struct TypeEntry {
    type_id: TypeId,
    decoder: Decoder,
}

/// Dispatch state of one subscription.
///
/// Reported type names resolve to a [`TypeId`] through `types`, which is an
/// exact string match. Handlers are then looked up by that id, so a handler
/// only ever sees the type it was registered for.
pub(crate) struct Route {
    descriptor: SubscriptionDescriptor,
    state: AtomicU8,
    types: DashMap<String, TypeEntry>,
    handlers: DashMap<TypeId, Vec<HandlerRegistration>>,
    starting: tokio::sync::Mutex<()>,
}

impl Route {
    fn new(descriptor: SubscriptionDescriptor) -> Self {
        Self {
            descriptor,
            state: AtomicU8::new(RouteState::Unregistered as u8),
            types: DashMap::new(),
            handlers: DashMap::new(),
            starting: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) const fn descriptor(&self) -> &SubscriptionDescriptor {
        &self.descriptor
    }

    pub(crate) fn state(&self) -> RouteState {
        RouteState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: RouteState, to: RouteState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Records that the subscription exists on the broker.
    pub(crate) fn mark_created(&self) {
        if self.transition(RouteState::Unregistered, RouteState::Created) {
            trace!(subscription = %self.descriptor.key(), "route created");
        }
    }

    /// Claims the right to start the receive loop. Only one caller wins.
    pub(crate) fn try_activate(&self) -> bool {
        self.transition(RouteState::Created, RouteState::Active)
    }

    /// Gives the claim back after the receive loop failed to start.
    pub(crate) fn deactivate(&self) {
        self.transition(RouteState::Active, RouteState::Created);
    }

    /// Serializes receive loop start attempts. A caller holding the guard sees
    /// the outcome of every earlier attempt.
    pub(crate) async fn start_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.starting.lock().await
    }

    pub(crate) fn close(&self) {
        self.state.store(RouteState::Closed as u8, Ordering::Release);
        self.handlers.clear();
    }

    /// Adds a handler for `M`. Handlers for the same type run in registration order.
    pub(crate) fn register<M, F, Fut>(&self, handler: F) -> Result<HandlerRegistration, BusError>
    where
        M: BusMessage,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.state() == RouteState::Closed {
            return Err(BusError::Closed);
        }
        let message_type = M::type_info();

        let entry = self
            .types
            .entry(message_type.full_name().to_string())
            .or_insert_with(|| TypeEntry {
                type_id: message_type.type_id(),
                decoder: Arc::new(|codec: &MessageCodec, envelope: &MessageEnvelope| {
                    codec
                        .decode::<M>(envelope)
                        .map(|message| Arc::new(message) as ErasedMessage)
                }),
            });
        if entry.type_id != message_type.type_id() {
            return Err(BusError::Resolution {
                consumer: self.descriptor.key().to_string(),
                message: message_type.full_name().to_string(),
                reason: "another type is registered under the same name".to_string(),
            });
        }
        drop(entry);

        let erased: ErasedHandler = Arc::new(move |message: ErasedMessage| -> HandlerFuture {
            match message.downcast_ref::<M>() {
                Some(typed) => Box::pin(handler(typed.clone())),
                None => Box::pin(async {
                    Err(anyhow::anyhow!("delivery was decoded to the wrong type"))
                }),
            }
        });
        let registration = HandlerRegistration {
            message_type,
            subscription: self.descriptor.key().clone(),
            handler: erased,
        };
        self.handlers
            .entry(registration.message_type.type_id())
            .or_default()
            .push(registration.clone());
        trace!(
            subscription = %self.descriptor.key(),
            message_type = registration.message_type.full_name(),
            "handler registered"
        );
        Ok(registration)
    }

    /// Drops `registration` from the dispatch table.
    pub(crate) fn unregister(&self, registration: &HandlerRegistration) {
        let type_id = registration.message_type.type_id();
        if let Some(mut handlers) = self.handlers.get_mut(&type_id) {
            handlers.retain(|h| !Arc::ptr_eq(&h.handler, &registration.handler));
        }
        self.handlers.remove_if(&type_id, |_, handlers| handlers.is_empty());
        trace!(
            subscription = %self.descriptor.key(),
            message_type = registration.message_type.full_name(),
            "handler unregistered"
        );
    }

    /// Routes one envelope to the handlers registered for its reported type.
    pub(crate) async fn dispatch(&self, codec: &MessageCodec, envelope: &MessageEnvelope) -> Disposition {
        let subscription = self.descriptor.key();
        if self.state() == RouteState::Closed {
            trace!(%subscription, "dropping delivery for closed route");
            return Disposition::Unhandled;
        }
        let Some(reported) = envelope.message_type() else {
            warn!(%subscription, message_id = envelope.message_id(), "delivery carries no message type");
            return Disposition::Unhandled;
        };
        let Some((type_id, decoder)) = self
            .types
            .get(reported)
            .map(|entry| (entry.type_id, Arc::clone(&entry.decoder)))
        else {
            info!("No action was configured for type {reported} on {subscription}");
            return Disposition::Unhandled;
        };
        let handlers = self
            .handlers
            .get(&type_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        if handlers.is_empty() {
            info!("No action was configured for type {reported} on {subscription}");
            return Disposition::Unhandled;
        }

        let message = match decoder(codec, envelope) {
            Ok(message) => message,
            Err(e) => {
                let e = BusError::from(e);
                error!(%subscription, message_id = envelope.message_id(), error = %e, "failed to decode delivery");
                return Disposition::Abandon;
            }
        };

        for registration in handlers {
            if let Err(e) = (registration.handler)(Arc::clone(&message)).await {
                let e = BusError::dispatch(reported, e);
                error!(%subscription, message_id = envelope.message_id(), error = %e, "handler failed");
                return Disposition::Abandon;
            }
        }
        trace!(%subscription, message_id = envelope.message_id(), "delivery handled");
        Disposition::Complete
    }
}

/// Maps subscriptions to their dispatch state.
#[derive(Default)]
pub(crate) struct DispatchRouter {
    routes: DashMap<SubscriptionKey, Arc<Route>>,
}

impl DispatchRouter {
    /// The route for `descriptor`, created on first use.
    pub(crate) fn route(&self, descriptor: &SubscriptionDescriptor) -> Arc<Route> {
        let route = self
            .routes
            .entry(descriptor.key().clone())
            .or_insert_with(|| Arc::new(Route::new(descriptor.clone())));
        Arc::clone(route.value())
    }

    /// Closes every route and drops its handlers.
    pub(crate) fn close_all(&self) {
        for route in self.routes.iter() {
            route.value().close();
        }
    }
}

impl fmt::Debug for DispatchRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRouter")
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::message::{
        EntityPath, MessageBody, ReceiveMode, ReceiveOptions, SubscriptionFilter, FULL_NAME_KEY,
    };
    use crate::options::PublishOptions;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Credit {
        amount: u32,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Debit {
        amount: u32,
    }

    fn route() -> Route {
        let options = ReceiveOptions {
            receive_mode: ReceiveMode::PeekLock,
            max_concurrent_calls: 1,
            lock_auto_renew_timeout: Duration::from_secs(30),
        };
        let route = Route::new(SubscriptionDescriptor::new(
            "ledger",
            "default",
            SubscriptionFilter::All,
            options,
        ));
        route.mark_created();
        route
    }

    fn envelope<M: BusMessage>(message: &M) -> MessageEnvelope {
        MessageCodec
            .encode(message, EntityPath::Topic("ledger".into()), &PublishOptions::default())
            .expect("encode")
    }

    #[tokio::test]
    async fn handlers_only_see_their_declared_type() {
        let route = route();
        let credits = Arc::new(AtomicUsize::new(0));
        let counter = credits.clone();
        route
            .register::<Credit, _, _>(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .expect("register");

        // Debit has the same shape as Credit but a different name.
        let outcome = route.dispatch(&MessageCodec, &envelope(&Debit { amount: 5 })).await;
        assert_eq!(outcome, Disposition::Unhandled);
        assert_eq!(credits.load(Ordering::SeqCst), 0);

        let outcome = route.dispatch(&MessageCodec, &envelope(&Credit { amount: 5 })).await;
        assert_eq!(outcome, Disposition::Complete);
        assert_eq!(credits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handlers_run_in_order_and_stop_at_the_first_failure() {
        let route = route();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for (label, fail) in [("first", false), ("second", true), ("third", false)] {
            let calls = calls.clone();
            route
                .register::<Credit, _, _>(move |credit| {
                    let calls = calls.clone();
                    async move {
                        calls.lock().push((label, credit.amount));
                        if fail {
                            anyhow::bail!("{label} refused");
                        }
                        Ok(())
                    }
                })
                .expect("register");
        }

        let outcome = route.dispatch(&MessageCodec, &envelope(&Credit { amount: 9 })).await;
        assert_eq!(outcome, Disposition::Abandon);
        assert_eq!(*calls.lock(), vec![("first", 9), ("second", 9)]);
    }

    #[tokio::test]
    async fn undecodable_bodies_are_abandoned() {
        let route = route();
        route
            .register::<Credit, _, _>(|_| async { Ok(()) })
            .expect("register");

        let mut metadata = BTreeMap::new();
        metadata.insert(FULL_NAME_KEY.to_string(), Credit::type_info().full_name().to_string());
        let broken = MessageEnvelope::new(
            "m-1".to_string(),
            MessageBody::Text("not json".to_string()),
            metadata,
            EntityPath::Topic("ledger".into()),
        );
        assert_eq!(route.dispatch(&MessageCodec, &broken).await, Disposition::Abandon);
    }

    #[tokio::test]
    async fn unregistered_handlers_stop_receiving() {
        let route = route();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registrations = Vec::new();
        for _ in 0..2 {
            let calls = calls.clone();
            registrations.push(
                route
                    .register::<Credit, _, _>(move |_| {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .expect("register"),
            );
        }

        route.unregister(&registrations[1]);
        let outcome = route.dispatch(&MessageCodec, &envelope(&Credit { amount: 2 })).await;
        assert_eq!(outcome, Disposition::Complete);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        route.unregister(&registrations[0]);
        let outcome = route.dispatch(&MessageCodec, &envelope(&Credit { amount: 2 })).await;
        assert_eq!(outcome, Disposition::Unhandled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_routes_refuse_work() {
        let route = route();
        assert!(route.try_activate());
        assert!(!route.try_activate());
        route.close();
        assert_eq!(route.state(), RouteState::Closed);
        assert!(!route.try_activate());
        assert!(matches!(
            route.register::<Credit, _, _>(|_| async { Ok(()) }),
            Err(BusError::Closed)
        ));
        let outcome = route.dispatch(&MessageCodec, &envelope(&Credit { amount: 1 })).await;
        assert_eq!(outcome, Disposition::Unhandled);
    }
}
