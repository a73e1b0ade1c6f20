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

#![forbid(unsafe_code)]
#![forbid(missing_docs)]

//! # Topicbus
//!
//! A typed publish/subscribe layer over a managed topic broker.
//!
//! - Topics, subscriptions and queues are created on first use, once each.
//! - Messages travel as JSON with headers naming their Rust type.
//! - Deliveries are routed to the handlers registered for exactly that type,
//!   completed when every handler succeeds and abandoned otherwise.
//! - Consumers can be declared up front and subscribed in one call.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use topicbus::prelude::*;
//!
//! #[bus_message]
//! struct OrderPlaced {
//!     id: u64,
//! }
//!
//! let bus = TopicBus::builder(InMemoryBroker::new()).build()?;
//! bus.subscribe("billing", |order: OrderPlaced| async move {
//!     tracing::info!(id = order.id, "billing");
//!     Ok(())
//! })
//! .await?;
//! bus.publish(&OrderPlaced { id: 1 }).await?;
//! bus.dispose().await;
//! ```

#[doc(hidden)]
pub use serde;

pub use topicbus_core::consumer_set;

/// Everything needed to publish, subscribe and declare consumers.
pub mod prelude {
    pub use topicbus_core::prelude::*;
    pub use topicbus_macro::bus_message;
}
