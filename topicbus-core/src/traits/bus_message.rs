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

use std::any::TypeId;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Identity of a Rust type as seen by the broker.
///
/// Names are derived from [`std::any::type_name`] with `::` rendered as `.`, so
/// `shop::orders::OrderPlaced` has namespace `shop.orders`, full name
/// `shop.orders.OrderPlaced` and module `shop`. The [`TypeId`] is the tag the
/// router dispatches on; the strings are what travels in envelope headers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    type_id: TypeId,
    name: String,
    namespace: String,
    full_name: String,
    module: String,
}

impl TypeInfo {
    /// Type identity of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_type_name(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    fn from_type_name(type_id: TypeId, raw: &str) -> Self {
        // Generic arguments belong to the short name.
        let path_end = raw.find('<').unwrap_or(raw.len());
        let (namespace, name) = match raw[..path_end].rfind("::") {
            Some(split) => (raw[..split].replace("::", "."), &raw[split + 2..]),
            None => (String::new(), raw),
        };
        let full_name = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        };
        let module = namespace
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            type_id,
            name: name.to_string(),
            namespace,
            full_name,
            module,
        }
    }

    /// Dispatch tag.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Short type name, such as `OrderPlaced`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted module path, such as `shop.orders`.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Namespace and name, such as `shop.orders.OrderPlaced`.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Declaring crate, such as `shop`.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }
}

/// A value that can travel over the bus.
///
/// Implemented for every type that is serializable, cloneable, debuggable and
/// thread-safe; the `#[bus_message]` attribute adds the derives.
pub trait BusMessage: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Identity used for topic naming, headers and dispatch.
    #[must_use]
    fn type_info() -> TypeInfo
    where
        Self: Sized,
    {
        TypeInfo::of::<Self>()
    }
}

impl<T> BusMessage for T where T: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {}
