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

use std::fmt;
use std::sync::Arc;

type Override<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Produces option snapshots from a base value and ordered overrides.
///
/// Every call to [`Resolver::resolve_with`] starts again from the base, applies the
/// registered overrides in order and finishes with the per-call override. The
/// base itself is never modified.
#[derive(Clone)]
pub struct Resolver<T> {
    base: T,
    overrides: Vec<Override<T>>,
}

impl<T: Clone> Resolver<T> {
    /// A resolver that returns `base` until overrides are added.
    #[must_use]
    pub const fn new(base: T) -> Self {
        Self {
            base,
            overrides: Vec::new(),
        }
    }

    /// Appends an override applied on every resolution.
    #[must_use]
    pub fn with_override(mut self, apply: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.overrides.push(Arc::new(apply));
        self
    }

    /// The base with every registered override applied.
    #[must_use]
    pub fn resolve(&self) -> T {
        self.resolve_with(|options| options)
    }

    /// Like [`Resolver::resolve`], with `call` applied last.
    pub fn resolve_with(&self, call: impl FnOnce(T) -> T) -> T {
        let options = self
            .overrides
            .iter()
            .fold(self.base.clone(), |options, apply| apply(options));
        call(options)
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("base", &self.base)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Knobs {
        name: String,
        limit: usize,
    }

    #[test]
    fn overrides_apply_in_registration_order_then_call() {
        let resolver = Resolver::new(Knobs::default())
            .with_override(|k| Knobs { name: "bus".into(), ..k })
            .with_override(|k| Knobs { limit: 4, ..k })
            .with_override(|k| Knobs { name: format!("{}-late", k.name), ..k });

        let resolved = resolver.resolve_with(|k| Knobs { limit: k.limit * 2, ..k });
        assert_eq!(resolved, Knobs { name: "bus-late".into(), limit: 8 });
    }

    #[test]
    fn resolution_never_mutates_the_base() {
        let resolver = Resolver::new(Knobs::default()).with_override(|k| Knobs { limit: 3, ..k });
        let _ = resolver.resolve_with(|k| Knobs { name: "call".into(), ..k });
        assert_eq!(resolver.resolve(), Knobs { name: String::new(), limit: 3 });
    }
}
