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

//! Test harness for Topicbus.
//!
//! `#[bus_test]` runs an async test on its own multi-threaded runtime and turns
//! panics raised on worker threads into test failures.
//!
//! ```ignore
//! use topicbus_test::prelude::*;
//!
//! #[bus_test]
//! async fn publishes() -> anyhow::Result<()> {
//!     Ok(())
//! }
//! ```

use std::fmt::Debug;

pub use topicbus_test_macro::bus_test;

/// Result types a `#[bus_test]` body may return.
pub trait TestOutcome {
    /// Panics if the outcome is a failure.
    fn check(self);
}

impl TestOutcome for () {
    fn check(self) {}
}

impl<T, E: Debug> TestOutcome for Result<T, E> {
    fn check(self) {
        if let Err(e) = self {
            panic!("test returned an error: {e:?}");
        }
    }
}

#[doc(hidden)]
pub mod __private {
    pub use parking_lot;
    pub use tokio;
    pub use tracing;
}

/// Glob import for tests.
pub mod prelude {
    pub use crate::{bus_test, TestOutcome};
}
