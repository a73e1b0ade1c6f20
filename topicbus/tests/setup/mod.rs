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
#![allow(unused)]

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use topicbus::prelude::*;

pub use consumers::*;
pub use messages::*;

pub mod consumers;
pub mod messages;

static INIT: Once = Once::new();

/// Initializes the global tracing subscriber once per test binary.
///
/// Output goes to `logs/bus_tests.txt` so it does not interleave with the
/// test harness output.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "bus_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The writer must outlive every test.
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("info")
            .add_directive("topicbus_core::common::router=trace".parse().unwrap())
            .add_directive("topicbus_core::common::memory=trace".parse().unwrap())
            .add_directive("topicbus_core::common::registry=debug".parse().unwrap())
            .add_directive("tokio=info".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// A bus over a clone of `broker`, with default configuration.
pub fn memory_bus(broker: &InMemoryBroker) -> anyhow::Result<TopicBus> {
    Ok(TopicBus::builder(broker.clone()).build()?)
}

/// A bus that routes every message type to one topic.
pub fn single_topic_bus(broker: &InMemoryBroker, topic: &'static str) -> anyhow::Result<TopicBus> {
    Ok(TopicBus::builder(broker.clone())
        .with_topic_options(move |options| {
            options.with_naming(EntityNaming::custom(move |_| topic.to_string()))
        })
        .build()?)
}

/// Topic name the default naming gives `M`.
pub fn topic_of<M: BusMessage>() -> String {
    TopicOptions::default()
        .descriptor_for(&M::type_info())
        .name()
        .to_string()
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
