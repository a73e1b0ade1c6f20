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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use topicbus::prelude::*;

use super::messages::{AnotherSampleMessage, Credit, SampleMessage};

/// Shared log of what consumers saw.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        let mut entries = self.0.lock().clone();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

pub struct AuditLog {
    pub journal: Journal,
}

#[async_trait]
impl Consume<SampleMessage> for AuditLog {
    async fn consume(&self, message: SampleMessage) -> anyhow::Result<()> {
        self.journal.record(format!("audit:sample:{}", message.value));
        Ok(())
    }
}

#[async_trait]
impl Consume<AnotherSampleMessage> for AuditLog {
    async fn consume(&self, message: AnotherSampleMessage) -> anyhow::Result<()> {
        self.journal.record(format!("audit:another:{}", message.value));
        Ok(())
    }
}

pub struct Mailer {
    pub journal: Journal,
}

#[async_trait]
impl Consume<SampleMessage> for Mailer {
    async fn consume(&self, message: SampleMessage) -> anyhow::Result<()> {
        self.journal.record(format!("mailer:sample:{}", message.value));
        Ok(())
    }
}

pub static CREDITS_TALLIED: AtomicUsize = AtomicUsize::new(0);

/// Built with `Default`, so it reports through a static.
#[derive(Default)]
pub struct CreditTally;

#[async_trait]
impl Consume<Credit> for CreditTally {
    async fn consume(&self, message: Credit) -> anyhow::Result<()> {
        CREDITS_TALLIED.fetch_add(usize::try_from(message.amount)?, Ordering::SeqCst);
        Ok(())
    }
}
