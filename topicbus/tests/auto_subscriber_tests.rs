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
use std::sync::atomic::Ordering;

use topicbus::consumer_set;
use topicbus::prelude::*;
use topicbus_test::prelude::*;

use crate::setup::*;

mod setup;

fn declared_consumers(journal: &Journal) -> ConsumerSet {
    let (audit_sample, audit_another, mailer) = (journal.clone(), journal.clone(), journal.clone());
    ConsumerSet::new()
        .consumer_with::<AuditLog, SampleMessage, _>(move || Ok(AuditLog { journal: audit_sample }))
        .consumer_with::<AuditLog, AnotherSampleMessage, _>(move || {
            Ok(AuditLog { journal: audit_another })
        })
        .consumer_with::<Mailer, SampleMessage, _>(move || Ok(Mailer { journal: mailer }))
}

#[bus_test]
async fn every_declared_pair_is_subscribed() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = memory_bus(&broker)?;
    let journal = Journal::default();

    let registrations = AutoSubscriber::new(&bus, "orders")
        .subscribe(declared_consumers(&journal))
        .await?;

    let ids: Vec<_> = registrations
        .iter()
        .map(|r| (r.consumer().name(), r.message().name(), r.subscription_id()))
        .collect();
    assert_eq!(
        ids,
        vec![
            ("AuditLog", "SampleMessage", "orders.AuditLog"),
            ("AuditLog", "AnotherSampleMessage", "orders.AuditLog"),
            ("Mailer", "SampleMessage", "orders.Mailer"),
        ]
    );
    assert!(broker.subscription_exists(&topic_of::<SampleMessage>(), "orders.auditlog"));
    assert!(broker.subscription_exists(&topic_of::<SampleMessage>(), "orders.mailer"));
    assert!(broker.subscription_exists(&topic_of::<AnotherSampleMessage>(), "orders.auditlog"));

    bus.publish(&SampleMessage { value: "1".into() }).await?;
    bus.publish(&AnotherSampleMessage { value: "2".into() }).await?;

    assert!(eventually(|| journal.len() == 3).await);
    assert_eq!(
        journal.entries(),
        vec!["audit:another:2", "audit:sample:1", "mailer:sample:1"]
    );
    Ok(())
}

#[bus_test]
async fn hashed_ids_are_stable_and_per_pair() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = memory_bus(&InMemoryBroker::new())?;
    let subscriber = AutoSubscriber::new(&bus, "orders").with_hashed_ids();
    let audit = TypeInfo::of::<AuditLog>();

    let sample = subscriber.subscription_id(&audit, &SampleMessage::type_info());
    let again = subscriber.subscription_id(&audit, &SampleMessage::type_info());
    let another = subscriber.subscription_id(&audit, &AnotherSampleMessage::type_info());

    assert_eq!(sample, again);
    assert_ne!(sample, another);
    assert!(sample.starts_with("orders_"));
    assert_eq!(sample.len(), "orders_".len() + 32);
    assert!(sample["orders_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    Ok(())
}

#[bus_test]
async fn repeated_pairs_are_rejected_before_anything_is_subscribed() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = memory_bus(&broker)?;

    let consumers = consumer_set![
        CreditTally => Credit,
        CreditTally => Credit,
    ];
    assert_eq!(consumers.len(), 2);
    let result = AutoSubscriber::new(&bus, "ledger").subscribe(consumers).await;

    assert!(matches!(result, Err(BusError::Resolution { .. })), "{result:?}");
    assert!(!broker.topic_exists(&topic_of::<Credit>()));
    Ok(())
}

#[bus_test]
async fn failing_factory_aborts_registration() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = memory_bus(&broker)?;
    let journal = Journal::default();

    let consumers = ConsumerSet::new()
        .consumer_with::<Mailer, SampleMessage, _>(move || Ok(Mailer { journal }))
        .consumer_with::<AuditLog, SampleMessage, _>(|| anyhow::bail!("audit store offline"));
    let result = AutoSubscriber::new(&bus, "orders").subscribe(consumers).await;

    match result {
        Err(BusError::Resolution { consumer, reason, .. }) => {
            assert!(consumer.ends_with("AuditLog"), "{consumer}");
            assert!(reason.contains("audit store offline"), "{reason}");
        }
        other => panic!("expected a resolution error, got {other:?}"),
    }
    assert!(!broker.subscription_exists(&topic_of::<SampleMessage>(), "orders.mailer"));
    Ok(())
}

#[bus_test]
async fn empty_root_is_a_configuration_error() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = memory_bus(&InMemoryBroker::new())?;

    let result = AutoSubscriber::new(&bus, "  ")
        .subscribe(consumer_set![CreditTally => Credit])
        .await;

    assert!(matches!(result, Err(BusError::Configuration(_))));
    Ok(())
}

#[bus_test]
async fn default_constructed_consumers_handle_messages() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = InMemoryBroker::new();
    let bus = memory_bus(&broker)?;

    let registrations = AutoSubscriber::new(&bus, "ledger")
        .subscribe(consumer_set![CreditTally => Credit])
        .await?;
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].handler().subscription().subscription(), "ledger.credittally");

    bus.publish(&Credit { amount: 4 }).await?;
    bus.publish(&Credit { amount: 6 }).await?;

    assert!(eventually(|| CREDITS_TALLIED.load(Ordering::SeqCst) == 10).await);
    Ok(())
}
