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

use topicbus::prelude::*;

#[bus_message]
#[derive(PartialEq, Eq)]
pub struct SampleMessage {
    pub value: String,
}

#[bus_message]
#[derive(PartialEq, Eq)]
pub struct AnotherSampleMessage {
    pub value: String,
}

#[bus_message]
#[derive(PartialEq, Eq)]
pub struct OrderLine {
    pub sku: String,
    pub quantity: u32,
}

#[bus_message]
#[derive(PartialEq, Eq)]
pub struct OrderPlaced {
    pub id: u64,
    pub lines: Vec<OrderLine>,
}

#[bus_message]
#[derive(PartialEq, Eq)]
pub enum PaymentEvent {
    Authorized { amount: u64 },
    Declined(String),
}

// Same shape on purpose: only the type tells them apart.
#[bus_message]
pub struct Credit {
    pub amount: i64,
}

#[bus_message]
pub struct Debit {
    pub amount: i64,
}
