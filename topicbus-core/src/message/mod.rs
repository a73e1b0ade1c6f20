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

pub use bus_error::{BusError, CodecError, TransportError};
pub use codec::{BodyEncoding, MessageCodec};
pub use descriptor::{
    DuplicateDetection, QueueDescriptor, ReceiveMode, ReceiveOptions, ReceiveSource,
    SubscriptionDescriptor, SubscriptionFilter, SubscriptionKey, TopicDescriptor,
};
pub use envelope::{
    EntityPath, MessageBody, MessageEnvelope, BODY_ENCODING_KEY, FULL_NAME_KEY, MODULE_KEY,
    NAMESPACE_KEY,
};

mod bus_error;
mod codec;
mod descriptor;
mod envelope;
