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

//! The `#[bus_test]` attribute.

use proc_macro::TokenStream;

use quote::{format_ident, quote};
use syn::{parse_macro_input, ItemFn};

/// Runs an async test on a fresh multi-threaded runtime.
///
/// The test body runs inside a `bus_test` span named after the function. A
/// panic on any runtime thread fails the test with its message and location.
/// The body may return `()` or any `Result` whose error is `Debug`.
#[proc_macro_attribute]
pub fn bus_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let inputs = &sig.inputs;
    let output = &sig.output;

    let async_name = format_ident!("__{}_async", name);

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            use ::std::sync::atomic::{AtomicBool, Ordering};
            use ::std::sync::Arc;
            use ::topicbus_test::__private::{parking_lot, tokio, tracing};

            #[derive(Default)]
            struct Captured {
                occurred: AtomicBool,
                message: parking_lot::Mutex<Option<String>>,
                location: parking_lot::Mutex<Option<String>>,
            }

            let captured = Arc::new(Captured::default());
            let hook_state = Arc::clone(&captured);
            let previous_hook = ::std::panic::take_hook();
            ::std::panic::set_hook(Box::new(move |info| {
                hook_state.occurred.store(true, Ordering::SeqCst);
                let message = info
                    .payload()
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| info.payload().downcast_ref::<String>().cloned());
                *hook_state.message.lock() = message.clone();
                *hook_state.location.lock() = info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                tracing::error!(
                    "Panic: {}",
                    message.unwrap_or_else(|| "no panic message".to_string()).trim().replace('\n', " ")
                );
                previous_hook(info);
            }));

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("failed to build the bus test runtime");

            let result = runtime.block_on(async {
                let span = tracing::info_span!("bus_test", name = stringify!(#name));
                let _enter = span.enter();
                #async_name().await
            });
            runtime.shutdown_background();

            if captured.occurred.load(Ordering::SeqCst) {
                let location = captured
                    .location
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "unknown location".to_string());
                let message = captured
                    .message
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "no panic message".to_string());
                panic!("Panic at {}: {}", location, message.trim().replace('\n', " "));
            }

            ::topicbus_test::TestOutcome::check(result);
        }

        async fn #async_name(#inputs) #output #body
    };

    expanded.into()
}
