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

//! Topicbus Macro Library
//!
//! Provides [`bus_message`], the attribute that turns a plain struct or enum
//! into a value the bus can publish, send and dispatch.
//!
//! ```ignore
//! use topicbus::prelude::*;
//!
//! #[bus_message]
//! pub struct OrderPlaced {
//!     pub id: u64,
//!     pub total_cents: i64,
//! }
//! ```

use proc_macro::TokenStream;

use quote::{format_ident, quote};
use syn::{parse_macro_input, DeriveInput};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                // Matches both `Serialize` and `serde::Serialize`.
                if meta
                    .path
                    .segments
                    .last()
                    .is_some_and(|segment| segment.ident == trait_name)
                {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Derives what a type needs to travel over the bus.
///
/// Adds, when not already present:
/// - `#[derive(Clone, Debug)]`
/// - `#[derive(Serialize, Deserialize)]` through the serde re-exported by
///   `topicbus`, so callers need no direct serde dependency
///
/// and a compile-time assertion that the type is `Send + Sync + 'static`.
/// The blanket `BusMessage` implementation then applies.
///
/// ```ignore
/// #[bus_message]
/// pub enum PaymentEvent {
///     Authorized { amount: u64 },
///     Declined(String),
/// }
/// ```
#[proc_macro_attribute]
pub fn bus_message(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut std_traits = Vec::new();
    if !has_derive(&input, "Clone") {
        std_traits.push(quote!(Clone));
    }
    if !has_derive(&input, "Debug") {
        std_traits.push(quote!(Debug));
    }
    let std_derives = if std_traits.is_empty() {
        quote!()
    } else {
        quote!(#[derive(#(#std_traits),*)])
    };

    let mut serde_traits = Vec::new();
    if !has_derive(&input, "Serialize") {
        serde_traits.push(quote!(::topicbus::serde::Serialize));
    }
    if !has_derive(&input, "Deserialize") {
        serde_traits.push(quote!(::topicbus::serde::Deserialize));
    }
    let serde_derives = if serde_traits.is_empty() {
        quote!()
    } else {
        quote! {
            #[derive(#(#serde_traits),*)]
            #[serde(crate = "::topicbus::serde")]
        }
    };

    let assert_ident = format_ident!("_AssertBusMessage_{}", name);

    let expanded = quote! {
        #std_derives
        #serde_derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}
