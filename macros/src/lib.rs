//! Derive macros for CQEA messages
//!
//! Implementing [`Message`](../cqea_core/trait.Message.html) by hand is a
//! handful of one-line methods per type. `#[derive(Message)]` writes them from
//! a single attribute.
//!
//! # Available Macros
//!
//! - `#[derive(Message)]` - Implements `cqea_core::Message`
//!
//! # Example
//!
//! ```ignore
//! use cqea_macros::Message;
//! use serde::Serialize;
//!
//! struct NotFound;
//!
//! #[derive(Message, Serialize, Debug)]
//! #[message(error, supertypes(NotFound), json)]
//! struct UserNotFound {
//!     id: String,
//! }
//!
//! // Generated:
//! // kind() == MessageKind::Error
//! // supertypes() == [MessageType::of::<NotFound>()]
//! // to_json() == cqea_core::json_of(self)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{DeriveInput, Ident, LitStr, Path, parse_macro_input};

const KINDS: [(&str, &str); 5] = [
    ("command", "Command"),
    ("query", "Query"),
    ("event", "Event"),
    ("error", "Error"),
    ("view", "View"),
];

/// Derive macro for message types
///
/// Generates an implementation of `cqea_core::Message`:
/// - `kind()` - from the declared kind
/// - `supertypes()` - from `supertypes(...)`, nearest first
/// - `to_json()` - via `cqea_core::json_of` when `json` is set
///
/// # Attributes
///
/// All options live in one `#[message(...)]` attribute:
///
/// - `kind = "event"` or the shorthand `event` - required, one of
///   `command`, `query`, `event`, `error`, `view`
/// - `supertypes(A, b::B)` - abstract supertypes used for "is-a" matching
/// - `json` - the type implements `Serialize`; expose it through `to_json()`
///
/// # Panics
///
/// This macro will produce a compile error (not a runtime panic) if:
/// - The `#[message]` attribute is missing
/// - No kind, more than one kind, or an unknown kind is declared
/// - An unknown option is used
///
/// # Example
///
/// ```ignore
/// #[derive(Message, Serialize, Debug)]
/// #[message(kind = "event", json)]
/// struct OrderPlaced {
///     order_id: String,
/// }
///
/// let event: Box<dyn Message> = Box::new(OrderPlaced { order_id: "o-1".into() });
/// assert_eq!(event.kind(), MessageKind::Event);
/// assert!(event.to_json().is_some());
/// ```
#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_message(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct MessageOptions {
    kind: Option<Ident>,
    supertypes: Vec<Path>,
    json: bool,
}

impl MessageOptions {
    fn set_kind(&mut self, name: &str, span: Span) -> syn::Result<()> {
        let Some((_, variant)) = KINDS.iter().find(|(key, _)| *key == name) else {
            return Err(syn::Error::new(
                span,
                format!("unknown message kind `{name}`, expected one of: command, query, event, error, view"),
            ));
        };
        if self.kind.is_some() {
            return Err(syn::Error::new(span, "message kind declared more than once"));
        }
        self.kind = Some(Ident::new(variant, span));
        Ok(())
    }
}

fn parse_options(input: &DeriveInput) -> syn::Result<MessageOptions> {
    let mut options = MessageOptions::default();
    let mut seen = false;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("message")) {
        seen = true;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("kind") {
                let value: LitStr = meta.value()?.parse()?;
                return options.set_kind(&value.value(), value.span());
            }

            if meta.path.is_ident("supertypes") {
                return meta.parse_nested_meta(|inner| {
                    options.supertypes.push(inner.path);
                    Ok(())
                });
            }

            if meta.path.is_ident("json") {
                options.json = true;
                return Ok(());
            }

            if let Some(ident) = meta.path.get_ident() {
                let name = ident.to_string();
                if KINDS.iter().any(|(key, _)| *key == name) {
                    return options.set_kind(&name, ident.span());
                }
            }

            Err(meta.error("unsupported message option"))
        })?;
    }

    if !seen {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "#[derive(Message)] requires a #[message(...)] attribute declaring the kind",
        ));
    }
    if options.kind.is_none() {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "missing message kind, e.g. #[message(event)] or #[message(kind = \"event\")]",
        ));
    }

    Ok(options)
}

fn expand_message(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let options = parse_options(input)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let kind = options.kind;

    let supertypes = if options.supertypes.is_empty() {
        quote! {}
    } else {
        let paths = &options.supertypes;
        quote! {
            fn supertypes(&self) -> ::std::vec::Vec<::cqea_core::MessageType> {
                ::std::vec![#(::cqea_core::MessageType::of::<#paths>()),*]
            }
        }
    };

    let to_json = if options.json {
        quote! {
            fn to_json(&self) -> ::std::option::Option<::cqea_core::serde_json::Value> {
                ::cqea_core::json_of(self)
            }
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        impl #impl_generics ::cqea_core::Message for #name #ty_generics #where_clause {
            fn kind(&self) -> ::cqea_core::MessageKind {
                ::cqea_core::MessageKind::#kind
            }

            #supertypes

            #to_json
        }
    })
}
