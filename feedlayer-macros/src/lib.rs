//! Procedural macros for the feedlayer project.
//!
//! `#[derive(Item)]` implements `feedlayer::item::Item` for a struct with named fields:
//!
//! ```ignore
//! use feedlayer::Item;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Item)]
//! pub struct Product {
//!     #[item(id)]
//!     pub sku: String,
//!     #[item(partition_key)]
//!     pub category: String,
//!     pub name: String,
//! }
//! ```
//!
//! Without `#[item(id)]` the field named `id` is used. The ID field must implement
//! `AsRef<str>`; the partition key field may be `AsRef<str>` or an `Option` of a string.

#[allow(unused_extern_crates)]
extern crate self as feedlayer_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Type, parse_macro_input, spanned::Spanned};

#[proc_macro_derive(Item, attributes(item))]
pub fn derive_item(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_item(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct ItemFields<'a> {
    id: Option<&'a Field>,
    partition_key: Option<&'a Field>,
}

fn expand_item(input: DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.span(), "#[derive(Item)] only supports structs"));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new(input.span(), "#[derive(Item)] requires named fields"));
    };

    let mut fields = ItemFields::default();
    for field in &named.named {
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("item")) {
            attr.parse_nested_meta(|meta| {
                let slot = if meta.path.is_ident("id") {
                    &mut fields.id
                } else if meta.path.is_ident("partition_key") {
                    &mut fields.partition_key
                } else {
                    return Err(meta.error("expected `id` or `partition_key`"));
                };

                if slot.is_some() {
                    return Err(meta.error("declared on more than one field"));
                }
                *slot = Some(field);
                Ok(())
            })?;
        }
    }

    let id_field = match fields.id {
        Some(field) => field,
        None => named
            .named
            .iter()
            .find(|field| field.ident.as_ref().is_some_and(|ident| ident == "id"))
            .ok_or_else(|| {
                syn::Error::new(input.span(), "no `id` field; mark the identifier with #[item(id)]")
            })?,
    };
    let id_ident = &id_field.ident;

    let partition_key = fields.partition_key.map(|field| {
        let ident = &field.ident;
        if is_option(&field.ty) {
            quote! {
                fn partition_key(&self) -> ::core::option::Option<&str> {
                    self.#ident.as_ref().map(|value| ::core::convert::AsRef::<str>::as_ref(value))
                }
            }
        } else {
            quote! {
                fn partition_key(&self) -> ::core::option::Option<&str> {
                    ::core::option::Option::Some(::core::convert::AsRef::<str>::as_ref(&self.#ident))
                }
            }
        }
    });

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::feedlayer::item::Item for #name #ty_generics #where_clause {
            fn id(&self) -> &str {
                ::core::convert::AsRef::<str>::as_ref(&self.#id_ident)
            }

            #partition_key
        }
    })
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Option"),
        _ => false,
    }
}
