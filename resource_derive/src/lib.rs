//! # derive `Resource` for structs and enums
//!
//! Deriving on a struct produces the all-defaults `Resource` implementation,
//! handy for resources that only exist to exercise the graph. Deriving on an
//! enum of single-field tuple variants produces an implementation that
//! forwards every callback to the wrapped resource, so a route table can
//! hold heterogeneous resources behind one concrete type.

extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{Ident, Type, Variant};

#[proc_macro_derive(Resource)]
pub fn resource_derive(input: TokenStream) -> TokenStream {
    let ast: syn::DeriveInput = syn::parse(input).unwrap();
    let name = &ast.ident;

    match &ast.data {
        syn::Data::Struct(_) => {
            let gen = quote! {
                impl<S> ::dirigible::resource::Resource<S> for #name
                where
                    S: ::dirigible::types::HasRestState,
                {
                }
            };
            gen.into()
        }
        syn::Data::Enum(enum_data) => {
            impl_resource_enum(name, &enum_data.variants).into()
        }
        _ => panic!("#[derive(Resource)] only supports struct and enum types"),
    }
}

fn impl_resource_enum(
    name: &Ident,
    variants: &Punctuated<Variant, Comma>,
) -> proc_macro2::TokenStream {
    let inner_types: Vec<&Type> = variants
        .iter()
        .map(|variant| match &variant.fields {
            syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                &fields.unnamed.first().unwrap().ty
            }
            _ => panic!(
                "#[derive(Resource)] enums need single-field tuple variants"
            ),
        })
        .collect();

    let methods = callbacks().into_iter().map(|(method, output)| {
        let method = Ident::new(method, Span::call_site());
        let arms = variants.iter().map(|variant| {
            let variant = &variant.ident;
            quote! {
                #name::#variant(ref inner) => {
                    ::dirigible::resource::Resource::<S>::#method(
                        inner, req, state,
                    )
                }
            }
        });
        quote! {
            fn #method(
                &self,
                req: &::dirigible::types::Request,
                state: &mut S,
            ) -> #output {
                match *self {
                    #(#arms)*
                }
            }
        }
    });

    quote! {
        impl<S> ::dirigible::resource::Resource<S> for #name
        where
            S: ::dirigible::types::HasRestState,
            #(#inner_types: ::dirigible::resource::Resource<S>,)*
        {
            #(#methods)*
        }
    }
}

/// Every callback of the `Resource` trait with its return type, so the enum
/// dispatch forwards overridden defaults too.
fn callbacks() -> Vec<(&'static str, proc_macro2::TokenStream)> {
    let outcome_bool = quote!(::dirigible::resource::Outcome<bool>);
    let methods = quote! {
        ::dirigible::resource::Outcome<::std::vec::Vec<::hyper::Method>>
    };
    vec![
        ("service_available", outcome_bool.clone()),
        ("known_methods", methods.clone()),
        ("uri_too_long", outcome_bool.clone()),
        ("allowed_methods", methods),
        ("malformed_request", outcome_bool.clone()),
        (
            "is_authorized",
            quote! {
                ::dirigible::resource::Outcome<
                    ::dirigible::resource::Authorized,
                >
            },
        ),
        ("forbidden", outcome_bool.clone()),
        ("valid_content_headers", outcome_bool.clone()),
        ("valid_entity_length", outcome_bool.clone()),
        ("options", quote!(::dirigible::resource::Outcome<()>)),
        (
            "content_types_provided",
            quote! {
                ::dirigible::resource::Outcome<::std::vec::Vec<(
                    ::dirigible::headers::MediaType,
                    ::dirigible::resource::Producer<S>,
                )>>
            },
        ),
        (
            "languages_provided",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::vec::Vec<::std::string::String>,
                >
            },
        ),
        (
            "charsets_provided",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::vec::Vec<::std::string::String>,
                >
            },
        ),
        (
            "variances",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::vec::Vec<::std::string::String>,
                >
            },
        ),
        ("resource_exists", outcome_bool.clone()),
        (
            "generate_etag",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::option::Option<::dirigible::resource::Etag>,
                >
            },
        ),
        (
            "last_modified",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::option::Option<::hyper::header::HttpDate>,
                >
            },
        ),
        (
            "expires",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::option::Option<::dirigible::resource::Expiry>,
                >
            },
        ),
        ("previously_existed", outcome_bool.clone()),
        (
            "moved_permanently",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::option::Option<::std::string::String>,
                >
            },
        ),
        (
            "moved_temporarily",
            quote! {
                ::dirigible::resource::Outcome<
                    ::std::option::Option<::std::string::String>,
                >
            },
        ),
        ("multiple_choices", outcome_bool.clone()),
        (
            "content_types_accepted",
            quote! {
                ::dirigible::resource::Outcome<::std::vec::Vec<(
                    ::dirigible::headers::MediaType,
                    ::dirigible::resource::Acceptor<S>,
                )>>
            },
        ),
        ("allow_missing_post", outcome_bool.clone()),
        ("delete_resource", outcome_bool.clone()),
        ("delete_completed", outcome_bool.clone()),
        ("is_conflict", outcome_bool),
    ]
}
