//! # FromRow Derive Module
//!
//! Expands `#[derive(FromRow)]`: every field is read from the column of the
//! same name (or its `#[orm(column = "...")]` override) through
//! `quarry::Row::try_get`, so any `FromValue` type works, `Option<T>` included.

use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;

use crate::attributes::parse_fields;

pub fn expand(ast: DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let fields = parse_fields(&ast)?;
    let extractions = fields.iter().map(|f| {
        let ident = f.ident;
        let ty = f.ty;
        let column = &f.column;
        quote! {
            #ident: row.try_get::<#ty>(#column)?,
        }
    });

    Ok(quote! {
        impl #impl_generics quarry::FromRow for #struct_name #ty_generics #where_clause {
            fn from_row(row: &quarry::Row) -> ::std::result::Result<Self, quarry::Error> {
                ::std::result::Result::Ok(Self {
                    #(#extractions)*
                })
            }
        }
    })
}
