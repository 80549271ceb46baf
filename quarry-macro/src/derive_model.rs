//! # Model Derive Macro Implementation
//!
//! Expands `#[derive(Model)]` into an implementation of `quarry::Model`.
//!
//! ## Example
//!
//! ```rust,ignore
//! // Input struct:
//! #[derive(Model)]
//! #[orm(table = "posts")]
//! struct Post {
//!     #[orm(primary_key, skip)]
//!     id: i64,
//!     title: String,
//!     #[orm(soft_delete)]
//!     deleted_at: Option<String>,
//! }
//!
//! // Generated implementation:
//! impl quarry::Model for Post {
//!     fn table_name() -> &'static str { "posts" }
//!     fn primary_key() -> &'static str { "id" }
//!     fn soft_delete_column() -> Option<&'static str> { Some("deleted_at") }
//!     fn to_row(&self) -> quarry::Row { /* title, deleted_at */ }
//! }
//! ```

use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;

use crate::attributes::{parse_fields, parse_model};

/// Expands the `#[derive(Model)]` macro.
///
/// Fails (as a compile error on the offending item) when the input is not a
/// struct with named fields, an `#[orm(...)]` attribute is unknown, or more
/// than one field claims `primary_key` or `soft_delete`.
pub fn expand(ast: DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let model = parse_model(&ast)?;
    let fields = parse_fields(&ast)?;

    let mut primary_keys = fields.iter().filter(|f| f.primary_key);
    let primary_key = match (primary_keys.next(), primary_keys.next()) {
        (_, Some(second)) => {
            return Err(syn::Error::new_spanned(second.ident, "only one field can be the primary key"));
        }
        (Some(field), None) => field.column.clone(),
        (None, None) => "id".to_string(),
    };

    let mut soft_deletes = fields.iter().filter(|f| f.soft_delete);
    let soft_delete = match (soft_deletes.next(), soft_deletes.next()) {
        (_, Some(second)) => {
            return Err(syn::Error::new_spanned(second.ident, "only one field can be the soft-delete column"));
        }
        (Some(field), None) => {
            let column = &field.column;
            quote! { Some(#column) }
        }
        (None, None) => quote! { None },
    };

    // Skipped fields (typically auto-increment keys) never reach INSERTs.
    let row_sets = fields.iter().filter(|f| !f.skip).map(|f| {
        let ident = f.ident;
        let column = &f.column;
        quote! {
            row.set(#column, ::std::clone::Clone::clone(&self.#ident));
        }
    });

    let table = &model.table;

    Ok(quote! {
        impl #impl_generics quarry::Model for #struct_name #ty_generics #where_clause {
            fn table_name() -> &'static str {
                #table
            }

            fn primary_key() -> &'static str {
                #primary_key
            }

            fn soft_delete_column() -> ::std::option::Option<&'static str> {
                #soft_delete
            }

            fn to_row(&self) -> quarry::Row {
                let mut row = quarry::Row::new();
                #(#row_sets)*
                row
            }
        }
    })
}
