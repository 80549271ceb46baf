//! # Quarry Procedural Macros
//!
//! Derives for the `quarry` crate. This crate is not meant to be used
//! directly; `quarry` re-exports both macros:
//!
//! ```rust,ignore
//! use quarry::{FromRow, Model};
//!
//! #[derive(Model, FromRow, Clone)]
//! #[orm(table = "users")]
//! struct User {
//!     #[orm(primary_key, skip)]
//!     id: i64,
//!     name: String,
//!     #[orm(column = "email_address")]
//!     email: Option<String>,
//!     #[orm(soft_delete)]
//!     deleted_at: Option<String>,
//! }
//! ```
//!
//! ## Supported Attributes
//!
//! ### Table Name (struct)
//! ```rust,ignore
//! #[orm(table = "users")]
//! ```
//! Defaults to the struct name in snake_case.
//!
//! ### Primary Key
//! ```rust,ignore
//! #[orm(primary_key)]
//! id: i64,
//! ```
//! Used by `find` and `insert_get_id`. Defaults to `id`.
//!
//! ### Soft Delete
//! ```rust,ignore
//! #[orm(soft_delete)]
//! deleted_at: Option<String>,
//! ```
//! The column `restore` sets back to NULL.
//!
//! ### Column Rename
//! ```rust,ignore
//! #[orm(column = "email_address")]
//! email: String,
//! ```
//!
//! ### Skip on Insert
//! ```rust,ignore
//! #[orm(skip)]
//! id: i64,
//! ```
//! Left out of `to_row`, so the database fills it in. Still read by `FromRow`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attributes;
mod derive_from_row;
mod derive_model;

/// Derives `quarry::Model`: table metadata plus `to_row` for inserts.
///
/// Every non-skipped field must be `Clone` and convertible into
/// `quarry::Value`.
#[proc_macro_derive(Model, attributes(orm))]
pub fn model_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    derive_model::expand(ast).unwrap_or_else(syn::Error::into_compile_error).into()
}

/// Derives `quarry::FromRow`, reading each field with `Row::try_get`.
///
/// Every field type must implement `quarry::FromValue`.
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn from_row_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    derive_from_row::expand(ast).unwrap_or_else(syn::Error::into_compile_error).into()
}
