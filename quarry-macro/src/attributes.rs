//! # ORM Attribute Parsing
//!
//! Reads `#[orm(...)]` attributes shared by both derives.

use heck::ToSnakeCase;
use syn::{Attribute, Data, DeriveInput, Field, Fields, Ident, LitStr, Type};

/// Struct-level settings.
pub struct ModelAttrs {
    pub table: String,
}

/// Field-level settings.
pub struct FieldAttrs<'a> {
    pub ident: &'a Ident,
    pub ty: &'a Type,
    pub column: String,
    pub primary_key: bool,
    pub soft_delete: bool,
    pub skip: bool,
}

fn orm_attributes(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|attr| attr.path().is_ident("orm"))
}

/// `#[orm(table = "...")]`, defaulting to the snake_case struct name.
pub fn parse_model(input: &DeriveInput) -> syn::Result<ModelAttrs> {
    let mut table = input.ident.to_string().to_snake_case();

    for attr in orm_attributes(&input.attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = value.value();
                Ok(())
            } else {
                Err(meta.error("unsupported struct attribute; expected `table = \"...\"`"))
            }
        })?;
    }

    Ok(ModelAttrs { table })
}

/// The named fields of a struct, with their `#[orm(...)]` settings.
pub fn parse_fields(input: &DeriveInput) -> syn::Result<Vec<FieldAttrs<'_>>> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => return Err(syn::Error::new_spanned(&input.ident, "only structs with named fields are supported")),
        },
        _ => return Err(syn::Error::new_spanned(&input.ident, "only structs are supported")),
    };

    fields.iter().map(parse_field).collect()
}

fn parse_field(field: &Field) -> syn::Result<FieldAttrs<'_>> {
    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "only named fields are supported"))?;

    let raw_name = ident.to_string();
    let mut parsed = FieldAttrs {
        ident,
        ty: &field.ty,
        column: raw_name.strip_prefix("r#").unwrap_or(&raw_name).to_string(),
        primary_key: false,
        soft_delete: false,
        skip: false,
    };

    for attr in orm_attributes(&field.attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                parsed.primary_key = true;
            } else if meta.path.is_ident("soft_delete") {
                parsed.soft_delete = true;
            } else if meta.path.is_ident("skip") {
                parsed.skip = true;
            } else if meta.path.is_ident("column") {
                let value: LitStr = meta.value()?.parse()?;
                parsed.column = value.value();
            } else {
                return Err(meta.error("unsupported orm attribute"));
            }
            Ok(())
        })?;
    }

    Ok(parsed)
}
