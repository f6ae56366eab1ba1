//! Declared record types.
//!
//! A [`TableDecl`] is the raw, annotation-level view of one struct: field
//! names, column names and unparsed tag sets. The generator in
//! [`crate::schema::generate`] turns these into comparable schema shapes.

pub mod parser;

use std::path::PathBuf;

use crate::tag::TagSet;

/// One annotated struct, as read from source.
#[derive(Debug, Clone)]
pub struct TableDecl {
    pub struct_name: String,
    pub table_name: String,
    /// Schema-relevant fields, in declaration order. Sentinel fields and
    /// fields renamed to `-` are already filtered out.
    pub fields: Vec<FieldDecl>,
    /// Concatenated annotations of all sentinel fields, in declaration
    /// order. Keys may repeat (`index:`, `unique:`).
    pub table_tags: TagSet,
    pub source_file: PathBuf,
}

impl TableDecl {
    pub fn field(&self, db_name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.db_name == db_name)
    }

    /// `Struct.field` path for error reporting.
    pub fn field_path(&self, field: &str) -> String {
        format!("{}.{}", self.struct_name, field)
    }
}

/// One annotated struct field.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    /// Rust identifier.
    pub name: String,
    /// Column name: explicit `#[db("...")]` value or the snake-cased
    /// identifier.
    pub db_name: String,
    /// Rust type, verbatim. Consulted for SQL type inference when the
    /// annotation has no `type:` key, and by the record renderer.
    pub rust_type: String,
    /// Parsed `#[dbdef("...")]` tags.
    pub dbdef: TagSet,
}

impl FieldDecl {
    /// True when the declared Rust type is `Option<...>`.
    pub fn is_option(&self) -> bool {
        let t = self.rust_type.trim();
        t.starts_with("Option<") || t.starts_with("core::option::Option<")
            || t.starts_with("std::option::Option<")
    }

    /// Inner type of `Option<...>`, or the type itself.
    pub fn base_rust_type(&self) -> &str {
        let t = self.rust_type.trim();
        for prefix in ["Option<", "core::option::Option<", "std::option::Option<"] {
            if let Some(rest) = t.strip_prefix(prefix) {
                return rest.strip_suffix('>').unwrap_or(rest).trim();
            }
        }
        t
    }
}
