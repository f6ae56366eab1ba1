//! Rust record rendering: the inverse of the declaration parser.
//!
//! Emits annotated structs that, parsed and generated back, reproduce the
//! realm's signatures. Single-column constraints ride on field annotations;
//! everything else lands on a sentinel field.

use std::fmt::Write;

use heck::{ToSnakeCase, ToUpperCamelCase};

use crate::schema::{ColumnSchema, FkAction, Realm, TableState};

pub fn render(realm: &Realm) -> String {
    let mut out = String::new();
    out.push_str("// Generated from live schema introspection.\n");
    for table in realm.tables.values() {
        out.push('\n');
        render_table(&mut out, table);
    }
    out
}

fn render_table(out: &mut String, table: &TableState) {
    let table_name = &table.schema.name;
    let struct_name = singularize(table_name).to_upper_camel_case();

    // Single-column total unique indexes become field-level `unique`
    // flags; whatever remains goes on the sentinel.
    let mut sentinel_entries: Vec<String> = Vec::new();
    let mut field_unique: Vec<&str> = Vec::new();
    for idx in &table.indexes {
        if idx.is_primary {
            continue;
        }
        if idx.is_unique && idx.columns.len() == 1 && !idx.is_partial() {
            field_unique.push(idx.columns[0].as_str());
            continue;
        }
        let kind = if idx.is_unique { "unique" } else { "index" };
        let mut entry = format!("{kind}:{},{}", idx.name, idx.columns.join(","));
        if idx.is_partial() {
            let _ = write!(entry, " where:{}", idx.where_clause);
        }
        sentinel_entries.push(entry);
    }

    let derived = derive_table_name(&struct_name);
    if &derived != table_name {
        sentinel_entries.insert(0, format!("table:{table_name}"));
    }

    let _ = writeln!(out, "pub struct {struct_name} {{");
    if !sentinel_entries.is_empty() {
        let _ = writeln!(out, "    #[dbdef(\"{}\")]", sentinel_entries.join("; "));
        let _ = writeln!(out, "    _table: (),");
    }

    for col in &table.schema.columns {
        let tags = field_tags(table, col, &field_unique);
        let _ = writeln!(out, "    #[dbdef(\"{}\")]", tags.join("; "));
        let _ = writeln!(
            out,
            "    pub {}: {},",
            field_ident(&col.name),
            rust_type(col)
        );
    }
    let _ = writeln!(out, "}}");
}

fn field_tags(table: &TableState, col: &ColumnSchema, field_unique: &[&str]) -> Vec<String> {
    let is_primary = table.schema.primary_key.contains(&col.name);
    let is_serial = col
        .default
        .as_deref()
        .is_some_and(|d| d.contains("nextval("));

    let mut tags = vec![format!("type:{}", declared_type(col, is_serial))];
    if is_primary {
        tags.push("primary_key".to_string());
    }
    if field_unique.contains(&col.name.as_str()) {
        tags.push("unique".to_string());
    }
    if col.not_null && !is_primary {
        tags.push("not_null".to_string());
    }
    if !is_serial && let Some(ref default) = col.default {
        tags.push(format!("default:{default}"));
    }

    if let Some(fk) = table
        .foreign_keys
        .iter()
        .find(|fk| fk.columns.len() == 1 && fk.columns[0] == col.name)
    {
        tags.push(format!(
            "foreign_key:{}.{}",
            fk.referenced_table, fk.referenced_columns[0]
        ));
        if fk.on_delete != FkAction::NoAction {
            tags.push(format!("on_delete:{}", fk.on_delete));
        }
        if fk.on_update != FkAction::NoAction {
            tags.push(format!("on_update:{}", fk.on_update));
        }
    }
    tags
}

/// Type as it should be declared: serial spellings for sequence-backed
/// columns so the generated default round-trips.
fn declared_type(col: &ColumnSchema, is_serial: bool) -> String {
    if is_serial {
        return match col.sql_type.as_str() {
            "smallint" => "smallserial".to_string(),
            "bigint" => "bigserial".to_string(),
            _ => "serial".to_string(),
        };
    }
    col.sql_type.clone()
}

fn rust_type(col: &ColumnSchema) -> String {
    let base = match col.sql_type.as_str() {
        "smallint" => "i16",
        "integer" => "i32",
        "bigint" => "i64",
        "real" => "f32",
        "double precision" => "f64",
        "boolean" => "bool",
        "bytea" => "Vec<u8>",
        "uuid" => "Uuid",
        "date" => "NaiveDate",
        "time without time zone" => "NaiveTime",
        "timestamp without time zone" => "NaiveDateTime",
        "timestamp with time zone" => "DateTime<Utc>",
        "numeric" => "Decimal",
        "json" | "jsonb" => "Value",
        "text[]" => "Vec<String>",
        t if t.starts_with("numeric(") => "Decimal",
        _ => "String",
    };
    if col.not_null {
        base.to_string()
    } else {
        format!("Option<{base}>")
    }
}

/// Raw identifiers for column names that collide with Rust keywords.
fn field_ident(name: &str) -> String {
    const KEYWORDS: &[&str] = &[
        "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else",
        "enum", "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod",
        "move", "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait",
        "true", "type", "unsafe", "use", "where", "while",
    ];
    let snake = name.to_snake_case();
    if KEYWORDS.contains(&snake.as_str()) {
        format!("r#{snake}")
    } else {
        snake
    }
}

fn singularize(table_name: &str) -> String {
    if table_name.len() > 1 && table_name.ends_with('s') && !table_name.ends_with("ss") {
        table_name[..table_name.len() - 1].to_string()
    } else {
        table_name.to_string()
    }
}

/// The table name the declaration parser would derive for this struct,
/// used to decide whether an explicit `table:` tag is needed.
fn derive_table_name(struct_name: &str) -> String {
    let snake = struct_name.to_snake_case();
    if snake.ends_with('s') {
        snake
    } else {
        format!("{snake}s")
    }
}
