//! Abstract schema model.
//!
//! Declared record types (via the generator) and the live catalog (via the
//! introspector) both reduce to the types in this module, so the diff engine
//! compares one shape regardless of origin. Index and foreign-key identity
//! is their canonical signature, never their name.

pub mod generate;
pub mod signature;

use indexmap::IndexMap;
use serde::Serialize;
use strum_macros::{Display, EnumString};

/// Referential action on a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum FkAction {
    #[default]
    #[strum(to_string = "NO ACTION", serialize = "no action", serialize = "no_action")]
    NoAction,
    #[strum(to_string = "RESTRICT", serialize = "restrict")]
    Restrict,
    #[strum(to_string = "CASCADE", serialize = "cascade")]
    Cascade,
    #[strum(to_string = "SET NULL", serialize = "set null", serialize = "set_null")]
    SetNull,
    #[strum(to_string = "SET DEFAULT", serialize = "set default", serialize = "set_default")]
    SetDefault,
}

impl FkAction {
    /// Map the `pg_constraint.confdeltype`/`confupdtype` action character.
    pub fn from_catalog_char(c: char) -> Self {
        match c {
            'r' => FkAction::Restrict,
            'c' => FkAction::Cascade,
            'n' => FkAction::SetNull,
            'd' => FkAction::SetDefault,
            _ => FkAction::NoAction,
        }
    }
}

impl Serialize for FkAction {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

/// A table-scoped index or the index backing a unique/primary constraint.
///
/// `name` is advisory: two indexes with equal signatures are the same index
/// no matter what they are called.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDef {
    pub name: String,
    pub table_name: String,
    /// Key columns (or deparsed expressions) in index order.
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub method: String,
    /// Partial-index predicate; empty when the index is total.
    pub where_clause: String,
    pub signature: String,
}

impl IndexDef {
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<String>,
        is_unique: bool,
        is_primary: bool,
        method: &str,
        where_clause: &str,
    ) -> Self {
        let table_name = table_name.into();
        let method = signature::normalize_method(method);
        let where_clause = signature::normalize_where(where_clause);
        let signature = signature::index_signature(
            &table_name,
            &columns,
            is_unique,
            is_primary,
            &method,
            &where_clause,
        );
        Self {
            name: name.into(),
            table_name,
            columns,
            is_unique,
            is_primary,
            method,
            where_clause,
            signature,
        }
    }

    /// True when dropping this index can lose an integrity guarantee.
    pub fn drop_is_destructive(&self) -> bool {
        self.is_unique || self.is_primary
    }

    pub fn is_partial(&self) -> bool {
        !self.where_clause.is_empty()
    }
}

/// A foreign-key constraint. Identity is the signature; `name` is advisory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: FkAction,
    pub on_update: FkAction,
    pub signature: String,
}

impl ForeignKeyDef {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<String>,
        referenced_table: impl Into<String>,
        referenced_columns: Vec<String>,
        on_delete: FkAction,
        on_update: FkAction,
    ) -> Self {
        let table_name = table_name.into();
        let referenced_table = referenced_table.into();
        let signature = signature::fk_signature(
            &table_name,
            &columns,
            &referenced_table,
            &referenced_columns,
            on_delete,
            on_update,
        );
        Self {
            name: name.into(),
            table_name,
            columns,
            referenced_table,
            referenced_columns,
            on_delete,
            on_update,
            signature,
        }
    }
}

/// A column in its reduced, comparable form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Canonical SQL type (`normalize_sql_type` applied).
    pub sql_type: String,
    pub not_null: bool,
    pub default: Option<String>,
}

/// A table shape: ordered columns plus the primary-key column list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Render the `CREATE TABLE` statement for this shape.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.columns.len() + 1);
        for col in &self.columns {
            parts.push(column_sql(col));
        }
        if !self.primary_key.is_empty() {
            parts.push(format!(
                "CONSTRAINT {}_pkey PRIMARY KEY ({})",
                self.name,
                self.primary_key.join(", ")
            ));
        }
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.name,
            parts.join(",\n    ")
        )
    }
}

/// Render one column clause of a CREATE TABLE / ADD COLUMN statement.
///
/// Sequence-backed integer columns render as their serial spelling so the
/// backing sequence is created with the table; the comparable model keeps
/// the expanded `nextval` default.
pub fn column_sql(col: &ColumnSchema) -> String {
    if col.default.as_deref().is_some_and(|d| d.contains("nextval(")) {
        let serial = match col.sql_type.as_str() {
            "smallint" => Some("smallserial"),
            "integer" => Some("serial"),
            "bigint" => Some("bigserial"),
            _ => None,
        };
        if let Some(serial) = serial {
            let mut out = format!("{} {serial}", col.name);
            if col.not_null {
                out.push_str(" NOT NULL");
            }
            return out;
        }
    }
    let mut out = format!("{} {}", col.name, col.sql_type);
    if col.not_null {
        out.push_str(" NOT NULL");
    }
    if let Some(ref default) = col.default {
        out.push_str(" DEFAULT ");
        out.push_str(default);
    }
    out
}

/// Everything visible under one database connection, reduced to the
/// comparable model. Table order is preserved (insertion order for
/// declarations, name order for introspection) so rendered output is
/// stable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Realm {
    pub tables: IndexMap<String, TableState>,
    /// Reported only; the differ does not manage these.
    pub views: Vec<String>,
    pub sequences: Vec<String>,
    pub enums: Vec<EnumType>,
}

/// One table with its attached index and foreign-key definitions.
#[derive(Debug, Clone, Serialize)]
pub struct TableState {
    pub schema: TableSchema,
    pub indexes: Vec<IndexDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl Realm {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn insert(&mut self, state: TableState) {
        self.tables.insert(state.schema.name.clone(), state);
    }

    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.tables.get(name)
    }

    /// All index definitions across the realm.
    pub fn all_indexes(&self) -> impl Iterator<Item = &IndexDef> {
        self.tables.values().flat_map(|t| t.indexes.iter())
    }

    /// All foreign keys across the realm.
    pub fn all_foreign_keys(&self) -> impl Iterator<Item = &ForeignKeyDef> {
        self.tables.values().flat_map(|t| t.foreign_keys.iter())
    }
}

/// Canonicalize a SQL type spelling so declared and introspected types
/// compare equal. Postgres reports `information_schema`-style names
/// (`character varying(80)`, `timestamp with time zone`); declarations tend
/// to use the short aliases.
pub fn normalize_sql_type(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let (base, modifier) = match lower.find('(') {
        Some(pos) => (lower[..pos].trim_end().to_string(), &lower[pos..]),
        None => (lower.clone(), ""),
    };
    let canonical = match base.as_str() {
        "int2" | "smallint" => "smallint",
        "int" | "int4" | "integer" => "integer",
        "int8" | "bigint" => "bigint",
        "smallserial" | "serial2" => "smallint",
        "serial" | "serial4" => "integer",
        "bigserial" | "serial8" => "bigint",
        "float4" | "real" => "real",
        "float8" | "double precision" => "double precision",
        "decimal" | "numeric" => "numeric",
        "bool" | "boolean" => "boolean",
        "varchar" | "character varying" => "character varying",
        "char" | "bpchar" | "character" => "character",
        "timestamptz" | "timestamp with time zone" => "timestamp with time zone",
        "timestamp" | "timestamp without time zone" => "timestamp without time zone",
        "timetz" | "time with time zone" => "time with time zone",
        "time" | "time without time zone" => "time without time zone",
        other => other,
    };
    format!("{canonical}{modifier}")
}

/// True for `serial`-family declared types, which expand to an integer
/// column plus a sequence-backed default.
pub fn is_serial_type(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "smallserial" | "serial2" | "serial" | "serial4" | "bigserial" | "serial8"
    )
}

/// Strip the `::type` cast Postgres appends to stored defaults so
/// `'active'::text` compares equal to the declared `'active'`. The cut is
/// made at the first `::` outside quoted literals; the result is used for
/// comparison only, never re-rendered as SQL.
pub fn clean_default(raw: &str) -> String {
    let s = raw.trim();
    let mut in_quote = false;
    let mut prev_colon = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                prev_colon = false;
            }
            ':' if !in_quote => {
                if prev_colon {
                    return s[..i - 1].trim_end().to_string();
                }
                prev_colon = true;
            }
            _ => prev_colon = false,
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fk_action_round_trip() {
        use std::str::FromStr;
        assert_eq!(FkAction::from_str("cascade").unwrap(), FkAction::Cascade);
        assert_eq!(FkAction::from_str("SET NULL").unwrap(), FkAction::SetNull);
        assert_eq!(FkAction::from_str("set_null").unwrap(), FkAction::SetNull);
        assert_eq!(FkAction::Cascade.to_string(), "CASCADE");
        assert_eq!(FkAction::NoAction.to_string(), "NO ACTION");
    }

    #[test]
    fn test_fk_action_from_catalog_char() {
        assert_eq!(FkAction::from_catalog_char('a'), FkAction::NoAction);
        assert_eq!(FkAction::from_catalog_char('r'), FkAction::Restrict);
        assert_eq!(FkAction::from_catalog_char('c'), FkAction::Cascade);
        assert_eq!(FkAction::from_catalog_char('n'), FkAction::SetNull);
        assert_eq!(FkAction::from_catalog_char('d'), FkAction::SetDefault);
    }

    #[test]
    fn test_normalize_sql_type_aliases() {
        assert_eq!(normalize_sql_type("int8"), "bigint");
        assert_eq!(normalize_sql_type("BIGINT"), "bigint");
        assert_eq!(normalize_sql_type("varchar(80)"), "character varying(80)");
        assert_eq!(normalize_sql_type("timestamptz"), "timestamp with time zone");
        assert_eq!(normalize_sql_type("uuid"), "uuid");
        assert_eq!(normalize_sql_type("serial"), "integer");
    }

    #[test]
    fn test_clean_default() {
        assert_eq!(clean_default("'active'::text"), "'active'");
        assert_eq!(clean_default("0::bigint"), "0");
        assert_eq!(clean_default("now()"), "now()");
        // A `::` inside a quoted literal is not a cast.
        assert_eq!(clean_default("'a::b'"), "'a::b'");
        assert_eq!(clean_default("'a::b'::text"), "'a::b'");
    }

    #[test]
    fn test_create_sql_shapes() {
        let table = TableSchema {
            name: "users".to_string(),
            columns: vec![
                ColumnSchema {
                    name: "id".to_string(),
                    sql_type: "bigint".to_string(),
                    not_null: true,
                    default: None,
                },
                ColumnSchema {
                    name: "email".to_string(),
                    sql_type: "text".to_string(),
                    not_null: true,
                    default: None,
                },
                ColumnSchema {
                    name: "active".to_string(),
                    sql_type: "boolean".to_string(),
                    not_null: false,
                    default: Some("true".to_string()),
                },
            ],
            primary_key: vec!["id".to_string()],
        };
        let sql = table.create_sql();
        assert!(sql.starts_with("CREATE TABLE users (\n"));
        assert!(sql.contains("id bigint NOT NULL"));
        assert!(sql.contains("active boolean DEFAULT true"));
        assert!(sql.contains("CONSTRAINT users_pkey PRIMARY KEY (id)"));
    }

    #[test]
    fn test_column_sql_serial_spelling() {
        let col = ColumnSchema {
            name: "id".to_string(),
            sql_type: "bigint".to_string(),
            not_null: true,
            default: Some("nextval('users_id_seq'::regclass)".to_string()),
        };
        assert_eq!(column_sql(&col), "id bigserial NOT NULL");

        let plain = ColumnSchema {
            name: "n".to_string(),
            sql_type: "integer".to_string(),
            not_null: false,
            default: Some("0".to_string()),
        };
        assert_eq!(column_sql(&plain), "n integer DEFAULT 0");
    }

    #[test]
    fn test_index_signature_ignores_name() {
        let a = IndexDef::new("idx_users_email", "users", vec!["email".into()], false, false, "btree", "");
        let b = IndexDef::new("users_email_key", "users", vec!["email".into()], false, false, "", "");
        assert_eq!(a.signature, b.signature);
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn test_unique_index_signature_differs_from_plain() {
        let plain = IndexDef::new("i", "users", vec!["email".into()], false, false, "btree", "");
        let unique = IndexDef::new("i", "users", vec!["email".into()], true, false, "btree", "");
        assert_ne!(plain.signature, unique.signature);
    }
}
