//! Declarative generator: [`TableDecl`] values into comparable schema
//! shapes.
//!
//! Signatures are computed at construction, so generated definitions are
//! byte-comparable with introspected ones. Definitions are de-duplicated by
//! signature: when a field-level `unique` and a table-level `unique:` entry
//! describe the same constraint, the first one wins.

use std::collections::HashSet;
use std::str::FromStr;

use crate::decl::{FieldDecl, TableDecl};
use crate::error::{Error, Result};
use crate::schema::{
    ColumnSchema, FkAction, ForeignKeyDef, IndexDef, Realm, TableSchema, TableState,
    is_serial_type, normalize_sql_type,
};

/// Generate the full realm described by a set of declarations, in
/// declaration order.
pub fn declared_realm(decls: &[TableDecl]) -> Result<Realm> {
    let mut realm = Realm::default();
    for decl in decls {
        realm.insert(generate_table(decl)?);
    }
    Ok(realm)
}

/// Generate one table's schema, indexes and foreign keys.
pub fn generate_table(decl: &TableDecl) -> Result<TableState> {
    let table = &decl.table_name;

    let mut columns = Vec::with_capacity(decl.fields.len());
    let mut primary_columns: Vec<String> = Vec::new();
    let mut indexes: Vec<IndexDef> = Vec::new();
    let mut foreign_keys: Vec<ForeignKeyDef> = Vec::new();

    for field in &decl.fields {
        let is_primary = field.dbdef.contains("primary_key");
        let declared_type = field.dbdef.first("type").map(str::to_string);
        let raw_type = match declared_type {
            Some(t) if !t.is_empty() => t,
            _ => infer_sql_type(field).ok_or_else(|| {
                Error::decl(
                    decl.field_path(&field.name),
                    format!("no type: tag and no mapping for Rust type `{}`", field.rust_type),
                )
            })?,
        };

        let default = match field.dbdef.first("default") {
            Some(v) if !v.is_empty() => Some(v.to_string()),
            _ if is_serial_type(&raw_type) => {
                Some(format!("nextval('{table}_{}_seq'::regclass)", field.db_name))
            }
            _ => None,
        };

        columns.push(ColumnSchema {
            name: field.db_name.clone(),
            sql_type: normalize_sql_type(&raw_type),
            not_null: is_primary || field.dbdef.contains("not_null"),
            default,
        });

        if is_primary {
            primary_columns.push(field.db_name.clone());
        } else if field.dbdef.contains("unique") {
            indexes.push(IndexDef::new(
                format!("{table}_{}_key", field.db_name),
                table,
                vec![field.db_name.clone()],
                true,
                false,
                "btree",
                "",
            ));
        }

        if let Some(target) = field.dbdef.first("foreign_key") {
            foreign_keys.push(field_foreign_key(decl, field, target)?);
        }
    }

    if !primary_columns.is_empty() {
        // Composite primaries collapse into the table's single primary index.
        indexes.insert(
            0,
            IndexDef::new(
                format!("{table}_pkey"),
                table,
                primary_columns.clone(),
                true,
                true,
                "btree",
                "",
            ),
        );
    }

    for (key, value) in decl.table_tags.iter() {
        let unique = match key {
            "index" => false,
            "unique" => true,
            _ => continue,
        };
        let (name, cols, where_clause) = parse_index_spec(decl, key, value)?;
        for col in &cols {
            if !columns.iter().any(|c| &c.name == col) {
                return Err(Error::decl(
                    decl.field_path(&format!("({key})")),
                    format!("index `{name}` references unknown column `{col}`"),
                ));
            }
        }
        indexes.push(IndexDef::new(name, table, cols, unique, false, "btree", &where_clause));
    }

    dedup_by_signature(&mut indexes);
    dedup_fks_by_signature(&mut foreign_keys);

    Ok(TableState {
        schema: TableSchema {
            name: table.clone(),
            columns,
            primary_key: primary_columns,
        },
        indexes,
        foreign_keys,
    })
}

fn field_foreign_key(
    decl: &TableDecl,
    field: &FieldDecl,
    target: &str,
) -> Result<ForeignKeyDef> {
    let path = || decl.field_path(&field.name);
    let (ref_table, ref_column) = target.split_once('.').ok_or_else(|| {
        Error::decl(path(), format!("foreign_key value `{target}` must be `table.column`"))
    })?;
    let (ref_table, ref_column) = (ref_table.trim(), ref_column.trim());
    if ref_table.is_empty() || ref_column.is_empty() {
        return Err(Error::decl(
            path(),
            format!("foreign_key value `{target}` must name both table and column"),
        ));
    }

    let on_delete = parse_action(decl, field, "on_delete")?;
    let on_update = parse_action(decl, field, "on_update")?;

    Ok(ForeignKeyDef::new(
        format!("fk_{}_{}", decl.table_name, field.db_name),
        &decl.table_name,
        vec![field.db_name.clone()],
        ref_table,
        vec![ref_column.to_string()],
        on_delete,
        on_update,
    ))
}

fn parse_action(decl: &TableDecl, field: &FieldDecl, key: &str) -> Result<FkAction> {
    match field.dbdef.first(key) {
        None | Some("") => Ok(FkAction::NoAction),
        Some(raw) => FkAction::from_str(raw.trim()).map_err(|_| {
            Error::decl(
                decl.field_path(&field.name),
                format!("unknown {key} action `{raw}`"),
            )
        }),
    }
}

/// Parse a table-level `index:`/`unique:` value:
/// `<name>,<c1>,<c2>,…[ where:<predicate>]`.
fn parse_index_spec(
    decl: &TableDecl,
    key: &str,
    value: &str,
) -> Result<(String, Vec<String>, String)> {
    let path = || decl.field_path(&format!("({key})"));
    let (list, where_clause) = match value.find(" where:") {
        Some(pos) => (
            &value[..pos],
            value[pos + " where:".len()..].trim().to_string(),
        ),
        None => (value, String::new()),
    };

    let mut parts = list.split(',').map(str::trim);
    let name = parts.next().unwrap_or("").to_string();
    let cols: Vec<String> = parts
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if name.is_empty() {
        return Err(Error::decl(path(), format!("{key}: entry is missing a name")));
    }
    if cols.is_empty() {
        return Err(Error::decl(
            path(),
            format!("{key}:{name} lists no columns"),
        ));
    }
    Ok((name, cols, where_clause))
}

fn dedup_by_signature(indexes: &mut Vec<IndexDef>) {
    let mut seen = HashSet::new();
    indexes.retain(|idx| seen.insert(idx.signature.clone()));
}

fn dedup_fks_by_signature(fks: &mut Vec<ForeignKeyDef>) {
    let mut seen = HashSet::new();
    fks.retain(|fk| seen.insert(fk.signature.clone()));
}

/// Map a Rust field type to its SQL column type. `None` when there is no
/// sensible mapping and the declaration must carry an explicit `type:`.
fn infer_sql_type(field: &FieldDecl) -> Option<String> {
    let base = field.base_rust_type();
    let stripped = base.rsplit("::").next().unwrap_or(base).trim();
    let ty = match stripped {
        "i16" | "u16" => "smallint",
        "i32" | "u32" => "integer",
        "i64" | "u64" | "isize" | "usize" => "bigint",
        "f32" => "real",
        "f64" => "double precision",
        "bool" => "boolean",
        "String" | "str" | "&str" => "text",
        "Uuid" => "uuid",
        "NaiveDate" => "date",
        "NaiveTime" => "time without time zone",
        "NaiveDateTime" => "timestamp without time zone",
        "Decimal" => "numeric",
        "Value" => "jsonb",
        _ => {
            if base == "Vec<u8>" {
                "bytea"
            } else if base == "Vec<String>" {
                "text[]"
            } else if base.starts_with("DateTime<") || stripped.starts_with("DateTime<") {
                "timestamp with time zone"
            } else {
                return None;
            }
        }
    };
    Some(ty.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::parser::parse_source;
    use std::path::Path;

    fn decl_for(src: &str) -> TableDecl {
        parse_source(src, Path::new("test.rs")).unwrap().remove(0)
    }

    #[test]
    fn test_primary_key_index() {
        let state = generate_table(&decl_for(
            r#"
            pub struct User {
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
            }
            "#,
        ))
        .unwrap();
        assert_eq!(state.indexes.len(), 1);
        let pk = &state.indexes[0];
        assert!(pk.is_primary && pk.is_unique);
        assert_eq!(pk.name, "users_pkey");
        assert_eq!(pk.columns, vec!["id"]);
        assert_eq!(state.schema.primary_key, vec!["id"]);
        assert!(state.schema.columns[0].not_null);
    }

    #[test]
    fn test_composite_primary_collapses_to_one_index() {
        let state = generate_table(&decl_for(
            r#"
            pub struct Membership {
                #[dbdef("type:bigint; primary_key")]
                pub team_id: i64,
                #[dbdef("type:bigint; primary_key")]
                pub user_id: i64,
            }
            "#,
        ))
        .unwrap();
        let primaries: Vec<_> = state.indexes.iter().filter(|i| i.is_primary).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].columns, vec!["team_id", "user_id"]);
    }

    #[test]
    fn test_field_unique_index() {
        let state = generate_table(&decl_for(
            r#"
            pub struct User {
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
                #[dbdef("type:text; unique")]
                pub email: String,
            }
            "#,
        ))
        .unwrap();
        let unique = state.indexes.iter().find(|i| i.is_unique && !i.is_primary).unwrap();
        assert_eq!(unique.columns, vec!["email"]);
        assert_eq!(unique.method, "btree");
    }

    #[test]
    fn test_foreign_key_with_actions() {
        let state = generate_table(&decl_for(
            r#"
            pub struct User {
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
                #[dbdef("type:bigint; foreign_key:teams.id; on_delete:cascade")]
                pub team_id: i64,
            }
            "#,
        ))
        .unwrap();
        assert_eq!(state.foreign_keys.len(), 1);
        let fk = &state.foreign_keys[0];
        assert_eq!(fk.referenced_table, "teams");
        assert_eq!(fk.referenced_columns, vec!["id"]);
        assert_eq!(fk.on_delete, FkAction::Cascade);
        assert_eq!(fk.on_update, FkAction::NoAction);
    }

    #[test]
    fn test_foreign_key_missing_dot_is_decl_error() {
        let err = generate_table(&decl_for(
            r#"
            pub struct User {
                #[dbdef("type:bigint; foreign_key:teams")]
                pub team_id: i64,
            }
            "#,
        ))
        .unwrap_err();
        match err {
            Error::Decl { field_path, .. } => assert_eq!(field_path, "User.team_id"),
            other => panic!("expected Decl error, got {other:?}"),
        }
    }

    #[test]
    fn test_table_level_index_with_predicate() {
        let state = generate_table(&decl_for(
            r#"
            pub struct Project {
                #[dbdef("index:idx_projects_team_name,team_id,name where:is_active = true")]
                _t: (),
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
                #[dbdef("type:bigint")]
                pub team_id: i64,
                #[dbdef("type:text")]
                pub name: String,
                #[dbdef("type:boolean; not_null; default:true")]
                pub is_active: bool,
            }
            "#,
        ))
        .unwrap();
        let idx = state.indexes.iter().find(|i| i.name == "idx_projects_team_name").unwrap();
        assert_eq!(idx.columns, vec!["team_id", "name"]);
        assert!(!idx.is_unique);
        assert_eq!(idx.where_clause, "is_active = true");
    }

    #[test]
    fn test_table_level_repeated_entries() {
        let state = generate_table(&decl_for(
            r#"
            pub struct Event {
                #[dbdef("index:idx_events_kind,kind; index:idx_events_at,at; unique:uk_events_slug,slug")]
                _t: (),
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
                #[dbdef("type:text")]
                pub kind: String,
                #[dbdef("type:timestamptz")]
                pub at: String,
                #[dbdef("type:text")]
                pub slug: String,
            }
            "#,
        ))
        .unwrap();
        assert_eq!(state.indexes.iter().filter(|i| !i.is_primary).count(), 3);
        assert!(state.indexes.iter().any(|i| i.name == "uk_events_slug" && i.is_unique));
    }

    #[test]
    fn test_table_level_unknown_column_is_decl_error() {
        let err = generate_table(&decl_for(
            r#"
            pub struct Event {
                #[dbdef("index:idx_events_missing,missing")]
                _t: (),
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
            }
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Decl { .. }));
    }

    #[test]
    fn test_duplicate_unique_dedups_by_signature() {
        // Field-level `unique` and a table-level `unique:` over the same
        // column collapse into one definition.
        let state = generate_table(&decl_for(
            r#"
            pub struct User {
                #[dbdef("unique:uk_users_email,email")]
                _t: (),
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
                #[dbdef("type:text; unique")]
                pub email: String,
            }
            "#,
        ))
        .unwrap();
        let uniques: Vec<_> = state
            .indexes
            .iter()
            .filter(|i| i.is_unique && !i.is_primary)
            .collect();
        assert_eq!(uniques.len(), 1);
        // First definition (field order before table tags) wins.
        assert_eq!(uniques[0].name, "users_email_key");
    }

    #[test]
    fn test_type_inference_from_rust_types() {
        let state = generate_table(&decl_for(
            r#"
            pub struct Sample {
                #[dbdef("primary_key")]
                pub id: i64,
                #[dbdef("not_null")]
                pub name: String,
                #[dbdef("")]
                pub score: Option<f64>,
                #[dbdef("not_null")]
                pub created_at: DateTime<Utc>,
            }
            "#,
        ))
        .unwrap();
        let types: Vec<&str> = state.schema.columns.iter().map(|c| c.sql_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["bigint", "text", "double precision", "timestamp with time zone"]
        );
    }

    #[test]
    fn test_unknown_type_is_decl_error() {
        let err = generate_table(&decl_for(
            r#"
            pub struct Odd {
                #[dbdef("primary_key")]
                pub id: MyCustomId,
            }
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Decl { .. }));
    }

    #[test]
    fn test_serial_type_expands() {
        let state = generate_table(&decl_for(
            r#"
            pub struct Counter {
                #[dbdef("type:bigserial; primary_key")]
                pub id: i64,
            }
            "#,
        ))
        .unwrap();
        let col = &state.schema.columns[0];
        assert_eq!(col.sql_type, "bigint");
        assert_eq!(col.default.as_deref(), Some("nextval('counters_id_seq'::regclass)"));
    }

    #[test]
    fn test_declared_realm_preserves_order() {
        let decls = parse_source(
            r#"
            pub struct Team {
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
            }
            pub struct User {
                #[dbdef("type:bigint; primary_key")]
                pub id: i64,
            }
            "#,
            Path::new("test.rs"),
        )
        .unwrap();
        let realm = declared_realm(&decls).unwrap();
        let names: Vec<&String> = realm.tables.keys().collect();
        assert_eq!(names, vec!["teams", "users"]);
    }
}
