//! Introspection renderers.
//!
//! One renderer per output format, dispatched through [`render`]. JSON and
//! YAML serialize the realm model directly; the rest are hand-built text
//! forms.

pub mod dot;
pub mod markdown;
pub mod rust_decl;
pub mod sql;

use std::str::FromStr;

use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::schema::Realm;

/// Output format for the introspect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Format {
    Sql,
    Json,
    Yaml,
    Markdown,
    Dot,
    Rust,
}

impl Format {
    pub fn parse(raw: &str) -> Result<Self> {
        Format::from_str(raw.trim().to_lowercase().as_str()).map_err(|_| {
            Error::Emission(format!(
                "unknown output format `{raw}` (expected sql, json, yaml, markdown, dot or rust)"
            ))
        })
    }
}

/// Render a realm in the requested format.
pub fn render(realm: &Realm, format: Format) -> Result<String> {
    match format {
        Format::Sql => sql::render(realm),
        Format::Json => serde_json::to_string_pretty(realm)
            .map_err(|e| Error::Emission(format!("json serialization failed: {e}"))),
        Format::Yaml => serde_yaml::to_string(realm)
            .map_err(|e| Error::Emission(format!("yaml serialization failed: {e}"))),
        Format::Markdown => Ok(markdown::render(realm)),
        Format::Dot => Ok(dot::render(realm)),
        Format::Rust => Ok(rust_decl::render(realm)),
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use crate::schema::{
        ColumnSchema, EnumType, FkAction, ForeignKeyDef, IndexDef, Realm, TableSchema, TableState,
    };

    /// A small two-table realm shared by the renderer tests.
    pub fn sample_realm() -> Realm {
        let mut realm = Realm::default();
        realm.insert(TableState {
            schema: TableSchema {
                name: "teams".to_string(),
                columns: vec![
                    ColumnSchema {
                        name: "id".to_string(),
                        sql_type: "bigint".to_string(),
                        not_null: true,
                        default: None,
                    },
                    ColumnSchema {
                        name: "name".to_string(),
                        sql_type: "text".to_string(),
                        not_null: true,
                        default: None,
                    },
                ],
                primary_key: vec!["id".to_string()],
            },
            indexes: vec![IndexDef::new(
                "teams_pkey",
                "teams",
                vec!["id".to_string()],
                true,
                true,
                "btree",
                "",
            )],
            foreign_keys: vec![],
        });
        realm.insert(TableState {
            schema: TableSchema {
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
                        name: "team_id".to_string(),
                        sql_type: "bigint".to_string(),
                        not_null: false,
                        default: None,
                    },
                ],
                primary_key: vec!["id".to_string()],
            },
            indexes: vec![
                IndexDef::new(
                    "users_pkey",
                    "users",
                    vec!["id".to_string()],
                    true,
                    true,
                    "btree",
                    "",
                ),
                IndexDef::new(
                    "users_email_key",
                    "users",
                    vec!["email".to_string()],
                    true,
                    false,
                    "btree",
                    "",
                ),
                IndexDef::new(
                    "idx_users_team_id",
                    "users",
                    vec!["team_id".to_string()],
                    false,
                    false,
                    "btree",
                    "",
                ),
            ],
            foreign_keys: vec![ForeignKeyDef::new(
                "fk_users_team_id",
                "users",
                vec!["team_id".to_string()],
                "teams",
                vec!["id".to_string()],
                FkAction::SetNull,
                FkAction::NoAction,
            )],
        });
        realm.views = vec!["active_users".to_string()];
        realm.sequences = vec!["users_id_seq".to_string()];
        realm.enums = vec![EnumType {
            name: "mood".to_string(),
            variants: vec!["sad".to_string(), "ok".to_string(), "happy".to_string()],
        }];
        realm
    }
}
