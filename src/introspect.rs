//! Live schema introspection.
//!
//! Rebuilds the abstract schema model from `pg_catalog` and
//! `information_schema`. Index and foreign-key definitions get their
//! signatures computed on construction, so they compare byte-for-byte
//! against generated definitions. Internal schemas are never reported.

use tokio_postgres::Client;

use crate::error::{Error, Result};
use crate::schema::{
    ColumnSchema, EnumType, FkAction, ForeignKeyDef, IndexDef, Realm, TableSchema, TableState,
    normalize_sql_type,
};

/// Does the relation exist in a reportable schema?
pub async fn relation_exists(client: &Client, table: &str) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM pg_class c
                JOIN pg_namespace n ON n.oid = c.relnamespace
                WHERE c.relname = $1
                  AND c.relkind IN ('r', 'p')
                  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
            )
            "#,
            &[&table],
        )
        .await
        .map_err(Error::Introspection)?;
    Ok(row.get(0))
}

/// All index definitions on one table, in index-name order.
///
/// The primary-key index is reported with `is_primary = true` and
/// `is_unique = true`; key columns come back in index order, expressions
/// deparsed, partial predicates via `pg_get_expr`.
pub async fn table_indexes(client: &Client, table: &str) -> Result<Vec<IndexDef>> {
    if !relation_exists(client, table).await? {
        return Err(Error::RelationNotFound {
            relation: table.to_string(),
        });
    }

    let rows = client
        .query(
            r#"
            SELECT
                i.relname AS index_name,
                ix.indisunique,
                ix.indisprimary,
                am.amname AS method,
                pg_get_expr(ix.indpred, ix.indrelid, true) AS predicate,
                (SELECT array_agg(pg_get_indexdef(ix.indexrelid, k, true) ORDER BY k)
                   FROM generate_series(1, ix.indnkeyatts::int) AS k) AS columns
            FROM pg_index ix
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_am am ON am.oid = i.relam
            JOIN pg_namespace n ON n.oid = t.relnamespace
            WHERE t.relname = $1
              AND n.nspname NOT IN ('pg_catalog', 'information_schema')
            ORDER BY i.relname
            "#,
            &[&table],
        )
        .await
        .map_err(Error::Introspection)?;

    let mut indexes = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.get("index_name");
        let is_unique: bool = row.get("indisunique");
        let is_primary: bool = row.get("indisprimary");
        let method: String = row.get("method");
        let predicate: Option<String> = row.get("predicate");
        let columns: Vec<String> = row.get("columns");

        indexes.push(IndexDef::new(
            name,
            table,
            columns,
            is_unique,
            is_primary,
            &method,
            predicate.as_deref().unwrap_or(""),
        ));
    }
    Ok(indexes)
}

/// All foreign keys on one table, in constraint-name order. Local and
/// referenced columns come back in constraint-key order.
pub async fn table_foreign_keys(client: &Client, table: &str) -> Result<Vec<ForeignKeyDef>> {
    if !relation_exists(client, table).await? {
        return Err(Error::RelationNotFound {
            relation: table.to_string(),
        });
    }

    let rows = client
        .query(
            r#"
            SELECT
                c.conname,
                (SELECT array_agg(a.attname ORDER BY x.ord)
                   FROM unnest(c.conkey) WITH ORDINALITY AS x(attnum, ord)
                   JOIN pg_attribute a
                     ON a.attrelid = c.conrelid AND a.attnum = x.attnum) AS columns,
                rt.relname AS ref_table,
                (SELECT array_agg(a.attname ORDER BY x.ord)
                   FROM unnest(c.confkey) WITH ORDINALITY AS x(attnum, ord)
                   JOIN pg_attribute a
                     ON a.attrelid = c.confrelid AND a.attnum = x.attnum) AS ref_columns,
                c.confdeltype::text AS on_delete,
                c.confupdtype::text AS on_update
            FROM pg_constraint c
            JOIN pg_class t ON t.oid = c.conrelid
            JOIN pg_class rt ON rt.oid = c.confrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            WHERE c.contype = 'f'
              AND t.relname = $1
              AND n.nspname NOT IN ('pg_catalog', 'information_schema')
            ORDER BY c.conname
            "#,
            &[&table],
        )
        .await
        .map_err(Error::Introspection)?;

    let mut fks = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.get("conname");
        let columns: Vec<String> = row.get("columns");
        let ref_table: String = row.get("ref_table");
        let ref_columns: Vec<String> = row.get("ref_columns");
        let on_delete: String = row.get("on_delete");
        let on_update: String = row.get("on_update");

        fks.push(ForeignKeyDef::new(
            name,
            table,
            columns,
            ref_table,
            ref_columns,
            FkAction::from_catalog_char(on_delete.chars().next().unwrap_or('a')),
            FkAction::from_catalog_char(on_update.chars().next().unwrap_or('a')),
        ));
    }
    Ok(fks)
}

/// Columns of one table, in attribute order, with canonical types.
pub async fn table_columns(client: &Client, table: &str) -> Result<Vec<ColumnSchema>> {
    let rows = client
        .query(
            r#"
            SELECT
                a.attname,
                format_type(a.atttypid, a.atttypmod) AS sql_type,
                a.attnotnull,
                pg_get_expr(d.adbin, d.adrelid) AS default_expr
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE c.relname = $1
              AND n.nspname = 'public'
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
            "#,
            &[&table],
        )
        .await
        .map_err(Error::Introspection)?;

    Ok(rows
        .iter()
        .map(|row| {
            let sql_type: String = row.get("sql_type");
            ColumnSchema {
                name: row.get("attname"),
                sql_type: normalize_sql_type(&sql_type),
                not_null: row.get("attnotnull"),
                default: row.get("default_expr"),
            }
        })
        .collect())
}

/// One table's full state: columns, indexes, foreign keys, primary key.
pub async fn table_state(client: &Client, table: &str) -> Result<TableState> {
    if !relation_exists(client, table).await? {
        return Err(Error::RelationNotFound {
            relation: table.to_string(),
        });
    }
    let columns = table_columns(client, table).await?;
    let indexes = table_indexes(client, table).await?;
    let foreign_keys = table_foreign_keys(client, table).await?;

    let primary_key = indexes
        .iter()
        .find(|idx| idx.is_primary)
        .map(|idx| idx.columns.clone())
        .unwrap_or_default();

    Ok(TableState {
        schema: TableSchema {
            name: table.to_string(),
            columns,
            primary_key,
        },
        indexes,
        foreign_keys,
    })
}

/// Names of all base tables in the public schema.
pub async fn list_tables(client: &Client) -> Result<Vec<String>> {
    let rows = client
        .query(
            r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
            &[],
        )
        .await
        .map_err(Error::Introspection)?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

async fn list_views(client: &Client) -> Result<Vec<String>> {
    let rows = client
        .query(
            r#"
            SELECT table_name
            FROM information_schema.views
            WHERE table_schema = 'public'
            ORDER BY table_name
            "#,
            &[],
        )
        .await
        .map_err(Error::Introspection)?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

async fn list_sequences(client: &Client) -> Result<Vec<String>> {
    let rows = client
        .query(
            r#"
            SELECT sequence_name
            FROM information_schema.sequences
            WHERE sequence_schema = 'public'
            ORDER BY sequence_name
            "#,
            &[],
        )
        .await
        .map_err(Error::Introspection)?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

async fn list_enums(client: &Client) -> Result<Vec<EnumType>> {
    let rows = client
        .query(
            r#"
            SELECT t.typname,
                   array_agg(e.enumlabel ORDER BY e.enumsortorder) AS variants
            FROM pg_type t
            JOIN pg_enum e ON e.enumtypid = t.oid
            JOIN pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname = 'public'
            GROUP BY t.typname
            ORDER BY t.typname
            "#,
            &[],
        )
        .await
        .map_err(Error::Introspection)?;
    Ok(rows
        .iter()
        .map(|row| EnumType {
            name: row.get(0),
            variants: row.get(1),
        })
        .collect())
}

/// The full live realm: every public base table with its state, plus
/// name-level reporting of views, sequences and enum types.
pub async fn realm(client: &Client) -> Result<Realm> {
    let mut out = Realm::default();
    for table in list_tables(client).await? {
        let state = table_state(client, &table).await?;
        out.insert(state);
    }
    out.views = list_views(client).await?;
    out.sequences = list_sequences(client).await?;
    out.enums = list_enums(client).await?;
    tracing::debug!(tables = out.tables.len(), "introspected live realm");
    Ok(out)
}
