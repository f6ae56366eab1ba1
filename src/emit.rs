//! DDL emission.
//!
//! Turns a [`SchemaComparison`] or a realm change plan into ordered `up`
//! and `down` statement lists. Statements carry no trailing semicolon;
//! script rendering appends them. Lines starting with `--` are comments
//! and survive into the written files but are skipped by the applier.
//!
//! Ordering: creates before drops; index creates before foreign-key
//! creates; foreign-key drops before index drops. The `down` list holds
//! the inverse of each `up` statement, in reverse order.

use std::collections::HashSet;

use crate::diff::{RealmChange, SchemaComparison};
use crate::error::{Error, Result};
use crate::reverse::reverse_statement;
use crate::schema::{ForeignKeyDef, IndexDef, column_sql};

/// An ordered pair of statement sequences plus the destructive operations
/// that were withheld.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub up: Vec<String>,
    pub down: Vec<String>,
    /// Human descriptions of destructive operations blocked because
    /// `allow_destructive` was false.
    pub blocked: Vec<String>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.up.iter().all(|s| s.starts_with("--")) && self.blocked.is_empty()
    }

    pub fn up_script(&self) -> String {
        render_script(&self.up)
    }

    pub fn down_script(&self) -> String {
        render_script(&self.down)
    }
}

/// Statements separated by blank lines; comments pass through unterminated.
fn render_script(statements: &[String]) -> String {
    let mut parts = Vec::with_capacity(statements.len());
    for stmt in statements {
        if stmt.starts_with("--") {
            parts.push(stmt.clone());
        } else {
            parts.push(format!("{stmt};"));
        }
    }
    parts.join("\n\n")
}

/// Emit the per-table index/foreign-key plan.
///
/// `universe` is the set of every known table name (declared and live);
/// a foreign key referencing a table outside it cannot be rendered.
pub fn emit_comparison(
    cmp: &SchemaComparison,
    allow_destructive: bool,
    universe: &HashSet<String>,
) -> Result<MigrationPlan> {
    let mut plan = MigrationPlan::default();
    let mut inverses: Vec<Option<String>> = Vec::new();

    for idx in &cmp.indexes_to_create {
        let (up, down) = index_create_pair(idx);
        plan.up.push(up);
        inverses.push(Some(down));
    }

    for fk in &cmp.fks_to_create {
        check_fk_universe(fk, universe)?;
        plan.up.push(add_foreign_key_sql(fk));
        inverses.push(Some(drop_foreign_key_sql(fk)));
    }

    for fk in &cmp.fks_to_drop {
        if allow_destructive {
            plan.up.push(drop_foreign_key_sql(fk));
            inverses.push(Some(add_foreign_key_sql(fk)));
        } else {
            block(&mut plan, format!("drop foreign key {}", fk.name), drop_foreign_key_sql(fk));
        }
    }

    for idx in &cmp.indexes_to_drop {
        let (up, down) = index_drop_pair(idx);
        if idx.drop_is_destructive() && !allow_destructive {
            block(&mut plan, format!("drop index {}", idx.name), up);
        } else {
            plan.up.push(up);
            inverses.push(Some(down));
        }
    }

    plan.down = collect_down(inverses);
    Ok(plan)
}

/// Emit a realm-level change plan. Change order is preserved (the realm
/// differ already ordered it); blocked destructive steps become comments.
pub fn emit_plan(
    changes: &[RealmChange],
    allow_destructive: bool,
    universe: &HashSet<String>,
) -> Result<MigrationPlan> {
    let mut plan = MigrationPlan::default();
    let mut inverses: Vec<Option<String>> = Vec::new();

    for change in changes {
        if change.is_destructive() && !allow_destructive {
            let (up, _) = change_pair(change, universe)?;
            block(&mut plan, change.describe(), up);
            continue;
        }
        let (up, down) = change_pair(change, universe)?;
        plan.up.push(up);
        inverses.push(Some(down));
    }

    plan.down = collect_down(inverses);
    Ok(plan)
}

/// Forward and inverse statement for one realm change.
///
/// Statement-level cases delegate to the reverser; index, foreign-key and
/// column-alter changes invert from their definitions instead, which can
/// restore things the statement text alone cannot (a dropped unique comes
/// back as a constraint, a type change knows its prior type).
fn change_pair(change: &RealmChange, universe: &HashSet<String>) -> Result<(String, String)> {
    Ok(match change {
        RealmChange::CreateTable(t) => {
            let up = t.schema.create_sql();
            let (down, _) = reverse_statement(&up);
            (up, down)
        }
        RealmChange::DropTable(name) => {
            let up = format!("DROP TABLE IF EXISTS {name} CASCADE");
            let (down, _) = reverse_statement(&up);
            (up, down)
        }
        RealmChange::AddColumn { table, column } => (
            format!("ALTER TABLE {table} ADD COLUMN {}", column_sql(column)),
            format!("ALTER TABLE {table} DROP COLUMN IF EXISTS {}", column.name),
        ),
        RealmChange::DropColumn { table, column } => {
            let up = format!("ALTER TABLE {table} DROP COLUMN IF EXISTS {column}");
            let (down, _) = reverse_statement(&up);
            (up, down)
        }
        RealmChange::AlterColumnType { table, column, sql_type, prior } => (
            format!("ALTER TABLE {table} ALTER COLUMN {column} TYPE {sql_type}"),
            format!("ALTER TABLE {table} ALTER COLUMN {column} TYPE {prior}"),
        ),
        RealmChange::AlterColumnNullable { table, column, not_null } => {
            let set = format!("ALTER TABLE {table} ALTER COLUMN {column} SET NOT NULL");
            let drop = format!("ALTER TABLE {table} ALTER COLUMN {column} DROP NOT NULL");
            if *not_null { (set, drop) } else { (drop, set) }
        }
        RealmChange::AlterColumnDefault { table, column, default, prior } => (
            alter_default_sql(table, column, default.as_deref()),
            alter_default_sql(table, column, prior.as_deref()),
        ),
        RealmChange::CreateIndex(idx) => index_create_pair(idx),
        RealmChange::DropIndex(idx) => index_drop_pair(idx),
        RealmChange::AddForeignKey(fk) => {
            check_fk_universe(fk, universe)?;
            (add_foreign_key_sql(fk), drop_foreign_key_sql(fk))
        }
        RealmChange::DropForeignKey(fk) => (drop_foreign_key_sql(fk), add_foreign_key_sql(fk)),
    })
}

fn alter_default_sql(table: &str, column: &str, default: Option<&str>) -> String {
    match default {
        Some(d) => format!("ALTER TABLE {table} ALTER COLUMN {column} SET DEFAULT {d}"),
        None => format!("ALTER TABLE {table} ALTER COLUMN {column} DROP DEFAULT"),
    }
}

fn block(plan: &mut MigrationPlan, description: String, sql: String) {
    tracing::warn!(operation = %description, "destructive operation blocked");
    plan.up.push(format!("-- blocked (destructive): {sql}"));
    plan.blocked.push(description);
}

fn collect_down(inverses: Vec<Option<String>>) -> Vec<String> {
    inverses.into_iter().flatten().rev().collect()
}

fn check_fk_universe(fk: &ForeignKeyDef, universe: &HashSet<String>) -> Result<()> {
    if universe.contains(&fk.referenced_table) {
        Ok(())
    } else {
        Err(Error::Emission(format!(
            "foreign key {} references unknown table {}",
            fk.name, fk.referenced_table
        )))
    }
}

// ---------------------------------------------------------------------------
// Statement forms
// ---------------------------------------------------------------------------

/// `CREATE [UNIQUE] INDEX` with columns in declared order. `USING` appears
/// only for non-default methods; `WHERE` only for partial indexes.
pub fn create_index_sql(idx: &IndexDef) -> String {
    let unique = if idx.is_unique { "UNIQUE " } else { "" };
    let mut sql = format!(
        "CREATE {unique}INDEX {} ON {}",
        idx.name, idx.table_name
    );
    if idx.method != "btree" {
        sql.push_str(&format!(" USING {}", idx.method));
    }
    sql.push_str(&format!(" ({})", idx.columns.join(", ")));
    if idx.is_partial() {
        sql.push_str(&format!(" WHERE {}", idx.where_clause));
    }
    sql
}

/// Primary keys ride on `ALTER TABLE … ADD CONSTRAINT … PRIMARY KEY`.
pub fn add_primary_key_sql(idx: &IndexDef) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
        idx.table_name,
        idx.name,
        idx.columns.join(", ")
    )
}

/// Total unique indexes re-create as `UNIQUE` constraints; partial ones
/// cannot (constraints take no predicate) and fall back to the index form.
pub fn add_unique_constraint_sql(idx: &IndexDef) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
        idx.table_name,
        idx.name,
        idx.columns.join(", ")
    )
}

/// Unique and primary indexes are constraint-backed and drop through
/// `DROP CONSTRAINT`; plain indexes through `DROP INDEX`.
pub fn drop_index_sql(idx: &IndexDef) -> String {
    if idx.is_primary || (idx.is_unique && !idx.is_partial()) {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            idx.table_name, idx.name
        )
    } else {
        format!("DROP INDEX IF EXISTS {}", idx.name)
    }
}

pub fn add_foreign_key_sql(fk: &ForeignKeyDef) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        fk.table_name,
        fk.name,
        fk.columns.join(", "),
        fk.referenced_table,
        fk.referenced_columns.join(", ")
    );
    if fk.on_delete != crate::schema::FkAction::NoAction {
        sql.push_str(&format!(" ON DELETE {}", fk.on_delete));
    }
    if fk.on_update != crate::schema::FkAction::NoAction {
        sql.push_str(&format!(" ON UPDATE {}", fk.on_update));
    }
    sql
}

pub fn drop_foreign_key_sql(fk: &ForeignKeyDef) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
        fk.table_name, fk.name
    )
}

/// (up, down) pair for creating an index.
fn index_create_pair(idx: &IndexDef) -> (String, String) {
    if idx.is_primary {
        (add_primary_key_sql(idx), drop_index_sql(idx))
    } else {
        (
            create_index_sql(idx),
            format!("DROP INDEX IF EXISTS {}", idx.name),
        )
    }
}

/// (up, down) pair for dropping an index. The inverse re-creates it from
/// the full definition, so dropped constraints come back as constraints.
fn index_drop_pair(idx: &IndexDef) -> (String, String) {
    let down = if idx.is_primary {
        add_primary_key_sql(idx)
    } else if idx.is_unique && !idx.is_partial() {
        add_unique_constraint_sql(idx)
    } else {
        create_index_sql(idx)
    };
    (drop_index_sql(idx), down)
}
