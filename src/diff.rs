//! Diff engine.
//!
//! Two layers: [`compare`] partitions index/foreign-key sets by signature
//! (the per-table path), and [`diff_realms`] compares whole realms into an
//! ordered change plan (the full-schema path). Both are pure set
//! arithmetic; no statement text is produced here.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::schema::{ColumnSchema, ForeignKeyDef, IndexDef, Realm, TableState};

/// Signature-set difference between declared and live definitions.
#[derive(Debug, Clone, Default)]
pub struct SchemaComparison {
    pub indexes_to_create: Vec<IndexDef>,
    pub indexes_to_drop: Vec<IndexDef>,
    pub fks_to_create: Vec<ForeignKeyDef>,
    pub fks_to_drop: Vec<ForeignKeyDef>,
}

impl SchemaComparison {
    pub fn is_empty(&self) -> bool {
        self.indexes_to_create.is_empty()
            && self.indexes_to_drop.is_empty()
            && self.fks_to_create.is_empty()
            && self.fks_to_drop.is_empty()
    }

    /// A comparison is safe when nothing it drops can lose an integrity
    /// guarantee: no unique or primary index drops, no foreign-key drops.
    pub fn is_safe(&self) -> bool {
        self.fks_to_drop.is_empty()
            && self
                .indexes_to_drop
                .iter()
                .all(|idx| !idx.is_unique && !idx.is_primary)
    }

    /// Number of destructive members.
    pub fn destructive_count(&self) -> usize {
        self.fks_to_drop.len()
            + self
                .indexes_to_drop
                .iter()
                .filter(|idx| idx.drop_is_destructive())
                .count()
    }

    /// One-line operator summary.
    pub fn summary(&self) -> String {
        format!(
            "indexes to create: {}; indexes to drop: {}; fks to create: {}; fks to drop: {}",
            self.indexes_to_create.len(),
            self.indexes_to_drop.len(),
            self.fks_to_create.len(),
            self.fks_to_drop.len(),
        )
    }

    /// Merge another comparison into this one (used to fold per-table
    /// comparisons into a realm-wide one).
    pub fn extend(&mut self, other: SchemaComparison) {
        self.indexes_to_create.extend(other.indexes_to_create);
        self.indexes_to_drop.extend(other.indexes_to_drop);
        self.fks_to_create.extend(other.fks_to_create);
        self.fks_to_drop.extend(other.fks_to_drop);
    }
}

/// Partition declared vs. live definitions by signature.
///
/// Items whose signature appears on both sides are kept (no change); the
/// rest land in the create/drop lists, sorted by `(table, name)` so output
/// is independent of input iteration order.
pub fn compare(
    declared_indexes: &[IndexDef],
    declared_fks: &[ForeignKeyDef],
    live_indexes: &[IndexDef],
    live_fks: &[ForeignKeyDef],
) -> Result<SchemaComparison> {
    let declared_idx = index_by_signature(declared_indexes, "declared")?;
    let live_idx = index_by_signature(live_indexes, "live")?;
    let declared_fk = fks_by_signature(declared_fks, "declared")?;
    let live_fk = fks_by_signature(live_fks, "live")?;

    let mut cmp = SchemaComparison {
        indexes_to_create: declared_indexes
            .iter()
            .filter(|i| !live_idx.contains_key(i.signature.as_str()))
            .cloned()
            .collect(),
        indexes_to_drop: live_indexes
            .iter()
            .filter(|i| !declared_idx.contains_key(i.signature.as_str()))
            .cloned()
            .collect(),
        fks_to_create: declared_fks
            .iter()
            .filter(|f| !live_fk.contains_key(f.signature.as_str()))
            .cloned()
            .collect(),
        fks_to_drop: live_fks
            .iter()
            .filter(|f| !declared_fk.contains_key(f.signature.as_str()))
            .cloned()
            .collect(),
    };

    cmp.indexes_to_create.sort_by(index_order);
    cmp.indexes_to_drop.sort_by(index_order);
    cmp.fks_to_create.sort_by(fk_order);
    cmp.fks_to_drop.sort_by(fk_order);
    Ok(cmp)
}

fn index_order(a: &IndexDef, b: &IndexDef) -> std::cmp::Ordering {
    (a.table_name.as_str(), a.name.as_str()).cmp(&(b.table_name.as_str(), b.name.as_str()))
}

fn fk_order(a: &ForeignKeyDef, b: &ForeignKeyDef) -> std::cmp::Ordering {
    (a.table_name.as_str(), a.name.as_str()).cmp(&(b.table_name.as_str(), b.name.as_str()))
}

fn index_by_signature<'a>(
    defs: &'a [IndexDef],
    side: &str,
) -> Result<HashMap<&'a str, &'a IndexDef>> {
    let mut map = HashMap::with_capacity(defs.len());
    for def in defs {
        if map.insert(def.signature.as_str(), def).is_some() {
            return Err(Error::Diff(format!(
                "duplicate index signature in {side} set: {}",
                def.signature
            )));
        }
    }
    Ok(map)
}

fn fks_by_signature<'a>(
    defs: &'a [ForeignKeyDef],
    side: &str,
) -> Result<HashMap<&'a str, &'a ForeignKeyDef>> {
    let mut map = HashMap::with_capacity(defs.len());
    for def in defs {
        if map.insert(def.signature.as_str(), def).is_some() {
            return Err(Error::Diff(format!(
                "duplicate foreign-key signature in {side} set: {}",
                def.signature
            )));
        }
    }
    Ok(map)
}

// ---------------------------------------------------------------------------
// Realm diff
// ---------------------------------------------------------------------------

/// One step of a realm-level change plan.
#[derive(Debug, Clone)]
pub enum RealmChange {
    CreateTable(TableState),
    DropTable(String),
    AddColumn { table: String, column: ColumnSchema },
    DropColumn { table: String, column: String },
    AlterColumnType { table: String, column: String, sql_type: String, prior: String },
    AlterColumnNullable { table: String, column: String, not_null: bool },
    AlterColumnDefault { table: String, column: String, default: Option<String>, prior: Option<String> },
    CreateIndex(IndexDef),
    DropIndex(IndexDef),
    AddForeignKey(ForeignKeyDef),
    DropForeignKey(ForeignKeyDef),
}

impl RealmChange {
    /// Destructive per the glossary: table drops, column drops, unique or
    /// primary index drops, foreign-key drops.
    pub fn is_destructive(&self) -> bool {
        match self {
            RealmChange::DropTable(_)
            | RealmChange::DropColumn { .. }
            | RealmChange::DropForeignKey(_) => true,
            RealmChange::DropIndex(idx) => idx.drop_is_destructive(),
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RealmChange::CreateTable(t) => format!("+ table {}", t.schema.name),
            RealmChange::DropTable(name) => format!("- table {name}"),
            RealmChange::AddColumn { table, column } => {
                format!("+ {table}.{}: {}", column.name, column.sql_type)
            }
            RealmChange::DropColumn { table, column } => format!("- {table}.{column}"),
            RealmChange::AlterColumnType { table, column, sql_type, prior } => {
                format!("~ {table}.{column}: {prior} -> {sql_type}")
            }
            RealmChange::AlterColumnNullable { table, column, not_null } => {
                let to = if *not_null { "not null" } else { "nullable" };
                format!("~ {table}.{column}: {to}")
            }
            RealmChange::AlterColumnDefault { table, column, default, .. } => {
                format!(
                    "~ {table}.{column}: default -> {}",
                    default.as_deref().unwrap_or("(none)")
                )
            }
            RealmChange::CreateIndex(idx) => {
                let unique = if idx.is_unique { "UNIQUE " } else { "" };
                format!("+ {}INDEX {} ({})", unique, idx.name, idx.columns.join(", "))
            }
            RealmChange::DropIndex(idx) => format!("- INDEX {}", idx.name),
            RealmChange::AddForeignKey(fk) => format!(
                "+ FOREIGN KEY {}({}) -> {}({})",
                fk.table_name,
                fk.columns.join(", "),
                fk.referenced_table,
                fk.referenced_columns.join(", ")
            ),
            RealmChange::DropForeignKey(fk) => format!("- FOREIGN KEY {}", fk.name),
        }
    }
}

/// Compute the ordered change plan that transforms `current` into `target`.
///
/// Ordering: table creates (referenced tables first), column adds, column
/// alters, index creates, foreign-key creates, then drops in the reverse
/// dependency direction (foreign keys, indexes, columns, tables).
pub fn diff_realms(target: &Realm, current: &Realm) -> Result<Vec<RealmChange>> {
    let mut plan = Vec::new();

    let new_tables: Vec<&TableState> = target
        .tables
        .values()
        .filter(|t| !current.tables.contains_key(&t.schema.name))
        .collect();
    let new_table_names: HashSet<&str> =
        new_tables.iter().map(|t| t.schema.name.as_str()).collect();

    for table in creation_order(&new_tables) {
        plan.push(RealmChange::CreateTable((*table).clone()));
    }

    // Column changes on tables present on both sides.
    let mut shared_cmp = SchemaComparison::default();
    for (name, target_table) in &target.tables {
        let Some(current_table) = current.tables.get(name) else { continue };
        diff_columns(target_table, current_table, &mut plan);
        shared_cmp.extend(compare(
            &target_table.indexes,
            &target_table.foreign_keys,
            &current_table.indexes,
            &current_table.foreign_keys,
        )?);
    }

    // Index creates: new tables first (primary keys ride on CREATE TABLE),
    // then the per-table comparison results.
    for table in &new_tables {
        for idx in &table.indexes {
            if !idx.is_primary {
                plan.push(RealmChange::CreateIndex(idx.clone()));
            }
        }
    }
    for idx in shared_cmp.indexes_to_create {
        plan.push(RealmChange::CreateIndex(idx));
    }

    // Foreign keys after every index they might rely on.
    for table in &new_tables {
        for fk in &table.foreign_keys {
            plan.push(RealmChange::AddForeignKey(fk.clone()));
        }
    }
    for fk in shared_cmp.fks_to_create {
        plan.push(RealmChange::AddForeignKey(fk));
    }

    // Drops: foreign keys, then indexes, then columns, then tables.
    for fk in shared_cmp.fks_to_drop {
        plan.push(RealmChange::DropForeignKey(fk));
    }
    for idx in shared_cmp.indexes_to_drop {
        plan.push(RealmChange::DropIndex(idx));
    }
    for (name, target_table) in &target.tables {
        let Some(current_table) = current.tables.get(name) else { continue };
        for col in &current_table.schema.columns {
            if target_table.schema.column(&col.name).is_none() {
                plan.push(RealmChange::DropColumn {
                    table: name.clone(),
                    column: col.name.clone(),
                });
            }
        }
    }
    for (name, _) in &current.tables {
        if !target.tables.contains_key(name) {
            plan.push(RealmChange::DropTable(name.clone()));
        }
    }

    // Sanity: a plan never both creates and references a table it drops.
    debug_assert!(
        !plan.iter().any(|c| matches!(c, RealmChange::AddForeignKey(fk)
            if !target.tables.contains_key(&fk.referenced_table)
               && !new_table_names.contains(fk.referenced_table.as_str())
               && !current.tables.contains_key(&fk.referenced_table)))
    );

    Ok(plan)
}

/// Column-level changes for one table present on both sides.
fn diff_columns(target: &TableState, current: &TableState, plan: &mut Vec<RealmChange>) {
    let table = &target.schema.name;
    for col in &target.schema.columns {
        match current.schema.column(&col.name) {
            None => plan.push(RealmChange::AddColumn {
                table: table.clone(),
                column: col.clone(),
            }),
            Some(live) => {
                if col.sql_type != live.sql_type {
                    plan.push(RealmChange::AlterColumnType {
                        table: table.clone(),
                        column: col.name.clone(),
                        sql_type: col.sql_type.clone(),
                        prior: live.sql_type.clone(),
                    });
                }
                if col.not_null != live.not_null {
                    plan.push(RealmChange::AlterColumnNullable {
                        table: table.clone(),
                        column: col.name.clone(),
                        not_null: col.not_null,
                    });
                }
                if !defaults_equal(col.default.as_deref(), live.default.as_deref()) {
                    plan.push(RealmChange::AlterColumnDefault {
                        table: table.clone(),
                        column: col.name.clone(),
                        default: col.default.clone(),
                        prior: live.default.clone(),
                    });
                }
            }
        }
    }
}

/// Default equality modulo stored casts. Sequence-backed defaults compare
/// equal to each other whatever the sequence name, so serial columns do not
/// churn.
fn defaults_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            let (a, b) = (crate::schema::clean_default(a), crate::schema::clean_default(b));
            if a.contains("nextval(") && b.contains("nextval(") {
                return true;
            }
            a == b
        }
        _ => false,
    }
}

/// Order new tables so referenced tables are created before the tables
/// that point at them. Kahn's algorithm over the FK edges among the new
/// tables; insertion order breaks ties so the result is deterministic.
fn creation_order<'a>(new_tables: &[&'a TableState]) -> Vec<&'a TableState> {
    let names: HashSet<&str> = new_tables.iter().map(|t| t.schema.name.as_str()).collect();
    let mut remaining: Vec<&TableState> = new_tables.to_vec();
    let mut ordered: Vec<&TableState> = Vec::with_capacity(remaining.len());
    let mut placed: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut still: Vec<&TableState> = Vec::new();
        for table in remaining {
            let blocked = table.foreign_keys.iter().any(|fk| {
                fk.referenced_table != table.schema.name
                    && names.contains(fk.referenced_table.as_str())
                    && !placed.contains(&fk.referenced_table)
            });
            if blocked {
                still.push(table);
            } else {
                placed.insert(table.schema.name.clone());
                ordered.push(table);
                progressed = true;
            }
        }
        if !progressed {
            // FK cycle: fall back to insertion order for the remainder.
            ordered.extend(still);
            break;
        }
        remaining = still;
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FkAction, TableSchema};

    fn idx(name: &str, table: &str, cols: &[&str], unique: bool, primary: bool) -> IndexDef {
        IndexDef::new(
            name,
            table,
            cols.iter().map(|c| c.to_string()).collect(),
            unique,
            primary,
            "btree",
            "",
        )
    }

    fn fk(name: &str, table: &str, col: &str, ref_table: &str) -> ForeignKeyDef {
        ForeignKeyDef::new(
            name,
            table,
            vec![col.to_string()],
            ref_table,
            vec!["id".to_string()],
            FkAction::NoAction,
            FkAction::NoAction,
        )
    }

    fn table(name: &str, cols: &[(&str, &str, bool)]) -> TableState {
        TableState {
            schema: TableSchema {
                name: name.to_string(),
                columns: cols
                    .iter()
                    .map(|(n, t, nn)| ColumnSchema {
                        name: n.to_string(),
                        sql_type: t.to_string(),
                        not_null: *nn,
                        default: None,
                    })
                    .collect(),
                primary_key: vec![],
            },
            indexes: vec![],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn test_rename_is_silent() {
        // Same column/uniqueness/method, different names: no diff.
        let declared = vec![idx("idx_users_email", "users", &["email"], false, false)];
        let live = vec![idx("users_email_key", "users", &["email"], false, false)];
        let cmp = compare(&declared, &[], &live, &[]).unwrap();
        assert!(cmp.is_empty());
    }

    #[test]
    fn test_partial_predicate_equivalence_is_silent() {
        let declared = vec![IndexDef::new(
            "a", "users", vec!["email".into()], true, false, "btree", "is_active = true",
        )];
        let live = vec![IndexDef::new(
            "b", "users", vec!["email".into()], true, false, "btree", "(is_active = TRUE)",
        )];
        let cmp = compare(&declared, &[], &live, &[]).unwrap();
        assert!(cmp.is_empty());
    }

    #[test]
    fn test_create_and_drop_partition() {
        let declared = vec![idx("new_idx", "users", &["a"], false, false)];
        let live = vec![idx("old_idx", "users", &["b"], false, false)];
        let cmp = compare(&declared, &[], &live, &[]).unwrap();
        assert_eq!(cmp.indexes_to_create.len(), 1);
        assert_eq!(cmp.indexes_to_drop.len(), 1);
        assert_eq!(cmp.indexes_to_create[0].name, "new_idx");
        assert_eq!(cmp.indexes_to_drop[0].name, "old_idx");
    }

    #[test]
    fn test_diff_symmetry() {
        let a_idx = vec![
            idx("i1", "users", &["a"], false, false),
            idx("i2", "users", &["b"], true, false),
        ];
        let b_idx = vec![idx("i3", "users", &["c"], false, false)];
        let a_fk = vec![fk("f1", "users", "team_id", "teams")];
        let b_fk = vec![];

        let ab = compare(&a_idx, &a_fk, &b_idx, &b_fk).unwrap();
        let ba = compare(&b_idx, &b_fk, &a_idx, &a_fk).unwrap();

        let sigs = |defs: &[IndexDef]| -> Vec<String> {
            defs.iter().map(|d| d.signature.clone()).collect()
        };
        assert_eq!(sigs(&ab.indexes_to_create), sigs(&ba.indexes_to_drop));
        assert_eq!(sigs(&ab.indexes_to_drop), sigs(&ba.indexes_to_create));
        assert_eq!(ab.fks_to_create.len(), ba.fks_to_drop.len());
    }

    #[test]
    fn test_no_op_stability() {
        let indexes = vec![idx("i", "users", &["a"], true, false)];
        let fks = vec![fk("f", "users", "team_id", "teams")];
        let cmp = compare(&indexes, &fks, &indexes, &fks).unwrap();
        assert!(cmp.is_empty());
        assert!(cmp.is_safe());
    }

    #[test]
    fn test_safety_classification() {
        let live_unique = vec![idx("u_users_email", "users", &["email"], true, false)];
        let cmp = compare(&[], &[], &live_unique, &[]).unwrap();
        assert!(!cmp.is_safe());
        assert_eq!(cmp.destructive_count(), 1);

        let live_plain = vec![idx("idx_users_email", "users", &["email"], false, false)];
        let cmp = compare(&[], &[], &live_plain, &[]).unwrap();
        assert!(cmp.is_safe());
        assert_eq!(cmp.destructive_count(), 0);

        let cmp = compare(&[], &[], &[], &[fk("f", "users", "team_id", "teams")]).unwrap();
        assert!(!cmp.is_safe());
    }

    #[test]
    fn test_duplicate_signature_is_diff_error() {
        let dup = vec![
            idx("a", "users", &["email"], false, false),
            idx("b", "users", &["email"], false, false),
        ];
        let err = compare(&dup, &[], &[], &[]).unwrap_err();
        assert!(matches!(err, Error::Diff(_)));
    }

    #[test]
    fn test_diff_realms_orders_creates_before_drops() {
        let mut target = Realm::default();
        let mut users = table("users", &[("id", "bigint", true), ("team_id", "bigint", false)]);
        users.indexes.push(idx("idx_users_team_id", "users", &["team_id"], false, false));
        users.foreign_keys.push(fk("fk_users_team_id", "users", "team_id", "teams"));
        target.insert(table("teams", &[("id", "bigint", true)]));
        target.insert(users);

        let current = Realm::default();
        let plan = diff_realms(&target, &current).unwrap();

        let descriptions: Vec<String> = plan.iter().map(|c| c.describe()).collect();
        // teams referenced by users: created first; index precedes FK.
        let teams_pos = descriptions.iter().position(|d| d == "+ table teams").unwrap();
        let users_pos = descriptions.iter().position(|d| d == "+ table users").unwrap();
        let idx_pos = descriptions.iter().position(|d| d.contains("INDEX idx_users_team_id")).unwrap();
        let fk_pos = descriptions.iter().position(|d| d.contains("FOREIGN KEY users")).unwrap();
        assert!(teams_pos < users_pos);
        assert!(idx_pos < fk_pos);
    }

    #[test]
    fn test_diff_realms_drop_order() {
        // Live has an FK plus its supporting index; declared has neither.
        let mut current = Realm::default();
        current.insert(table("teams", &[("id", "bigint", true)]));
        let mut projects = table("projects", &[("id", "bigint", true), ("team_id", "bigint", false)]);
        projects.indexes.push(idx("idx_projects_team_id", "projects", &["team_id"], false, false));
        projects.foreign_keys.push(fk("fk_projects_team_id", "projects", "team_id", "teams"));
        current.insert(projects);

        let mut target = Realm::default();
        target.insert(table("teams", &[("id", "bigint", true)]));
        target.insert(table("projects", &[("id", "bigint", true), ("team_id", "bigint", false)]));

        let plan = diff_realms(&target, &current).unwrap();
        let fk_pos = plan.iter().position(|c| matches!(c, RealmChange::DropForeignKey(_))).unwrap();
        let idx_pos = plan.iter().position(|c| matches!(c, RealmChange::DropIndex(_))).unwrap();
        assert!(fk_pos < idx_pos, "FK drop must precede index drop");
    }

    #[test]
    fn test_diff_realms_column_changes() {
        let mut target = Realm::default();
        target.insert(table(
            "users",
            &[("id", "bigint", true), ("email", "text", true), ("bio", "text", false)],
        ));
        let mut current = Realm::default();
        current.insert(table(
            "users",
            &[("id", "bigint", true), ("email", "text", false), ("legacy", "text", false)],
        ));

        let plan = diff_realms(&target, &current).unwrap();
        let descriptions: Vec<String> = plan.iter().map(|c| c.describe()).collect();
        assert!(descriptions.iter().any(|d| d.contains("+ users.bio")));
        assert!(descriptions.iter().any(|d| d.contains("~ users.email: not null")));
        assert!(descriptions.iter().any(|d| d.contains("- users.legacy")));
    }

    #[test]
    fn test_defaults_equal_nextval() {
        assert!(defaults_equal(
            Some("nextval('users_id_seq'::regclass)"),
            Some("nextval('users_id_seq1'::regclass)")
        ));
        assert!(defaults_equal(Some("'active'::text"), Some("'active'")));
        assert!(!defaults_equal(Some("0"), None));
        assert!(defaults_equal(None, None));
    }

    #[test]
    fn test_safety_monotonicity() {
        // Removing a member from the drop lists never flips safe -> unsafe.
        let live = vec![
            idx("u1", "users", &["a"], true, false),
            idx("p1", "users", &["b"], false, false),
        ];
        let cmp = compare(&[], &[], &live, &[]).unwrap();
        assert!(!cmp.is_safe());
        let mut reduced = cmp.clone();
        reduced.indexes_to_drop.retain(|i| !i.is_unique);
        assert!(reduced.is_safe());
    }
}
