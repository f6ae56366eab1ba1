//! Migration pipeline: the shared parse/generate/introspect/diff/emit
//! flow behind the CLI commands.
//!
//! The [`MigrationPipeline`] value owns the connection settings, pool and
//! source package path and threads them through the stages, so commands
//! and tests drive one entry point instead of wiring stages themselves.

use std::collections::HashSet;
use std::path::PathBuf;

use deadpool_postgres::Pool;

use crate::apply::{ApplyReport, apply_statements};
use crate::db::{ADMIN_DBNAME, ConnectionSettings, PoolSettings, database_exists};
use crate::decl::parser::parse_package;
use crate::diff::{RealmChange, diff_realms};
use crate::emit::{MigrationPlan, emit_plan};
use crate::error::{Error, Result};
use crate::introspect;
use crate::schema::Realm;
use crate::schema::generate::declared_realm;
use crate::tempdb::declared_realm_via_scratch;

/// Per-invocation options for planning a migration.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    pub allow_destructive: bool,
    /// Materialize the declared DDL in a scratch database and introspect
    /// it back, instead of diffing the in-memory declared realm.
    pub via_tempdb: bool,
    /// Treat a missing target database as an empty realm (and create it
    /// before pushing).
    pub create_if_not_exists: bool,
}

/// A computed migration: the ordered statement plan, the underlying
/// change list and the operator summary.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: MigrationPlan,
    pub changes: Vec<RealmChange>,
    pub summary: String,
}

pub struct MigrationPipeline {
    settings: ConnectionSettings,
    pool_settings: PoolSettings,
    package: PathBuf,
    pool: Option<Pool>,
}

impl MigrationPipeline {
    pub fn new(
        settings: ConnectionSettings,
        pool_settings: PoolSettings,
        package: PathBuf,
    ) -> Self {
        Self {
            settings,
            pool_settings,
            package,
            pool: None,
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// The lazily built target-database pool. All target-database work
    /// shares this one pool; scratch databases use their own clients.
    fn pool(&mut self) -> Result<&Pool> {
        if self.pool.is_none() {
            self.pool = Some(self.settings.pool(self.pool_settings)?);
        }
        Ok(self.pool.as_ref().expect("pool just initialized"))
    }

    /// Parse the package and generate the declared realm.
    pub fn declared_realm(&self) -> Result<Realm> {
        let decls = parse_package(&self.package)?;
        tracing::info!(
            declarations = decls.len(),
            package = %self.package.display(),
            "parsed declarations"
        );
        declared_realm(&decls)
    }

    /// Introspect the live realm, honoring `create_if_not_exists`.
    pub async fn live_realm(&mut self, opts: MigrateOptions) -> Result<Realm> {
        if opts.create_if_not_exists && !self.target_database_exists().await? {
            tracing::info!(
                dbname = %self.settings.effective_dbname(),
                "target database missing; treating live realm as empty"
            );
            return Ok(Realm::default());
        }
        let pool = self.pool()?.clone();
        let client = pool.get().await.map_err(|e| Error::Pool(e.to_string()))?;
        introspect::realm(&client).await
    }

    async fn target_database_exists(&self) -> Result<bool> {
        let admin = self.settings.with_dbname(ADMIN_DBNAME).connect().await?;
        database_exists(&admin, &self.settings.effective_dbname()).await
    }

    /// Create the target database when it is absent.
    pub async fn ensure_target_database(&self) -> Result<()> {
        if self.target_database_exists().await? {
            return Ok(());
        }
        let dbname = self.settings.effective_dbname();
        let admin = self.settings.with_dbname(ADMIN_DBNAME).connect().await?;
        admin.batch_execute(&format!("CREATE DATABASE {dbname}")).await?;
        tracing::info!(%dbname, "created target database");
        Ok(())
    }

    /// Compute the full migration plan for the current declarations.
    pub async fn plan(&mut self, opts: MigrateOptions) -> Result<PlanOutcome> {
        let mut declared = self.declared_realm()?;
        if opts.via_tempdb {
            declared = declared_realm_via_scratch(&self.settings, declared).await?;
        }
        let live = self.live_realm(opts).await?;

        let changes = diff_realms(&declared, &live)?;
        let universe: HashSet<String> = declared
            .tables
            .keys()
            .chain(live.tables.keys())
            .cloned()
            .collect();
        let plan = emit_plan(&changes, opts.allow_destructive, &universe)?;
        let summary = summarize(&changes);
        Ok(PlanOutcome {
            plan,
            changes,
            summary,
        })
    }

    /// Exit-style verification: `Ok(true)` when the live schema already
    /// matches the declarations.
    pub async fn verify(&mut self) -> Result<bool> {
        let outcome = self
            .plan(MigrateOptions {
                allow_destructive: true,
                ..Default::default()
            })
            .await?;
        Ok(outcome.changes.is_empty())
    }

    /// Apply a computed plan to the target database in one transaction.
    pub async fn push(&mut self, plan: &MigrationPlan, opts: MigrateOptions) -> Result<ApplyReport> {
        if !plan.blocked.is_empty() {
            return Err(Error::DestructiveBlocked {
                count: plan.blocked.len(),
            });
        }
        if opts.create_if_not_exists {
            self.ensure_target_database().await?;
        }
        let pool = self.pool()?.clone();
        let mut client = pool.get().await.map_err(|e| Error::Pool(e.to_string()))?;
        let statements: Vec<String> = plan
            .up
            .iter()
            .filter(|s| !s.starts_with("--"))
            .cloned()
            .collect();
        apply_statements(&mut client, &statements).await
    }

    /// Introspect the live realm for the introspect command.
    pub async fn introspect_live(&mut self) -> Result<Realm> {
        let pool = self.pool()?.clone();
        let client = pool.get().await.map_err(|e| Error::Pool(e.to_string()))?;
        introspect::realm(&client).await
    }
}

/// The operator summary line: index/fk counts per the diff, plus table
/// and column change counts when the plan touches them.
pub fn summarize(changes: &[RealmChange]) -> String {
    let count = |pred: fn(&RealmChange) -> bool| changes.iter().filter(|c| pred(c)).count();
    let mut summary = format!(
        "indexes to create: {}; indexes to drop: {}; fks to create: {}; fks to drop: {}",
        count(|c| matches!(c, RealmChange::CreateIndex(_))),
        count(|c| matches!(c, RealmChange::DropIndex(_))),
        count(|c| matches!(c, RealmChange::AddForeignKey(_))),
        count(|c| matches!(c, RealmChange::DropForeignKey(_))),
    );
    let tables = count(|c| matches!(c, RealmChange::CreateTable(_) | RealmChange::DropTable(_)));
    let columns = count(|c| {
        matches!(
            c,
            RealmChange::AddColumn { .. }
                | RealmChange::DropColumn { .. }
                | RealmChange::AlterColumnType { .. }
                | RealmChange::AlterColumnNullable { .. }
                | RealmChange::AlterColumnDefault { .. }
        )
    });
    if tables > 0 {
        summary.push_str(&format!("; table changes: {tables}"));
    }
    if columns > 0 {
        summary.push_str(&format!("; column changes: {columns}"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, IndexDef, TableSchema, TableState};

    fn change_create_index() -> RealmChange {
        RealmChange::CreateIndex(IndexDef::new(
            "i",
            "t",
            vec!["c".to_string()],
            false,
            false,
            "btree",
            "",
        ))
    }

    #[test]
    fn test_summarize_counts() {
        let changes = vec![
            RealmChange::CreateTable(TableState {
                schema: TableSchema {
                    name: "t".to_string(),
                    columns: vec![],
                    primary_key: vec![],
                },
                indexes: vec![],
                foreign_keys: vec![],
            }),
            change_create_index(),
            RealmChange::AddColumn {
                table: "t".to_string(),
                column: ColumnSchema {
                    name: "c".to_string(),
                    sql_type: "text".to_string(),
                    not_null: false,
                    default: None,
                },
            },
        ];
        let summary = summarize(&changes);
        assert!(summary.starts_with("indexes to create: 1; indexes to drop: 0;"));
        assert!(summary.contains("table changes: 1"));
        assert!(summary.contains("column changes: 1"));
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(
            summarize(&[]),
            "indexes to create: 0; indexes to drop: 0; fks to create: 0; fks to drop: 0"
        );
    }
}
