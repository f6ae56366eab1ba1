//! Scratch-database lifecycle and the full-schema diff path.
//!
//! For full-schema migrations the declared DDL is materialized in a
//! uniquely named scratch database on the same server, introspected back
//! out, and the two catalog-backed realms are handed to the realm differ.
//! The scratch database is always dropped: the operation runs on a
//! detached task so caller cancellation cannot skip the release, lingering
//! backends are terminated before the drop, and a panic inside the
//! operation still reaches the release path.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use tokio_postgres::Client;

use crate::apply::apply_statements;
use crate::db::{ADMIN_DBNAME, ConnectionSettings};
use crate::diff::diff_realms;
use crate::emit::emit_plan;
use crate::error::{Error, Result};
use crate::introspect;
use crate::schema::Realm;

static SCRATCH_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Unique scratch database name for this process.
fn scratch_db_name() -> String {
    format!(
        "pg_migration_gen_tmp_{}_{}_{}",
        std::process::id(),
        Utc::now().format("%Y%m%d%H%M%S"),
        SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed),
    )
}

/// A created scratch database. Release terminates its sessions and drops
/// it; [`with_scratch_db`] guarantees release on every exit path.
pub struct ScratchDb {
    name: String,
    settings: ConnectionSettings,
    admin: Client,
}

impl ScratchDb {
    /// Create a fresh scratch database on the same server as `server`.
    pub async fn create(server: &ConnectionSettings) -> Result<Self> {
        let admin_settings = server.with_dbname(ADMIN_DBNAME);
        let admin = admin_settings.connect().await?;
        let name = scratch_db_name();
        admin.batch_execute(&format!("CREATE DATABASE {name}")).await?;
        tracing::debug!(scratch = %name, "scratch database created");
        Ok(Self {
            settings: server.with_dbname(&name),
            name,
            admin,
        })
    }

    /// Connection settings pointing at the scratch database.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Terminate lingering backends and drop the database.
    pub async fn release(self) -> Result<()> {
        if let Err(e) = self
            .admin
            .execute(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = $1 AND pid <> pg_backend_pid()",
                &[&self.name],
            )
            .await
        {
            tracing::warn!(error = %e, scratch = %self.name, "backend termination failed");
        }
        self.admin
            .batch_execute(&format!("DROP DATABASE IF EXISTS {}", self.name))
            .await?;
        tracing::debug!(scratch = %self.name, "scratch database dropped");
        Ok(())
    }
}

/// Run `op` against a scratch database, releasing it on success, failure,
/// panic and caller cancellation alike.
///
/// The acquire/run/release sequence runs on a spawned task: dropping the
/// returned future detaches the task, which still completes the release.
pub async fn with_scratch_db<T, F, Fut>(server: &ConnectionSettings, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(ConnectionSettings) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<T>> + Send + 'static,
{
    let server = server.clone();
    let handle = tokio::spawn(async move {
        let scratch = ScratchDb::create(&server).await?;
        // Inner spawn isolates panics in `op` so release still runs.
        let result = match tokio::spawn(op(scratch.settings().clone())).await {
            Ok(result) => result,
            Err(join_err) => Err(Error::Pool(format!(
                "scratch database operation aborted: {join_err}"
            ))),
        };
        let released = scratch.release().await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    });
    handle
        .await
        .map_err(|e| Error::Pool(format!("scratch database task aborted: {e}")))?
}

/// Execute a declared realm's full DDL inside a database.
///
/// Statement order comes from the realm differ against an empty realm:
/// referenced tables first, then indexes, then foreign keys.
pub async fn materialize_realm(client: &mut Client, realm: &Realm) -> Result<()> {
    let changes = diff_realms(realm, &Realm::default())?;
    let universe = realm.tables.keys().cloned().collect();
    let plan = emit_plan(&changes, true, &universe)?;
    apply_statements(client, &plan.up).await?;
    Ok(())
}

/// The catalog-backed view of a declared realm: materialize it in a
/// scratch database and introspect it back out. Normalizations the
/// server itself applies (type aliases, predicate deparsing) come back
/// already canonical.
pub async fn declared_realm_via_scratch(
    server: &ConnectionSettings,
    declared: Realm,
) -> Result<Realm> {
    with_scratch_db(server, move |scratch_settings| async move {
        let mut client = scratch_settings.connect().await?;
        materialize_realm(&mut client, &declared).await?;
        introspect::realm(&client).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_names_are_unique() {
        let a = scratch_db_name();
        let b = scratch_db_name();
        assert_ne!(a, b);
        assert!(a.starts_with("pg_migration_gen_tmp_"));
    }

    #[test]
    fn test_scratch_name_is_valid_identifier() {
        let name = scratch_db_name();
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(!name.chars().next().unwrap().is_ascii_digit());
    }
}
