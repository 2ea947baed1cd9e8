//! Embedded schema for rules, the message mirror and the audit log.

use std::collections::HashSet;

use libsql::{Connection, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{Database, DbError};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const SCHEMA: &[Migration] = &[Migration {
    version: "001_triage",
    sql: include_str!("../../../migrations/001_triage.sql"),
}];

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (\
    version TEXT PRIMARY KEY, \
    applied_at TEXT NOT NULL)";

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("migration {version} failed: {source}")]
    Apply {
        version: &'static str,
        #[source]
        source: libsql::Error,
    },
    #[error("migration ledger error: {0}")]
    Ledger(#[from] libsql::Error),
}

pub async fn run_migrations(db: &Database) -> Result<(), MigrationError> {
    let conn = db.connection().await?;
    let applied = apply_pending(&conn, SCHEMA).await?;
    if applied > 0 {
        info!(applied, "database schema upgraded");
    }
    Ok(())
}

async fn applied_versions(conn: &Connection) -> Result<HashSet<String>, libsql::Error> {
    conn.execute(CREATE_LEDGER, ()).await?;

    let mut versions = HashSet::new();
    let mut rows = conn.query("SELECT version FROM schema_migrations", ()).await?;
    while let Some(row) = rows.next().await? {
        versions.insert(row.get::<String>(0)?);
    }
    Ok(versions)
}

/// Apply every migration missing from the ledger, each inside its own
/// transaction. Returns how many were applied.
async fn apply_pending(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    let done = applied_versions(conn).await?;
    let mut applied = 0;

    for migration in migrations.iter().filter(|m| !done.contains(m.version)) {
        debug!(version = migration.version, "applying migration");
        apply_one(conn, migration)
            .await
            .map_err(|source| MigrationError::Apply {
                version: migration.version,
                source,
            })?;
        applied += 1;
    }

    Ok(applied)
}

async fn apply_one(conn: &Connection, migration: &Migration) -> Result<(), libsql::Error> {
    let tx = conn.transaction().await?;
    tx.execute_batch(migration.sql).await?;
    tx.execute(
        "INSERT INTO schema_migrations (version, applied_at) \
         VALUES (?1, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))",
        params![migration.version],
    )
    .await?;
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn migrated() -> (Database, Connection, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(&dir.path().join("triage.sqlite"))
            .await
            .expect("create db");
        run_migrations(&db).await.expect("migrations succeed");
        let conn = db.connection().await.expect("open connection");
        (db, conn, dir)
    }

    async fn first_row(conn: &Connection, sql: &str) -> libsql::Row {
        let mut rows = conn.query(sql, ()).await.expect("query");
        rows.next().await.expect("row result").expect("row")
    }

    async fn count(conn: &Connection, sql: &str) -> i64 {
        first_row(conn, sql).await.get::<i64>(0).expect("count")
    }

    async fn text(conn: &Connection, sql: &str) -> String {
        first_row(conn, sql).await.get::<String>(0).expect("text")
    }

    async fn columns(conn: &Connection, table: &str) -> HashMap<String, bool> {
        let mut rows = conn
            .query(&format!("PRAGMA table_info({table})"), ())
            .await
            .expect("pragma table_info");
        let mut not_null = HashMap::new();
        while let Some(row) = rows.next().await.expect("row result") {
            let name: String = row.get(1).expect("name");
            let flag: i64 = row.get(3).expect("notnull");
            not_null.insert(name, flag == 1);
        }
        not_null
    }

    #[tokio::test]
    async fn schema_creates_every_engine_table() {
        let (_db, conn, _dir) = migrated().await;

        for table in ["label_rules", "assignee_rules", "messages", "audit_log"] {
            let found = count(
                &conn,
                &format!("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{table}'"),
            )
            .await;
            assert_eq!(found, 1, "{table} should exist");
        }

        let applied_at = text(
            &conn,
            "SELECT applied_at FROM schema_migrations WHERE version = '001_triage'",
        )
        .await;
        assert!(applied_at.contains('T') && applied_at.ends_with('Z'), "got {applied_at}");
    }

    #[tokio::test]
    async fn second_run_applies_nothing() {
        let (db, conn, _dir) = migrated().await;

        run_migrations(&db).await.expect("second run");
        let recorded = count(&conn, "SELECT COUNT(*) FROM schema_migrations").await;
        assert_eq!(recorded, 1);
        assert_eq!(apply_pending(&conn, SCHEMA).await.expect("noop"), 0);
    }

    #[tokio::test]
    async fn broken_migration_leaves_no_trace() {
        let (_db, conn, _dir) = migrated().await;
        let broken = [Migration {
            version: "002_broken",
            sql: "CREATE TABLE half_done(id INTEGER);\nNOT SQL AT ALL;",
        }];

        let err = apply_pending(&conn, &broken).await.expect_err("should fail");
        assert!(matches!(err, MigrationError::Apply { version: "002_broken", .. }));

        let leftover = count(
            &conn,
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'half_done'",
        )
        .await;
        let recorded = count(
            &conn,
            "SELECT COUNT(*) FROM schema_migrations WHERE version = '002_broken'",
        )
        .await;
        assert_eq!((leftover, recorded), (0, 0));
    }

    #[tokio::test]
    async fn optional_columns_are_nullable() {
        let (_db, conn, _dir) = migrated().await;

        let messages = columns(&conn, "messages").await;
        assert_eq!(messages.get("sender_email"), Some(&false));
        assert_eq!(messages.get("assignee_email"), Some(&false));
        assert_eq!(messages.get("labels_json"), Some(&true));

        let audit = columns(&conn, "audit_log").await;
        assert_eq!(audit.get("actor_email"), Some(&true));
        assert_eq!(audit.get("label"), Some(&false));
        assert_eq!(audit.get("metadata_json"), Some(&false));

        let assignee_rules = columns(&conn, "assignee_rules").await;
        assert_eq!(assignee_rules.get("priority"), Some(&true));
        assert_eq!(assignee_rules.get("updated_at"), Some(&false));
    }
}
