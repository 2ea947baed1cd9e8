use std::{env, path::Path, sync::Arc};

use libsql::{Builder, Connection, Database as LibSqlDatabase};
use thiserror::Error;
use tracing::debug;

const AUTH_TOKEN_VAR: &str = "LIBSQL_AUTH_TOKEN";

/// Shared handle to the rule, message and audit-log store.
#[derive(Clone)]
pub struct Database {
    inner: Arc<LibSqlDatabase>,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to build database: {0}")]
    Build(libsql::Error),
    #[error("failed to open connection: {0}")]
    Connect(libsql::Error),
    #[error("failed to execute statement: {0}")]
    Statement(libsql::Error),
    #[error("missing required {AUTH_TOKEN_VAR} for remote database")]
    MissingAuthToken,
}

impl Database {
    /// Open a local file, or a remote libsql/http(s) URL using `LIBSQL_AUTH_TOKEN`.
    pub async fn new(database_path: &Path) -> Result<Self, DbError> {
        let location = database_path.to_string_lossy().to_string();
        let inner = if is_remote(&location) {
            let auth_token = remote_auth_token()?;
            debug!(%location, "opening remote database");
            Builder::new_remote(location, auth_token).build().await
        } else {
            debug!(%location, "opening local database");
            Builder::new_local(location).build().await
        }
        .map_err(DbError::Build)?;

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub async fn connection(&self) -> Result<Connection, DbError> {
        let conn = self.inner.connect().map_err(DbError::Connect)?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(DbError::Statement)?;
        Ok(conn)
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query("SELECT 1", ())
            .await
            .map_err(DbError::Statement)?;
        rows.next().await.map_err(DbError::Statement)?;
        Ok(())
    }
}

fn remote_auth_token() -> Result<String, DbError> {
    env::var(AUTH_TOKEN_VAR)
        .ok()
        .filter(|token| !token.is_empty())
        .ok_or(DbError::MissingAuthToken)
}

fn is_remote(location: &str) -> bool {
    ["libsql://", "http://", "https://"]
        .iter()
        .any(|scheme| location.starts_with(scheme))
}
