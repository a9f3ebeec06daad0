//! smw-db
//!
//! Authoritative-store access: connection setup, the watermark delta query,
//! and LISTEN channel subscription. Read-only; nothing here writes to the
//! store.

mod delta;
mod error;

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgListener, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

pub use delta::{DeltaQuery, PgDeltaQuery, DELTA_SQL};
pub use error::StoreError;

pub const ENV_DB_URL: &str = "SMW_DATABASE_URL";

/// Discrete connection parameters for the authoritative store.
///
/// **The password is redacted in `Debug` output.**
#[derive(Clone)]
pub struct StoreConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for StoreConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl StoreConnectParams {
    fn connect_options(&self) -> PgConnectOptions {
        let opts = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        let opts = match &self.password {
            Some(pw) => opts.password(pw),
            None => opts,
        };
        utc_session(opts)
    }
}

/// Store timestamps may be `timestamp` (no zone); pin the session to UTC so
/// they compare against bound UTC values without a local-zone shift.
fn utc_session(opts: PgConnectOptions) -> PgConnectOptions {
    opts.options([("timezone", "UTC")])
}

/// Connect a pool from discrete parameters.
pub async fn connect(params: &StoreConnectParams) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(params.max_connections)
        .acquire_timeout(params.connect_timeout)
        .connect_with(params.connect_options())
        .await
        .map_err(StoreError::Connect)?;

    info!(
        host = %params.host,
        port = params.port,
        database = %params.database,
        user = %params.user,
        "connected to authoritative store"
    );
    Ok(pool)
}

/// Connect a pool from a `postgres://` URL.
pub async fn connect_url(
    url: &str,
    max_connections: u32,
    connect_timeout: Duration,
) -> Result<PgPool, StoreError> {
    let opts = PgConnectOptions::from_str(url).map_err(StoreError::Connect)?;
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect_with(utc_session(opts))
        .await
        .map_err(StoreError::Connect)?;

    info!("connected to authoritative store via {ENV_DB_URL}");
    Ok(pool)
}

/// Connectivity + schema presence check.
pub async fn status(pool: &PgPool) -> Result<DbStatus, StoreError> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .map_err(StoreError::Query)?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_name = 'systemmetadata'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(StoreError::Query)?;

    Ok(DbStatus {
        ok: one == 1,
        has_systemmetadata_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_systemmetadata_table: bool,
}

/// Open a dedicated LISTEN connection on `channel`.
///
/// The listener holds its own connection from the pool's options; it does not
/// consume a pooled connection used by the delta query.
pub async fn subscribe(pool: &PgPool, channel: &str) -> Result<PgListener, StoreError> {
    let mut listener = PgListener::connect_with(pool)
        .await
        .map_err(|source| StoreError::Listen {
            channel: channel.to_string(),
            source,
        })?;
    listener
        .listen(channel)
        .await
        .map_err(|source| StoreError::Listen {
            channel: channel.to_string(),
            source,
        })?;

    info!(channel, "listening for store change notifications");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let params = StoreConnectParams {
            host: "localhost".to_string(),
            port: 5433,
            database: "metacat".to_string(),
            user: "dataone_readonly".to_string(),
            password: Some("hunter2-not-for-logs".to_string()),
            max_connections: 2,
            connect_timeout: Duration::from_secs(5),
        };
        let dbg = format!("{params:?}");
        assert!(dbg.contains("<REDACTED>"));
        assert!(!dbg.contains("hunter2"));
    }
}
