//! Database backends.
//!
//! A [`Backend`] executes one already-routed statement against one endpoint.
//! [`PgBackend`] opens a fresh PostgreSQL connection for every call and
//! closes it afterwards; nothing is pooled or reused between calls.
//! Parameters are inlined as literals before the statement is sent, so the
//! server types them from context.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::connection::{ConnectionProfile, Target};
use common::models::query::{SqlValue, StatementResult};
use common::utils::inline_params;

use crate::decode::row_to_json;

/// Statement used to measure round-trip latency.
pub const PROBE_STATEMENT: &str = "SELECT 1";

/// Executes routed statements against an endpoint.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Connects to `target`, runs `sql` with `params` (`$n` placeholders),
    /// commits and disconnects.
    ///
    /// Returns rows when `want_rows` is set, the affected-row count otherwise.
    async fn run(
        &self,
        target: Target,
        sql: &str,
        params: &[SqlValue],
        want_rows: bool,
    ) -> AppResult<StatementResult>;

    /// Connects to `target` and runs a trivial round trip.
    async fn ping(&self, target: Target) -> AppResult<()>;
}

#[async_trait]
impl<T: Backend + ?Sized> Backend for Box<T> {
    async fn run(
        &self,
        target: Target,
        sql: &str,
        params: &[SqlValue],
        want_rows: bool,
    ) -> AppResult<StatementResult> {
        (**self).run(target, sql, params, want_rows).await
    }

    async fn ping(&self, target: Target) -> AppResult<()> {
        (**self).ping(target).await
    }
}

#[async_trait]
impl<T: Backend + ?Sized> Backend for std::sync::Arc<T> {
    async fn run(
        &self,
        target: Target,
        sql: &str,
        params: &[SqlValue],
        want_rows: bool,
    ) -> AppResult<StatementResult> {
        (**self).run(target, sql, params, want_rows).await
    }

    async fn ping(&self, target: Target) -> AppResult<()> {
        (**self).ping(target).await
    }
}

/// PostgreSQL backend with one connection per call.
#[derive(Debug, Clone)]
pub struct PgBackend {
    primary: PgConnectOptions,
    replica: PgConnectOptions,
}

impl PgBackend {
    pub fn new(primary: &ConnectionProfile, replica: &ConnectionProfile) -> Self {
        Self {
            primary: connect_options(primary),
            replica: connect_options(replica),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.primary, &config.replica)
    }

    fn options(&self, target: Target) -> &PgConnectOptions {
        match target {
            Target::Primary => &self.primary,
            Target::Replica => &self.replica,
        }
    }

    /// Any failure while connecting is a connectivity fault, including
    /// authentication errors reported by the server.
    async fn connect(&self, target: Target) -> AppResult<PgConnection> {
        PgConnection::connect_with(self.options(target))
            .await
            .map_err(|e| AppError::DatabaseConnection(format!("{target}: {e}")))
    }
}

fn connect_options(profile: &ConnectionProfile) -> PgConnectOptions {
    session_options(
        PgConnectOptions::new()
            .host(profile.host())
            .port(profile.port())
            .username(profile.user())
            .password(profile.password())
            .database(profile.database()),
    )
}

fn session_options(options: PgConnectOptions) -> PgConnectOptions {
    options
        // Inlined text literals only double `'`.
        .options([("standard_conforming_strings", "on")])
        // Statements are already logged by the gateway with the resolved endpoint.
        .disable_statement_logging()
}

async fn close(conn: PgConnection, target: Target) {
    if let Err(e) = conn.close().await {
        tracing::debug!(endpoint = %target, error = %e, "connection close failed");
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn run(
        &self,
        target: Target,
        sql: &str,
        params: &[SqlValue],
        want_rows: bool,
    ) -> AppResult<StatementResult> {
        let sql = inline_params(sql, params)?;
        let mut conn = self.connect(target).await?;
        let outcome = run_on(&mut conn, &sql, want_rows).await;
        close(conn, target).await;
        outcome
    }

    async fn ping(&self, target: Target) -> AppResult<()> {
        let mut conn = self.connect(target).await?;
        let outcome = sqlx::query(PROBE_STATEMENT)
            .fetch_one(&mut conn)
            .await
            .map(|_| ())
            .map_err(AppError::from);
        close(conn, target).await;
        outcome
    }
}

async fn run_on(conn: &mut PgConnection, sql: &str, want_rows: bool) -> AppResult<StatementResult> {
    let mut tx = conn.begin().await?;

    // Single-use connection.
    let query = sqlx::query(sql).persistent(false);
    let result = if want_rows {
        let rows = query.fetch_all(&mut *tx).await?;
        StatementResult::Rows(rows.iter().map(row_to_json).collect())
    } else {
        StatementResult::Affected(query.execute(&mut *tx).await?.rows_affected())
    };

    tx.commit().await?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_follow_profiles() {
        let primary = ConnectionProfile::new("db-main", 5432, "admin", "pw", "stock");
        let replica = ConnectionProfile::new("db-ro", 5433, "reader", "pw", "stock");
        let backend = PgBackend::new(&primary, &replica);

        assert_eq!(backend.options(Target::Primary).get_host(), "db-main");
        assert_eq!(backend.options(Target::Primary).get_port(), 5432);
        assert_eq!(backend.options(Target::Replica).get_host(), "db-ro");
        assert_eq!(backend.options(Target::Replica).get_username(), "reader");
        assert_eq!(backend.options(Target::Replica).get_database(), Some("stock"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connectivity_error() {
        // Port 1 on localhost refuses connections.
        let dead = ConnectionProfile::new("127.0.0.1", 1, "nobody", "", "none");
        let backend = PgBackend::new(&dead, &dead);

        let err = backend.ping(Target::Replica).await.unwrap_err();
        assert!(err.is_connectivity(), "{err}");
        let err = backend
            .run(Target::Primary, "SELECT 1", &[], true)
            .await
            .unwrap_err();
        assert!(err.is_connectivity(), "{err}");
    }

    #[tokio::test]
    async fn test_missing_parameter_is_rejected_before_connecting() {
        let dead = ConnectionProfile::new("127.0.0.1", 1, "nobody", "", "none");
        let backend = PgBackend::new(&dead, &dead);

        let err = backend
            .run(
                Target::Primary,
                "UPDATE items SET quantity = $2 WHERE id = $1",
                &[SqlValue::Int(1)],
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{err}");
    }

    /// Backend against the database named by `STOCKROUTE_TEST_PG`, a
    /// `postgres://` URL. `None` skips the test.
    fn live_backend() -> Option<PgBackend> {
        let url = std::env::var("STOCKROUTE_TEST_PG").ok()?;
        let options = session_options(url.parse::<PgConnectOptions>().ok()?);
        Some(PgBackend {
            primary: options.clone(),
            replica: options,
        })
    }

    #[tokio::test]
    async fn test_live_parameters_are_typed_by_the_server() {
        let Some(backend) = live_backend() else {
            return;
        };

        let result = backend
            .run(
                Target::Primary,
                "SELECT 1 + $1 AS total, now() > $2 AS later, $3 AS name, $4 - 1 AS delta",
                &[
                    SqlValue::Null,
                    SqlValue::Text("2020-01-01".into()),
                    SqlValue::Text("O'Brien\\".into()),
                    SqlValue::Int(-2),
                ],
                true,
            )
            .await
            .unwrap();
        let rows = result.rows().unwrap();
        assert!(rows[0]["total"].is_null());
        assert_eq!(rows[0]["later"], serde_json::json!(true));
        assert_eq!(rows[0]["name"], serde_json::json!("O'Brien\\"));
        assert_eq!(rows[0]["delta"], serde_json::json!(-3));
    }

    #[tokio::test]
    async fn test_live_null_and_text_reach_typed_columns() {
        let Some(backend) = live_backend() else {
            return;
        };

        // One connection per call, so the whole round trip is a single statement.
        let result = backend
            .run(
                Target::Primary,
                "WITH t(courier_id, created_at) AS (VALUES (5, TIMESTAMP '2021-06-01')) \
                 SELECT count(*) AS n FROM t WHERE courier_id IS DISTINCT FROM $1 AND created_at > $2",
                &[SqlValue::Null, SqlValue::Text("2020-01-01".into())],
                true,
            )
            .await
            .unwrap();
        assert_eq!(result.rows().unwrap()[0]["n"], serde_json::json!(1));
    }
}
