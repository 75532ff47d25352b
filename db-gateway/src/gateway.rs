//! Database gateway.
//!
//! Routes every statement to the primary or the replica, logs the rendered
//! statement with the resolved endpoint, and hands it to a [`Backend`].
//!
//! Guarantees are per statement only. Scripts run statement by statement
//! with no enclosing transaction, failures are never retried, and the
//! gateway never reconnects on its own.

use std::path::Path;
use std::time::{Duration, Instant};

use common::errors::{AppError, AppResult};
use common::models::connection::Target;
use common::models::monitor::EndpointHealth;
use common::models::query::{Params, ScriptReport, StatementRequest, StatementResult};
use common::utils::{bind_named, is_select, render_statement, resolve_target, split_script};

use crate::backend::{Backend, PgBackend};

/// A statement outcome together with the endpoint that served it.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub endpoint: Target,
    pub result: StatementResult,
    /// Wall time including connection setup.
    pub elapsed: Duration,
}

/// Routes statements between the primary and the replica.
///
/// Construct once and share it (`Arc<Gateway>`); it holds no mutable state.
pub struct Gateway<B = PgBackend> {
    backend: B,
}

impl<B: Backend> Gateway<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Executes one statement and returns its result.
    pub async fn execute(&self, request: StatementRequest) -> AppResult<StatementResult> {
        self.dispatch(request).await.map(|execution| execution.result)
    }

    /// Executes one statement, also reporting where it ran and how long it took.
    pub async fn dispatch(&self, request: StatementRequest) -> AppResult<Execution> {
        let StatementRequest {
            text,
            params,
            explicit_target,
            want_rows,
        } = request;

        let endpoint = resolve_target(explicit_target, &text);
        let (sql, values) = match params {
            Params::Positional(values) => (text, values),
            Params::Named(named) => bind_named(&text, &named)?,
        };
        let want_rows = want_rows.unwrap_or_else(|| is_select(&sql));

        tracing::info!(
            endpoint = %endpoint,
            statement = %render_statement(&sql, &values),
            "executing statement"
        );

        let started = Instant::now();
        match self.backend.run(endpoint, &sql, &values, want_rows).await {
            Ok(result) => {
                let elapsed = started.elapsed();
                tracing::debug!(
                    endpoint = %endpoint,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "statement committed"
                );
                Ok(Execution {
                    endpoint,
                    result,
                    elapsed,
                })
            }
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "statement failed");
                Err(e)
            }
        }
    }

    /// Runs a `;`-separated script file.
    ///
    /// Each statement is routed and committed on its own. When statement `k`
    /// fails, statements before it stay committed, the rest never run, and
    /// the failure is returned as [`AppError::Script`] with 1-based `index`.
    pub async fn execute_script(
        &self,
        path: impl AsRef<Path>,
        explicit_target: Option<Target>,
    ) -> AppResult<ScriptReport> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            tracing::error!(path = %shown, error = %e, "cannot read script");
            AppError::Io(format!("{shown}: {e}"))
        })?;
        let statements = split_script(&contents);
        tracing::info!(path = %shown, statements = statements.len(), "running script");

        for (offset, statement) in statements.iter().enumerate() {
            let request = StatementRequest::new(statement.as_str())
                .with_target(explicit_target)
                .with_want_rows(Some(false));
            if let Err(e) = self.execute(request).await {
                let index = offset + 1;
                tracing::error!(
                    path = %shown,
                    index,
                    committed = offset,
                    error = %e,
                    "script aborted"
                );
                return Err(AppError::Script {
                    path: shown,
                    index,
                    source: Box::new(e),
                });
            }
        }

        tracing::info!(path = %shown, statements = statements.len(), "script executed");
        Ok(ScriptReport {
            path: shown,
            statements: statements.len(),
        })
    }

    /// Probes one endpoint. Never fails: faults become `reachable = false`.
    pub async fn check_health(&self, target: Target) -> EndpointHealth {
        let started = Instant::now();
        match self.backend.ping(target).await {
            Ok(()) => EndpointHealth::reachable(target, round_ms(started.elapsed())),
            Err(e) => {
                tracing::warn!(endpoint = %target, error = %e, "endpoint unreachable");
                EndpointHealth::unreachable(target)
            }
        }
    }

    /// `run_query(text, explicit_replica)`: rows for `SELECT`, a count otherwise.
    pub async fn run_query(
        &self,
        text: &str,
        explicit_replica: Option<bool>,
    ) -> AppResult<StatementResult> {
        self.execute(StatementRequest::new(text).with_target(Target::from_replica_flag(explicit_replica)))
            .await
    }

    /// `run_script(path, explicit_replica)`.
    pub async fn run_script(
        &self,
        path: impl AsRef<Path>,
        explicit_replica: Option<bool>,
    ) -> AppResult<ScriptReport> {
        self.execute_script(path, Target::from_replica_flag(explicit_replica))
            .await
    }

    /// `check_connection(replica)`: `(reachable, latency_ms)`.
    pub async fn check_connection(&self, replica: bool) -> (bool, Option<f64>) {
        let target = if replica {
            Target::Replica
        } else {
            Target::Primary
        };
        self.check_health(target).await.as_pair()
    }
}

/// Milliseconds rounded to two decimals.
fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
