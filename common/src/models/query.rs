//! Statement models.
//!
//! A [`StatementRequest`] is built per call and dropped after execution; a
//! [`StatementResult`] is either materialized rows or an affected-row count.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::models::connection::Target;

/// One result row: column name to value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Only constructed from Rust; JSON strings always arrive as `Text`.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Renders the value as a SQL literal.
    ///
    /// Text is quoted with `'` doubled and assumes
    /// `standard_conforming_strings = on`. Negative numbers get a leading
    /// space so `-$1` never renders as a `--` comment.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Int(v) if *v < 0 => format!(" {v}"),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) if v.is_nan() => "'NaN'".to_string(),
            SqlValue::Float(v) if v.is_infinite() && *v > 0.0 => "'Infinity'".to_string(),
            SqlValue::Float(v) if v.is_infinite() => "'-Infinity'".to_string(),
            SqlValue::Float(v) if *v < 0.0 => format!(" {v}"),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            SqlValue::Timestamp(v) => format!("'{}'", v.to_rfc3339()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Bound parameters: `$n` positional or `:name` named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<SqlValue>),
    Named(BTreeMap<String, SqlValue>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::Positional(values) => values.is_empty(),
            Params::Named(values) => values.is_empty(),
        }
    }
}

/// A single statement to run through the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRequest {
    pub text: String,
    pub params: Params,
    /// Overrides statement classification when set.
    pub explicit_target: Option<Target>,
    /// `None` materializes rows only for statements classified as `SELECT`.
    pub want_rows: Option<bool>,
}

impl StatementRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::default(),
            explicit_target: None,
            want_rows: None,
        }
    }

    /// Appends a positional parameter.
    ///
    /// Switches named parameters, if any, back to an empty positional list.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        match &mut self.params {
            Params::Positional(values) => values.push(value.into()),
            Params::Named(_) => self.params = Params::Positional(vec![value.into()]),
        }
        self
    }

    /// Sets a named parameter referenced as `:name` in the text.
    pub fn bind_named(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        match &mut self.params {
            Params::Named(values) => {
                values.insert(name.into(), value.into());
            }
            Params::Positional(_) => {
                let mut values = BTreeMap::new();
                values.insert(name.into(), value.into());
                self.params = Params::Named(values);
            }
        }
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Pins the statement to an endpoint regardless of its text.
    pub fn on(mut self, target: Target) -> Self {
        self.explicit_target = Some(target);
        self
    }

    pub fn with_target(mut self, target: Option<Target>) -> Self {
        self.explicit_target = target;
        self
    }

    /// Materializes rows, e.g. for `INSERT ... RETURNING`.
    pub fn fetch(mut self) -> Self {
        self.want_rows = Some(true);
        self
    }

    pub fn with_want_rows(mut self, want_rows: Option<bool>) -> Self {
        self.want_rows = want_rows;
        self
    }
}

/// Outcome of a statement: rows for reads, a count for writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementResult {
    Rows(Vec<Row>),
    Affected(u64),
}

impl StatementResult {
    /// Rows, or `None` for a count result.
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            StatementResult::Rows(rows) => Some(rows),
            StatementResult::Affected(_) => None,
        }
    }

    /// Affected rows, or `None` for a row result.
    pub fn affected(&self) -> Option<u64> {
        match self {
            StatementResult::Rows(_) => None,
            StatementResult::Affected(count) => Some(*count),
        }
    }

    /// Consumes the result, failing if it carries a count instead of rows.
    pub fn into_rows(self) -> AppResult<Vec<Row>> {
        match self {
            StatementResult::Rows(rows) => Ok(rows),
            StatementResult::Affected(_) => Err(AppError::Internal(
                "expected rows, statement returned an affected-row count".into(),
            )),
        }
    }

    /// Consumes the result, failing if it carries rows instead of a count.
    pub fn into_affected(self) -> AppResult<u64> {
        match self {
            StatementResult::Affected(count) => Ok(count),
            StatementResult::Rows(_) => Err(AppError::Internal(
                "expected an affected-row count, statement returned rows".into(),
            )),
        }
    }

    /// Deserializes every row into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> AppResult<Vec<T>> {
        self.into_rows()?.into_iter().map(decode_row).collect()
    }

    /// Deserializes the first row into `T`, if any.
    pub fn decode_first<T: DeserializeOwned>(self) -> AppResult<Option<T>> {
        self.into_rows()?.into_iter().next().map(decode_row).transpose()
    }
}

/// Deserializes one row into `T`.
pub fn decode_row<T: DeserializeOwned>(row: Row) -> AppResult<T> {
    serde_json::from_value(serde_json::Value::Object(row))
        .map_err(|e| AppError::Internal(format!("unexpected row shape: {e}")))
}

/// Request body for running an ad-hoc statement.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// SQL statement to execute.
    #[validate(length(min = 1, message = "SQL statement is required"))]
    pub sql: String,

    /// `[...]` for `$n` placeholders or `{...}` for `:name` placeholders.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Params,

    /// `true` forces the replica, `false` the primary; omitted classifies the text.
    #[serde(default)]
    pub replica: Option<bool>,

    /// Whether to return rows; omitted returns rows only for `SELECT`.
    #[serde(default)]
    pub fetch: Option<bool>,
}

impl QueryRequest {
    pub fn into_statement(self) -> StatementRequest {
        StatementRequest::new(self.sql)
            .with_params(self.params)
            .with_target(Target::from_replica_flag(self.replica))
            .with_want_rows(self.fetch)
    }
}

/// Result of an ad-hoc statement.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    /// Endpoint that served the statement.
    pub endpoint: Target,

    /// `{"rows": [...]}` or `{"affected": n}`.
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub result: StatementResult,

    /// Execution time in milliseconds, connection setup included.
    pub execution_time_ms: u64,
}

/// Request body for running a script file.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ScriptRequest {
    /// Path of the script on the service host.
    #[validate(length(min = 1, message = "Script path is required"))]
    pub path: String,

    /// `true` forces the replica, `false` the primary; omitted classifies each statement.
    #[serde(default)]
    pub replica: Option<bool>,
}

/// Summary of a completed script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScriptReport {
    pub path: String,
    /// Number of statements executed and committed.
    pub statements: usize,
}
