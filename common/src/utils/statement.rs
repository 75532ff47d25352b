//! Statement classification and text helpers.
//!
//! Routing is decided lexically, not by parsing SQL. [`classify_statement`]
//! only looks at the first keyword, so reads that do not start with the
//! literal word `SELECT` (a `WITH` CTE, `TABLE t`, `VALUES`, `SHOW`,
//! `EXPLAIN`, a parenthesized select, a leading comment) are sent to the
//! primary. Callers that know better pass an explicit target.

use std::collections::BTreeMap;

use crate::errors::{AppError, AppResult};
use crate::models::connection::Target;
use crate::models::query::SqlValue;

/// Statement terminator used to split scripts.
pub const STATEMENT_TERMINATOR: char = ';';

/// Whether the trimmed statement starts with `SELECT`, in any case.
pub fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

/// Endpoint a statement goes to when no override is given.
pub fn classify_statement(sql: &str) -> Target {
    if is_select(sql) {
        Target::Replica
    } else {
        Target::Primary
    }
}

/// An explicit override wins; otherwise the statement is classified.
pub fn resolve_target(explicit: Option<Target>, sql: &str) -> Target {
    explicit.unwrap_or_else(|| classify_statement(sql))
}

/// Splits a script into statements.
///
/// Splits on every `;` (including one inside a string literal) and drops
/// fragments that are blank after trimming.
pub fn split_script(contents: &str) -> Vec<String> {
    contents
        .split(STATEMENT_TERMINATOR)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rewrites `:name` placeholders to `$n` in order of first appearance.
///
/// `::type` casts, quoted text and `--` comments are left untouched. Every
/// referenced name must have a value; unreferenced values are ignored.
pub fn bind_named(
    sql: &str,
    named: &BTreeMap<String, SqlValue>,
) -> AppResult<(String, Vec<SqlValue>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut order: Vec<String> = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = line_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
            {
                let end = ident_end(&chars, i + 1);
                let name: String = chars[i + 1..end].iter().collect();
                let position = match order.iter().position(|seen| *seen == name) {
                    Some(index) => index + 1,
                    None => {
                        order.push(name);
                        order.len()
                    }
                };
                out.push('$');
                out.push_str(&position.to_string());
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    let values = order
        .iter()
        .map(|name| {
            named
                .get(name)
                .cloned()
                .ok_or_else(|| AppError::Validation(format!("missing value for parameter :{name}")))
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok((out, values))
}

/// Renders the statement with `$n` placeholders replaced by literals.
///
/// Returns `None` when a placeholder has no matching value.
pub fn try_render(sql: &str, params: &[SqlValue]) -> Option<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = line_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' if chars.get(i + 1).is_some_and(char::is_ascii_digit) => {
                let mut end = i + 1;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let digits: String = chars[i + 1..end].iter().collect();
                let index: usize = digits.parse().ok()?;
                let value = index.checked_sub(1).and_then(|idx| params.get(idx))?;
                out.push_str(&value.to_sql_literal());
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Some(out)
}

/// Statement text sent to the server, with every `$n` replaced by the
/// literal of its value.
///
/// Literals reach the server untyped, so it infers each one from context
/// the same way it does for hand-written SQL: `NULL` into an integer
/// column, `'PENDING'` against an enum, `'2024-01-01'` against a
/// timestamp. Without parameters the text is sent unchanged.
pub fn inline_params(sql: &str, params: &[SqlValue]) -> AppResult<String> {
    if params.is_empty() {
        return Ok(sql.to_string());
    }
    try_render(sql, params).ok_or_else(|| {
        AppError::Validation(format!(
            "statement references a placeholder beyond the {} parameter(s) given",
            params.len()
        ))
    })
}

/// Statement text for the audit log: parameters inlined, or the raw text
/// annotated with the parameter list when inlining fails.
pub fn render_statement(sql: &str, params: &[SqlValue]) -> String {
    match try_render(sql, params) {
        Some(rendered) => rendered,
        None => {
            let listed: Vec<String> = params.iter().map(SqlValue::to_sql_literal).collect();
            format!("{sql} /* params: [{}] */", listed.join(", "))
        }
    }
}

fn line_end(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|c| *c == '\n')
        .map_or(chars.len(), |offset| from + offset)
}

fn ident_end(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(chars.len(), |offset| from + offset)
}
