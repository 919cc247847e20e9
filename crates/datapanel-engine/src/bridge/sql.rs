//! In-memory SQL over panel values
//!
//! Every relation becomes a temporary SQLite table named
//! `"DM_getPanel(i)"` and `DM_getPanel(i)` in the query is rewritten to that
//! quoted name. Relations that were not supplied are never created, so a
//! query over them fails with SQLite's own "no such table".
//!
//! Table shapes:
//! - array of objects: columns are the union of keys in first-seen order
//! - array of objects without any keys, or with any non-object element:
//!   one `value` column
//! - single object: one row
//! - anything else: one `value` column, one row

use super::{PanelRelation, SqlEngine};
use crate::error::EvalError;
use datapanel_model::SqlConnectorConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::{Map, Number, Value};

static PANEL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"DM_getPanel\s*\(\s*(\d+)\s*\)").expect("panel reference pattern is valid")
});

/// Rewrite panel references to quoted relation names
///
/// Returns the rewritten query and the referenced indices, deduplicated in
/// first-seen order.
///
/// # Errors
/// - `EvalError::Sql` if a referenced index does not fit in `usize`
pub fn rewrite_panel_refs(query: &str) -> Result<(String, Vec<usize>), EvalError> {
    let mut indices = Vec::new();
    for caps in PANEL_REF.captures_iter(query) {
        let index: usize = caps[1]
            .parse()
            .map_err(|_| EvalError::Sql(format!("invalid panel reference: {}", &caps[0])))?;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }
    let rewritten = PANEL_REF.replace_all(query, "\"DM_getPanel($1)\"").into_owned();
    Ok((rewritten, indices))
}

/// SQLite engine holding nothing but the supplied relations
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemorySqlEngine;

impl InMemorySqlEngine {
    /// Create the engine
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl SqlEngine for InMemorySqlEngine {
    async fn query(
        &self,
        _connection: &SqlConnectorConfig,
        query: &str,
        relations: Vec<PanelRelation>,
    ) -> Result<Value, EvalError> {
        let (rewritten, _) = rewrite_panel_refs(query)?;
        tokio::task::spawn_blocking(move || run_query(&rewritten, &relations))
            .await
            .map_err(|e| EvalError::Sql(format!("query task failed: {e}")))?
    }
}

fn run_query(query: &str, relations: &[PanelRelation]) -> Result<Value, EvalError> {
    let conn = Connection::open_in_memory().map_err(sql_error)?;
    for relation in relations {
        load_relation(&conn, relation)?;
    }

    let mut stmt = conn.prepare(query).map_err(sql_error)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let mut rows = stmt.query([]).map_err(sql_error)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(sql_error)? {
        let mut object = Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            let cell = row.get_ref(i).map_err(sql_error)?;
            object.insert(name.clone(), from_sql(cell));
        }
        out.push(Value::Object(object));
    }
    Ok(Value::Array(out))
}

fn load_relation(conn: &Connection, relation: &PanelRelation) -> Result<(), EvalError> {
    let (columns, rows) = tabulate(&relation.value);
    let table = quote_ident(&relation.table_name());

    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    conn.execute(
        &format!("CREATE TEMP TABLE {table} ({})", column_list.join(", ")),
        [],
    )
    .map_err(sql_error)?;

    if rows.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut insert = conn
        .prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))
        .map_err(sql_error)?;
    for row in rows {
        insert
            .execute(rusqlite::params_from_iter(row))
            .map_err(sql_error)?;
    }
    tracing::debug!(table = %relation.table_name(), "loaded panel relation");
    Ok(())
}

/// Column names and row cells for a panel value
fn tabulate(value: &Value) -> (Vec<String>, Vec<Vec<SqlValue>>) {
    let single_column = |cells: Vec<SqlValue>| {
        (
            vec!["value".to_string()],
            cells.into_iter().map(|c| vec![c]).collect(),
        )
    };

    match value {
        Value::Array(items)
            if items.iter().all(Value::is_object)
                && items.iter().any(|item| item.as_object().is_some_and(|m| !m.is_empty())) =>
        {
            let mut columns: Vec<String> = Vec::new();
            for item in items {
                if let Value::Object(map) = item {
                    for key in map.keys() {
                        if !columns.contains(key) {
                            columns.push(key.clone());
                        }
                    }
                }
            }
            let rows = items
                .iter()
                .map(|item| {
                    columns
                        .iter()
                        .map(|c| item.get(c).map_or(SqlValue::Null, to_sql))
                        .collect()
                })
                .collect();
            (columns, rows)
        }
        Value::Array(items) => single_column(items.iter().map(to_sql).collect()),
        Value::Object(map) if !map.is_empty() => (
            map.keys().cloned().collect(),
            vec![map.values().map(to_sql).collect()],
        ),
        other => single_column(vec![to_sql(other)]),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_error(e: rusqlite::Error) -> EvalError {
    EvalError::Sql(e.to_string())
}
