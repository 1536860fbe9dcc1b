//! Statement builders for the table-oriented operations.
//!
//! Only bind *values* are parameterized. Table names, column names and
//! where-clause text are spliced into the statement verbatim and must come
//! from trusted code; nothing here quotes or sanitizes them.
//!
//! On PostgreSQL placeholders are numbered. A caller-supplied where clause
//! for [`update`] continues the numbering after the SET binds: with two
//! columns, the first where bind is `$3`.

use crate::error::{DbError, DbResult};
use crate::models::{BindValue, ColumnValues, DatabaseType, OutKind, ProcedureArg, Row};

/// Render `count` placeholders starting at 1-based `start`.
pub fn placeholders(db: DatabaseType, start: usize, count: usize) -> Vec<String> {
    (start..start + count).map(|n| db.placeholder(n)).collect()
}

fn require_table(table: &str) -> DbResult<&str> {
    let table = table.trim();
    if table.is_empty() {
        return Err(DbError::invalid_input("Table name cannot be empty"));
    }
    Ok(table)
}

fn require_where<'a>(where_clause: &'a str, operation: &str) -> DbResult<&'a str> {
    let where_clause = where_clause.trim();
    if where_clause.is_empty() {
        return Err(DbError::invalid_input(format!(
            "{operation} requires a where clause"
        )));
    }
    Ok(where_clause)
}

fn require_columns(values: &ColumnValues, operation: &str) -> DbResult<()> {
    if values.is_empty() {
        return Err(DbError::invalid_input(format!(
            "{operation} requires at least one column"
        )));
    }
    Ok(())
}

/// `INSERT INTO t (a, b) VALUES (?, ?)`, with `RETURNING col` where supported.
///
/// MySQL has no RETURNING clause; the generated key is read from the driver's
/// last insert id instead, so `returning` only affects the other backends.
pub fn insert(
    db: DatabaseType,
    table: &str,
    values: &ColumnValues,
    returning: Option<&str>,
) -> DbResult<String> {
    let table = require_table(table)?;
    require_columns(values, "insert")?;

    let columns: Vec<&str> = values.columns().collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders(db, 1, values.len()).join(", ")
    );

    if let Some(column) = returning.map(str::trim).filter(|c| !c.is_empty()) {
        if db.supports_returning() {
            sql.push_str(" RETURNING ");
            sql.push_str(column);
        }
    }
    Ok(sql)
}

/// `UPDATE t SET a = ?, b = ? WHERE <where_clause>`.
pub fn update(
    db: DatabaseType,
    table: &str,
    values: &ColumnValues,
    where_clause: &str,
) -> DbResult<String> {
    let table = require_table(table)?;
    require_columns(values, "update")?;
    let where_clause = require_where(where_clause, "update")?;

    let assignments: Vec<String> = values
        .columns()
        .zip(placeholders(db, 1, values.len()))
        .map(|(column, placeholder)| format!("{column} = {placeholder}"))
        .collect();

    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments.join(", "),
        where_clause
    ))
}

pub fn delete(table: &str, where_clause: &str) -> DbResult<String> {
    let table = require_table(table)?;
    let where_clause = require_where(where_clause, "delete")?;
    Ok(format!("DELETE FROM {table} WHERE {where_clause}"))
}

/// `SELECT COUNT(*) AS count FROM t [WHERE ...]`.
pub fn count(table: &str, where_clause: Option<&str>) -> DbResult<String> {
    let table = require_table(table)?;
    match where_clause {
        Some(clause) => {
            let clause = require_where(clause, "count")?;
            Ok(format!("SELECT COUNT(*) AS count FROM {table} WHERE {clause}"))
        }
        None => Ok(format!("SELECT COUNT(*) AS count FROM {table}")),
    }
}

pub fn truncate(db: DatabaseType, table: &str) -> DbResult<String> {
    let table = require_table(table)?;
    Ok(match db {
        DatabaseType::SQLite => format!("DELETE FROM {table}"),
        DatabaseType::PostgreSQL | DatabaseType::MySQL => format!("TRUNCATE TABLE {table}"),
    })
}

/// A stored procedure invocation ready to run on one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    /// The CALL statement
    pub sql: String,
    /// Input binds in placeholder order
    pub binds: Vec<BindValue>,
    /// Result keys of the output slots, in argument order
    pub output_keys: Vec<String>,
    /// Statement that reads the output slots back (MySQL session variables)
    pub output_sql: Option<String>,
}

impl ProcedureCall {
    /// Label the values of an output row with the output keys, by position.
    pub fn label_outputs(&self, row: Row) -> Row {
        self.output_keys
            .iter()
            .cloned()
            .zip(row.into_iter().map(|(_, value)| value))
            .collect()
    }

    pub fn has_outputs(&self) -> bool {
        !self.output_keys.is_empty()
    }
}

fn output_key(arg: &ProcedureArg, position: usize) -> String {
    arg.name.clone().unwrap_or_else(|| format!("out{position}"))
}

fn require_routine(name: &str) -> DbResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::invalid_input("Procedure name cannot be empty"));
    }
    Ok(name)
}

/// Build the invocation of stored routine `name`.
///
/// PostgreSQL passes output slots as typed NULL arguments and returns their
/// values as a single row. MySQL writes them into session variables that are
/// selected back on the same connection.
pub fn procedure_call(
    db: DatabaseType,
    name: &str,
    args: &[ProcedureArg],
) -> DbResult<ProcedureCall> {
    let name = require_routine(name)?;
    match db {
        DatabaseType::PostgreSQL => Ok(postgres_call(name, args)),
        DatabaseType::MySQL => Ok(mysql_call(name, args)),
        DatabaseType::SQLite => Err(DbError::unsupported("stored procedure call", db)),
    }
}

fn postgres_out_type(kind: OutKind) -> &'static str {
    match kind {
        OutKind::Integer => "bigint",
        OutKind::Float => "double precision",
        OutKind::Text => "text",
        OutKind::Timestamp => "timestamptz",
    }
}

fn postgres_call(name: &str, args: &[ProcedureArg]) -> ProcedureCall {
    let mut binds = Vec::new();
    let mut output_keys = Vec::new();
    let mut rendered = Vec::with_capacity(args.len());

    for (idx, arg) in args.iter().enumerate() {
        let value = match &arg.value {
            BindValue::Out(kind) => {
                output_keys.push(output_key(arg, idx + 1));
                format!("NULL::{}", postgres_out_type(*kind))
            }
            other => {
                binds.push(other.clone());
                DatabaseType::PostgreSQL.placeholder(binds.len())
            }
        };
        rendered.push(match &arg.name {
            Some(param) => format!("{param} => {value}"),
            None => value,
        });
    }

    ProcedureCall {
        sql: format!("CALL {}({})", name, rendered.join(", ")),
        binds,
        output_keys,
        output_sql: None,
    }
}

fn mysql_out_type(kind: OutKind) -> &'static str {
    match kind {
        OutKind::Integer => "SIGNED",
        OutKind::Float => "DOUBLE",
        OutKind::Text => "CHAR",
        OutKind::Timestamp => "DATETIME",
    }
}

fn mysql_call(name: &str, args: &[ProcedureArg]) -> ProcedureCall {
    let mut binds = Vec::new();
    let mut output_keys = Vec::new();
    let mut selects = Vec::new();
    let mut rendered = Vec::with_capacity(args.len());

    for (idx, arg) in args.iter().enumerate() {
        match &arg.value {
            BindValue::Out(kind) => {
                let variable = format!("@_pooldb_out_{}", idx + 1);
                let key = output_key(arg, idx + 1);
                selects.push(format!(
                    "CAST({} AS {}) AS `{}`",
                    variable,
                    mysql_out_type(*kind),
                    key.replace('`', "``")
                ));
                output_keys.push(key);
                rendered.push(variable);
            }
            other => {
                binds.push(other.clone());
                rendered.push("?".to_string());
            }
        }
    }

    let output_sql = (!selects.is_empty()).then(|| format!("SELECT {}", selects.join(", ")));
    ProcedureCall {
        sql: format!("CALL {}({})", name, rendered.join(", ")),
        binds,
        output_keys,
        output_sql,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_values() -> ColumnValues {
        ColumnValues::new()
            .with("customer", "acme")
            .with("total", 12.5)
    }

    #[test]
    fn test_insert_with_returning() {
        let sql = insert(DatabaseType::PostgreSQL, "orders", &order_values(), Some("id")).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO orders (customer, total) VALUES ($1, $2) RETURNING id"
        );
    }

    #[test]
    fn test_insert_mysql_ignores_returning() {
        let sql = insert(DatabaseType::MySQL, "orders", &order_values(), Some("id")).unwrap();
        assert_eq!(sql, "INSERT INTO orders (customer, total) VALUES (?, ?)");
    }

    #[test]
    fn test_insert_requires_columns() {
        let err = insert(DatabaseType::SQLite, "orders", &ColumnValues::new(), None).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_update_numbers_set_placeholders_first() {
        let sql = update(DatabaseType::PostgreSQL, "orders", &order_values(), "id = $3").unwrap();
        assert_eq!(
            sql,
            "UPDATE orders SET customer = $1, total = $2 WHERE id = $3"
        );
        let sql = update(DatabaseType::SQLite, "orders", &order_values(), "id = ?").unwrap();
        assert_eq!(sql, "UPDATE orders SET customer = ?, total = ? WHERE id = ?");
    }

    #[test]
    fn test_update_and_delete_require_where_clause() {
        assert!(update(DatabaseType::SQLite, "orders", &order_values(), "  ").is_err());
        assert!(delete("orders", "").is_err());
        assert_eq!(
            delete("orders", "id = ?").unwrap(),
            "DELETE FROM orders WHERE id = ?"
        );
    }

    #[test]
    fn test_count_statements() {
        assert_eq!(
            count("orders", None).unwrap(),
            "SELECT COUNT(*) AS count FROM orders"
        );
        assert_eq!(
            count("orders", Some("status = ?")).unwrap(),
            "SELECT COUNT(*) AS count FROM orders WHERE status = ?"
        );
        assert!(count(" ", None).is_err());
    }

    #[test]
    fn test_truncate_per_backend() {
        assert_eq!(
            truncate(DatabaseType::SQLite, "orders").unwrap(),
            "DELETE FROM orders"
        );
        assert_eq!(
            truncate(DatabaseType::MySQL, "orders").unwrap(),
            "TRUNCATE TABLE orders"
        );
    }

    #[test]
    fn test_postgres_procedure_call() {
        let args = vec![
            ProcedureArg::positional(7i64),
            ProcedureArg::named("total", BindValue::out(OutKind::Float)),
            ProcedureArg::positional(BindValue::out(OutKind::Integer)),
        ];
        let call = procedure_call(DatabaseType::PostgreSQL, "order_total", &args).unwrap();
        assert_eq!(
            call.sql,
            "CALL order_total($1, total => NULL::double precision, NULL::bigint)"
        );
        assert_eq!(call.binds, vec![BindValue::Int(7)]);
        assert_eq!(call.output_keys, vec!["total", "out3"]);
        assert!(call.output_sql.is_none());
    }

    #[test]
    fn test_mysql_procedure_call() {
        let args = vec![
            ProcedureArg::positional("acme"),
            ProcedureArg::named("order_id", BindValue::out(OutKind::Integer)),
        ];
        let call = procedure_call(DatabaseType::MySQL, "create_order", &args).unwrap();
        assert_eq!(call.sql, "CALL create_order(?, @_pooldb_out_2)");
        assert_eq!(
            call.output_sql.as_deref(),
            Some("SELECT CAST(@_pooldb_out_2 AS SIGNED) AS `order_id`")
        );
    }

    #[test]
    fn test_sqlite_procedure_unsupported() {
        let err = procedure_call(DatabaseType::SQLite, "anything", &[]).unwrap_err();
        assert!(matches!(err, DbError::Unsupported { .. }));
    }

    #[test]
    fn test_label_outputs_by_position() {
        let call = procedure_call(
            DatabaseType::PostgreSQL,
            "p",
            &[ProcedureArg::named("n", BindValue::out(OutKind::Integer))],
        )
        .unwrap();
        let mut row = Row::new();
        row.insert("whatever_pg_called_it".to_string(), json!(42));
        let outputs = call.label_outputs(row);
        assert_eq!(outputs.get("n"), Some(&json!(42)));
    }
}
