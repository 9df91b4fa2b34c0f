//! Evaluation of table selects over JSON records.
//!
//! A select runs as a fixed pipeline:
//!
//! ```text
//! records -> filter (WHERE) -> sort (ORDER BY) -> project -> offset/limit
//! ```
//!
//! Column types are inferred from the whole table rather than the filtered
//! rows, so Describe and Execute always agree on the row shape.

use std::cmp::Ordering;

use serde_json::Value;

use super::{Cell, Column, QueryError, QueryResult};
use crate::protocol::type_oid;
use crate::sql::{CompareOp, Condition, Literal, Projection, Select};
use crate::storage::Record;

/// One output column and where its values come from.
#[derive(Debug)]
enum Output {
    Field { source: String, column: Column },
    Count(Column),
}

impl Output {
    fn column(&self) -> &Column {
        match self {
            Output::Field { column, .. } | Output::Count(column) => column,
        }
    }
}

/// Runs `select` over `records`.
pub(crate) fn execute(select: &Select, records: &[Record]) -> Result<QueryResult, QueryError> {
    let outputs = resolve_outputs(select, records)?;

    let mut matched: Vec<&Record> = records
        .iter()
        .filter(|record| select.filters.iter().all(|cond| matches(record, cond)))
        .collect();

    if let Some(order) = &select.order_by {
        matched.sort_by(|a, b| {
            let ordering = compare_nullable(a.get(&order.column), b.get(&order.column));
            if order.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let rows: Vec<Vec<Cell>> = if let [Output::Count(_)] = outputs.as_slice() {
        vec![vec![Cell::Text(matched.len().to_string())]]
    } else {
        matched
            .iter()
            .map(|record| {
                outputs
                    .iter()
                    .map(|output| match output {
                        Output::Field { source, .. } => render(record.get(source)),
                        Output::Count(_) => Cell::Null,
                    })
                    .collect()
            })
            .collect()
    };

    let rows: Vec<Vec<Cell>> = rows
        .into_iter()
        .skip(select.offset)
        .take(select.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(QueryResult::rows(
        outputs.into_iter().map(|o| o.column().clone()).collect(),
        rows,
    ))
}

/// Row shape of `select` over `records` without evaluating it.
pub(crate) fn describe(select: &Select, records: &[Record]) -> Result<Vec<Column>, QueryError> {
    Ok(resolve_outputs(select, records)?
        .into_iter()
        .map(|o| o.column().clone())
        .collect())
}

/// Column names of a table in first-seen order across its records.
pub(crate) fn table_columns(records: &[Record]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }
    names
}

/// Type OID of a column, inferred from its first non-null value.
pub(crate) fn infer_type(records: &[Record], column: &str) -> u32 {
    let first = records
        .iter()
        .filter_map(|record| record.get(column))
        .find(|value| !value.is_null());
    match first {
        Some(Value::Bool(_)) => type_oid::BOOL,
        Some(Value::Number(n)) if n.is_f64() => type_oid::FLOAT8,
        Some(Value::Number(_)) => type_oid::INT8,
        Some(Value::Array(_) | Value::Object(_)) => type_oid::JSON,
        Some(Value::String(_)) | Some(Value::Null) | None => type_oid::TEXT,
    }
}

/// SQL name of an inferred type, as `information_schema.columns` reports it.
pub(crate) fn type_name(oid: u32) -> &'static str {
    match oid {
        type_oid::BOOL => "boolean",
        type_oid::INT4 => "integer",
        type_oid::INT8 => "bigint",
        type_oid::FLOAT8 => "double precision",
        type_oid::NUMERIC => "numeric",
        type_oid::JSON => "json",
        _ => "text",
    }
}

/// Renders a JSON value in PostgreSQL text format.
pub(crate) fn render(value: Option<&Value>) -> Cell {
    match value {
        None | Some(Value::Null) => Cell::Null,
        Some(Value::Bool(true)) => Cell::Text("t".to_string()),
        Some(Value::Bool(false)) => Cell::Text("f".to_string()),
        Some(Value::String(s)) => Cell::Text(s.clone()),
        Some(other) => Cell::Text(other.to_string()),
    }
}

fn resolve_outputs(select: &Select, records: &[Record]) -> Result<Vec<Output>, QueryError> {
    let known = table_columns(records);
    // An empty table has no observable columns; references are then
    // accepted and read as NULL.
    let check = |name: &str| -> Result<(), QueryError> {
        if records.is_empty() || known.contains(&name) {
            Ok(())
        } else {
            Err(QueryError::UndefinedColumn {
                name: name.to_string(),
            })
        }
    };

    for cond in &select.filters {
        check(cond.column())?;
    }
    if let Some(order) = &select.order_by {
        check(&order.column)?;
    }

    let field = |source: &str, name: &str| Output::Field {
        source: source.to_string(),
        column: Column::new(name, infer_type(records, source)),
    };

    match &select.projection {
        Projection::Wildcard => Ok(known.iter().map(|name| field(name, name)).collect()),
        Projection::Count { alias } => Ok(vec![Output::Count(Column::new(
            alias.as_deref().unwrap_or("count"),
            type_oid::INT8,
        ))]),
        Projection::Columns(items) => items
            .iter()
            .map(|item| {
                check(&item.column)?;
                Ok(field(
                    &item.column,
                    item.alias.as_deref().unwrap_or(&item.column),
                ))
            })
            .collect(),
    }
}

fn matches(record: &Record, cond: &Condition) -> bool {
    match cond {
        Condition::IsNull { column, negated } => {
            let is_null = record.get(column).is_none_or(Value::is_null);
            is_null != *negated
        }
        Condition::Compare { column, op, value } => {
            let Some(ordering) = record.get(column).and_then(|v| compare_literal(v, value)) else {
                return false;
            };
            match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::NotEq => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::LtEq => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::GtEq => ordering != Ordering::Less,
            }
        }
    }
}

/// Compares a stored value with a literal. `None` means the comparison is
/// unknown (a NULL on either side or incomparable types), which never
/// satisfies a condition.
fn compare_literal(value: &Value, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (Value::Null, _) | (_, Literal::Null) => None,
        (Value::Number(n), Literal::Integer(i)) if n.is_i64() || n.is_u64() => match n.as_i64() {
            Some(v) => Some(v.cmp(i)),
            None => Some(Ordering::Greater),
        },
        (Value::Number(n), lit) => n.as_f64()?.partial_cmp(&lit_as_f64(lit)?),
        (Value::String(s), Literal::String(lit)) => Some(s.as_str().cmp(lit.as_str())),
        (Value::String(s), lit) => match lit {
            Literal::Bool(b) => parse_bool(s).map(|v| v.cmp(b)),
            _ => s.trim().parse::<f64>().ok()?.partial_cmp(&lit.as_f64()?),
        },
        (Value::Bool(v), Literal::Bool(b)) => Some(v.cmp(b)),
        (Value::Bool(v), Literal::String(s)) => parse_bool(s).map(|b| v.cmp(&b)),
        _ => None,
    }
}

/// Numeric value of a literal; strings are accepted when they hold a number.
fn lit_as_f64(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

/// Boolean input forms PostgreSQL accepts.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "yes" | "y" | "on" | "1" => Some(true),
        "f" | "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Ordering for ORDER BY. NULLs sort after every value, so they come last
/// ascending and first descending, as in PostgreSQL.
fn compare_nullable(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Statement, parse};
    use serde_json::json;

    fn people() -> Vec<Record> {
        let rows = json!([
            {"id": 1, "name": "ada", "age": 36, "active": true},
            {"id": 2, "name": "grace", "age": 45, "active": false, "tags": ["navy"]},
            {"id": 3, "name": "linus", "age": null, "active": true},
            {"id": 4, "name": "barbara", "age": 29.5, "active": true},
        ]);
        match rows {
            Value::Array(rows) => rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => unreachable!(),
        }
    }

    fn run(sql: &str) -> Result<QueryResult, QueryError> {
        let Statement::Select(select) = parse(sql).unwrap() else {
            panic!("not a table select: {sql}");
        };
        execute(&select, &people())
    }

    fn texts(result: &QueryResult, column: usize) -> Vec<Option<String>> {
        result
            .rows
            .iter()
            .map(|row| match &row[column] {
                Cell::Text(s) => Some(s.clone()),
                Cell::Null => None,
                Cell::Bytes(_) => panic!("unexpected bytes"),
            })
            .collect()
    }

    #[test]
    fn test_wildcard_uses_first_seen_column_order() {
        let result = run("SELECT * FROM people").unwrap();
        let names: Vec<_> = result.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "age", "active", "tags"]);
        assert_eq!(result.tag, "SELECT 4");
        // missing keys read as NULL
        assert_eq!(result.rows[0][4], Cell::Null);
    }

    #[test]
    fn test_inferred_types() {
        let result = run("SELECT * FROM people").unwrap();
        let oids: Vec<_> = result.columns.iter().map(|c| c.type_oid).collect();
        assert_eq!(
            oids,
            vec![
                type_oid::INT8,
                type_oid::TEXT,
                type_oid::INT8,
                type_oid::BOOL,
                type_oid::JSON
            ]
        );
    }

    #[test]
    fn test_rendering() {
        let result = run("SELECT active, tags FROM people WHERE id = 2").unwrap();
        assert_eq!(
            result.rows,
            vec![vec![
                Cell::Text("f".to_string()),
                Cell::Text(r#"["navy"]"#.to_string())
            ]]
        );
    }

    #[test]
    fn test_filters() {
        let result = run("SELECT name FROM people WHERE age >= 30 AND active = true").unwrap();
        assert_eq!(texts(&result, 0), vec![Some("ada".to_string())]);

        let result = run("SELECT name FROM people WHERE age IS NULL").unwrap();
        assert_eq!(texts(&result, 0), vec![Some("linus".to_string())]);

        let result = run("SELECT name FROM people WHERE name <> 'ada'").unwrap();
        assert_eq!(result.rows.len(), 3);

        let result = run("SELECT name FROM people WHERE age < 30").unwrap();
        assert_eq!(texts(&result, 0), vec![Some("barbara".to_string())]);
    }

    #[test]
    fn test_null_never_matches_comparison() {
        let result = run("SELECT name FROM people WHERE age <> 1").unwrap();
        assert_eq!(result.rows.len(), 3);
        let result = run("SELECT name FROM people WHERE age = NULL").unwrap();
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_order_nulls_last_ascending_first_descending() {
        let result = run("SELECT name FROM people ORDER BY age").unwrap();
        assert_eq!(
            texts(&result, 0),
            vec![
                Some("barbara".to_string()),
                Some("ada".to_string()),
                Some("grace".to_string()),
                Some("linus".to_string()),
            ]
        );

        let result = run("SELECT name FROM people ORDER BY age DESC").unwrap();
        assert_eq!(texts(&result, 0)[0], Some("linus".to_string()));
        assert_eq!(texts(&result, 0)[1], Some("grace".to_string()));
    }

    #[test]
    fn test_limit_offset() {
        let result = run("SELECT id FROM people ORDER BY id LIMIT 2 OFFSET 1").unwrap();
        assert_eq!(
            texts(&result, 0),
            vec![Some("2".to_string()), Some("3".to_string())]
        );
        assert_eq!(result.tag, "SELECT 2");
    }

    #[test]
    fn test_alias_names_output_column() {
        let result = run("SELECT name AS who FROM people LIMIT 1").unwrap();
        assert_eq!(result.columns[0].name, "who");
        assert_eq!(result.columns[0].type_oid, type_oid::TEXT);
    }

    #[test]
    fn test_count() {
        let result = run("SELECT count(*) FROM people WHERE active = true").unwrap();
        assert_eq!(result.columns[0].name, "count");
        assert_eq!(result.columns[0].type_oid, type_oid::INT8);
        assert_eq!(texts(&result, 0), vec![Some("3".to_string())]);
        assert_eq!(result.tag, "SELECT 1");
    }

    #[test]
    fn test_unknown_column() {
        let err = run("SELECT nope FROM people").unwrap_err();
        assert!(matches!(err, QueryError::UndefinedColumn { name } if name == "nope"));

        let err = run("SELECT * FROM people WHERE nope = 1").unwrap_err();
        assert!(matches!(err, QueryError::UndefinedColumn { .. }));
    }

    #[test]
    fn test_empty_table_accepts_any_column() {
        let Statement::Select(select) = parse("SELECT a, b FROM t WHERE a = 1").unwrap() else {
            unreachable!()
        };
        let result = execute(&select, &[]).unwrap();
        assert_eq!(result.columns.len(), 2);
        assert_eq!(result.columns[0].type_oid, type_oid::TEXT);
        assert!(result.rows.is_empty());
        assert_eq!(result.tag, "SELECT 0");
    }

    #[test]
    fn test_describe_matches_execute_shape() {
        let Statement::Select(select) = parse("SELECT id, name FROM people WHERE id = 99").unwrap()
        else {
            unreachable!()
        };
        let columns = describe(&select, &people()).unwrap();
        let result = execute(&select, &people()).unwrap();
        assert_eq!(columns, result.columns);
        assert!(result.rows.is_empty());
    }
}
