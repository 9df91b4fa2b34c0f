//! `information_schema` views synthesized from a loaded database.

use serde_json::{Value, json};

use super::executor::{infer_type, table_columns, type_name};
use crate::storage::{Database, Record, Table};

pub(crate) const SCHEMA: &str = "information_schema";

/// Builds the named view, or `None` if it is not provided.
pub(crate) fn view(db: &Database, catalog: &str, name: &str) -> Option<Table> {
    match name {
        "schemata" => Some(schemata(db, catalog)),
        "tables" => Some(tables(db, catalog)),
        "columns" => Some(columns(db, catalog)),
        _ => None,
    }
}

fn schemata(db: &Database, catalog: &str) -> Table {
    db.schemas
        .keys()
        .map(|schema| {
            record(json!({
                "catalog_name": catalog,
                "schema_name": schema,
            }))
        })
        .collect()
}

fn tables(db: &Database, catalog: &str) -> Table {
    db.schemas
        .iter()
        .flat_map(|(schema, tables)| {
            tables.keys().map(move |table| {
                record(json!({
                    "table_catalog": catalog,
                    "table_schema": schema,
                    "table_name": table,
                    "table_type": "BASE TABLE",
                }))
            })
        })
        .collect()
}

fn columns(db: &Database, catalog: &str) -> Table {
    let mut out = Table::new();
    for (schema, tables) in &db.schemas {
        for (table, records) in tables {
            for (i, column) in table_columns(records).into_iter().enumerate() {
                out.push(record(json!({
                    "table_catalog": catalog,
                    "table_schema": schema,
                    "table_name": table,
                    "column_name": column,
                    "ordinal_position": i + 1,
                    "data_type": type_name(infer_type(records, column)),
                    "is_nullable": "YES",
                })));
            }
        }
    }
    out
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
